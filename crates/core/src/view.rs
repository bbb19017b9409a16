use serde::{Deserialize, Serialize};

use crate::ids::ContactId;

/// Caller input: two optional identifiers, at least one expected.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentifyRequest {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone_number: Option<String>,
}

impl IdentifyRequest {
    pub fn new(email: Option<&str>, phone_number: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
        }
    }
}

/// Everything known about one person, keyed by the cluster's primary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsolidatedContact {
    pub primary_contact_id: ContactId,
    pub emails: Vec<String>,
    pub phone_numbers: Vec<String>,
    pub secondary_contact_ids: Vec<ContactId>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifyResponse {
    pub contact: ConsolidatedContact,
}
