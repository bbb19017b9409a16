use crate::error::CoreError;
use crate::ids::ContactId;
use crate::timestamp::Timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkPrecedence {
    Primary,
    Secondary,
}

impl LinkPrecedence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Secondary => "secondary",
        }
    }

    pub fn parse(s: &str) -> Result<Self, CoreError> {
        match s {
            "primary" => Ok(Self::Primary),
            "secondary" => Ok(Self::Secondary),
            _ => Err(CoreError::InvalidData(format!("unknown link precedence: {s}"))),
        }
    }
}

/// One stored identifier combination.
///
/// A primary roots a cluster and carries no link; a secondary links to
/// exactly one primary. `email` and `phone_number` never change after
/// creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Contact {
    pub id: ContactId,
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    pub deleted_at: Option<Timestamp>,
}

impl Contact {
    pub fn is_primary(&self) -> bool {
        self.link_precedence == LinkPrecedence::Primary
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }

    /// The id of the primary this contact belongs to. `None` only for a
    /// secondary that has lost its link, which is corrupt data.
    pub fn cluster_root(&self) -> Option<ContactId> {
        match self.link_precedence {
            LinkPrecedence::Primary => Some(self.id),
            LinkPrecedence::Secondary => self.linked_id,
        }
    }

    pub fn has_pair(&self, email: Option<&str>, phone_number: Option<&str>) -> bool {
        self.email.as_deref() == email && self.phone_number.as_deref() == phone_number
    }
}

/// Insert request for the contact store. The store assigns id and stamps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewContact {
    pub email: Option<String>,
    pub phone_number: Option<String>,
    pub link_precedence: LinkPrecedence,
    pub linked_id: Option<ContactId>,
}

impl NewContact {
    pub fn primary(email: Option<&str>, phone_number: Option<&str>) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
            link_precedence: LinkPrecedence::Primary,
            linked_id: None,
        }
    }

    pub fn secondary(
        email: Option<&str>,
        phone_number: Option<&str>,
        primary_id: ContactId,
    ) -> Self {
        Self {
            email: email.map(str::to_string),
            phone_number: phone_number.map(str::to_string),
            link_precedence: LinkPrecedence::Secondary,
            linked_id: Some(primary_id),
        }
    }
}
