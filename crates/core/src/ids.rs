use serde::{Deserialize, Serialize};
use std::fmt;

/// Store-assigned contact identifier. Ids grow with creation order.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContactId(i64);

impl ContactId {
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for ContactId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Debug for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContactId({})", self.0)
    }
}

impl fmt::Display for ContactId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_as_bare_integer() {
        let json = serde_json::to_string(&ContactId::new(23)).unwrap();
        assert_eq!(json, "23");
        let back: ContactId = serde_json::from_str("23").unwrap();
        assert_eq!(back, ContactId::new(23));
    }

    #[test]
    fn ordering_follows_raw_value() {
        assert!(ContactId::new(1) < ContactId::new(2));
        assert_eq!(format!("{:?}", ContactId::new(7)), "ContactId(7)");
    }
}
