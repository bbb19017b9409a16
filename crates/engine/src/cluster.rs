use std::collections::BTreeSet;

use idgraph_core::{Contact, ContactId};

use crate::error::EngineError;

/// What a match set says about the clusters an identifier pair touches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterPlan {
    /// Every match already belongs to this primary.
    Single(ContactId),
    /// The pair bridges two clusters that must become one.
    Bridge(ContactId, ContactId),
}

/// Collect the distinct primaries behind `matches` and decide between the
/// single-cluster and merge paths.
pub fn plan(matches: &[Contact]) -> Result<ClusterPlan, EngineError> {
    let mut primaries = BTreeSet::new();
    for contact in matches {
        let root = contact.cluster_root().ok_or_else(|| {
            EngineError::ConsistencyFault(format!(
                "secondary contact {} has no linked primary",
                contact.id
            ))
        })?;
        primaries.insert(root);
    }

    let mut ids = primaries.into_iter();
    match (ids.next(), ids.next(), ids.next()) {
        (Some(only), None, _) => Ok(ClusterPlan::Single(only)),
        (Some(first), Some(second), None) => Ok(ClusterPlan::Bridge(first, second)),
        (Some(_), Some(_), Some(_)) => Err(EngineError::ConsistencyFault(format!(
            "identifier pair touches {} clusters",
            3 + ids.count()
        ))),
        (None, _, _) => Err(EngineError::ConsistencyFault(
            "cluster plan requested for an empty match set".into(),
        )),
    }
}

/// Order two primaries oldest first: earlier `created_at` wins, lower id
/// breaks ties. Returns `(keep, demote)`.
pub fn elect_primary<'a>(a: &'a Contact, b: &'a Contact) -> (&'a Contact, &'a Contact) {
    if (a.created_at, a.id) <= (b.created_at, b.id) {
        (a, b)
    } else {
        (b, a)
    }
}
