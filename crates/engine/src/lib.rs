pub mod cluster;
pub mod error;
pub mod view;

pub use cluster::{ClusterPlan, elect_primary};
pub use error::EngineError;
pub use view::consolidate;

use std::collections::BTreeSet;

use idgraph_core::{
    ConsolidatedContact, ContactId, IdentifyRequest, IdentifyResponse, NewContact,
};
use idgraph_storage::{ContactStore, StorageError};
use tracing::{debug, error, info, info_span, warn};

/// Resolution attempts before a lost race is reported to the caller.
pub const MAX_ATTEMPTS: u32 = 5;

/// Outcome of one pass over the resolution steps.
enum Attempt {
    Done(ConsolidatedContact),
    /// Another writer changed the touched clusters between our read and
    /// write. The pass made no partial change and can be rerun from scratch.
    Raced(StorageError),
}

/// Reconciles identifier pairs against a contact store.
///
/// Holds nothing but the store handle: every call reads fresh state, and
/// concurrent callers each use their own reconciler over a shared database.
pub struct Reconciler<S: ContactStore> {
    store: S,
}

impl<S: ContactStore> Reconciler<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut S {
        &mut self.store
    }

    /// Resolve a request and wrap the result in the response envelope.
    pub fn identify(&mut self, request: &IdentifyRequest) -> Result<IdentifyResponse, EngineError> {
        let contact = self.resolve(request.email.as_deref(), request.phone_number.as_deref())?;
        Ok(IdentifyResponse { contact })
    }

    /// Find or create the identity cluster for `(email, phone_number)` and
    /// return its consolidated view.
    ///
    /// Empty identifiers count as absent. With both absent this fails with
    /// [`EngineError::InvalidInput`] before touching the store.
    pub fn resolve(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<ConsolidatedContact, EngineError> {
        let email = present(email);
        let phone_number = present(phone_number);
        if email.is_none() && phone_number.is_none() {
            return Err(EngineError::InvalidInput);
        }

        let span = info_span!(
            "resolve",
            has_email = email.is_some(),
            has_phone = phone_number.is_some()
        );
        let _guard = span.enter();

        let mut attempt = 1;
        loop {
            match self.resolve_once(email, phone_number) {
                Ok(Attempt::Done(view)) => return Ok(view),
                Ok(Attempt::Raced(err)) if attempt >= MAX_ATTEMPTS => {
                    warn!(attempt, error = %err, "giving up after repeated concurrent updates");
                    return Err(err.into());
                }
                Ok(Attempt::Raced(err)) => {
                    warn!(attempt, error = %err, "concurrent update observed, re-reading");
                    attempt += 1;
                }
                Err(err @ EngineError::ConsistencyFault(_)) => {
                    error!(error = %err, "contact data violates linkage invariants");
                    return Err(err);
                }
                Err(err) => return Err(err),
            }
        }
    }

    fn resolve_once(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Attempt, EngineError> {
        let matches = self.store.find_matching(email, phone_number)?;
        debug!(matches = matches.len(), "matched existing contacts");

        if matches.is_empty() {
            return match self.store.create(&NewContact::primary(email, phone_number)) {
                Ok(created) => {
                    info!(contact_id = %created.id, "created primary contact");
                    Ok(Attempt::Done(consolidate(created.id, std::slice::from_ref(&created))?))
                }
                Err(err @ StorageError::DuplicateContact(_)) => Ok(Attempt::Raced(err)),
                Err(err) => Err(err.into()),
            };
        }

        let primary_id = match cluster::plan(&matches)? {
            ClusterPlan::Single(primary_id) => primary_id,
            ClusterPlan::Bridge(first, second) => match self.merge(first, second)? {
                Ok(primary_id) => primary_id,
                Err(err) => return Ok(Attempt::Raced(err)),
            },
        };

        if self.store.find_one(primary_id, email, phone_number)?.is_some() {
            debug!(%primary_id, "identifier pair already recorded");
        } else {
            match self
                .store
                .create(&NewContact::secondary(email, phone_number, primary_id))
            {
                Ok(created) => {
                    info!(contact_id = %created.id, %primary_id, "attached secondary contact");
                }
                Err(StorageError::DuplicateContact(detail)) => {
                    warn!(%primary_id, %detail, "identical secondary recorded concurrently");
                }
                Err(err @ StorageError::StaleLink(_)) => return Ok(Attempt::Raced(err)),
                Err(err) => return Err(err.into()),
            }
        }

        let cluster = self.store.find_by_cluster_root(primary_id)?;
        if cluster.iter().any(|c| c.id == primary_id && !c.is_primary()) {
            return Ok(Attempt::Raced(StorageError::StaleLink(format!(
                "primary contact {primary_id} was demoted during resolution"
            ))));
        }
        Ok(Attempt::Done(consolidate(primary_id, &cluster)?))
    }

    /// Fold the younger of two clusters into the older one.
    ///
    /// The inner `Err` reports a lost race: one of the primaries was demoted
    /// by another writer after it was matched.
    fn merge(
        &mut self,
        first: ContactId,
        second: ContactId,
    ) -> Result<Result<ContactId, StorageError>, EngineError> {
        let primaries = self.store.find_by_ids(&BTreeSet::from([first, second]))?;
        let [a, b] = primaries.as_slice() else {
            return Err(EngineError::ConsistencyFault(format!(
                "secondary contacts link to missing primary among {first} and {second}"
            )));
        };
        if let Some(demoted) = [a, b].into_iter().find(|c| !c.is_primary()) {
            return Ok(Err(StorageError::StaleLink(format!(
                "contact {} is no longer a primary",
                demoted.id
            ))));
        }

        let (keep, demote) = elect_primary(a, b);
        let (keep, demote) = (keep.id, demote.id);
        match self.store.atomic_merge(demote, keep) {
            Ok(()) => {
                info!(primary_id = %keep, demoted_id = %demote, "merged identity clusters");
                Ok(Ok(keep))
            }
            Err(err @ StorageError::NotFound(_)) => Ok(Err(err)),
            Err(StorageError::DuplicateContact(detail)) => Err(EngineError::ConsistencyFault(
                format!("merging {demote} into {keep} duplicates an identifier pair: {detail}"),
            )),
            Err(err) => Err(err.into()),
        }
    }
}

/// Treat empty identifiers as absent.
fn present(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}
