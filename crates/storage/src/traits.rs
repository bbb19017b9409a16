use std::collections::BTreeSet;

use idgraph_core::{Contact, ContactId, NewContact};

use crate::error::StorageError;

/// Durable contact storage consumed by the reconciliation engine.
///
/// Every read excludes soft-deleted contacts unless stated otherwise.
/// Writes take `&mut self`; implementations serialize them against other
/// handles to the same data.
pub trait ContactStore {
    /// Contacts whose email equals `email` OR whose phone equals `phone_number`.
    /// An absent identifier matches nothing. Ordered by id.
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StorageError>;

    fn find_by_ids(&self, ids: &BTreeSet<ContactId>) -> Result<Vec<Contact>, StorageError>;

    /// The member of the cluster rooted at `linked_id` (the root itself or a
    /// secondary linked to it) carrying exactly this pair. Absent matches absent.
    fn find_one(
        &self,
        linked_id: ContactId,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Option<Contact>, StorageError>;

    /// The primary plus every secondary linked to it, ordered by id.
    fn find_by_cluster_root(&self, primary_id: ContactId) -> Result<Vec<Contact>, StorageError>;

    /// Insert a contact. A pair already present where the store enforces
    /// uniqueness fails with [`StorageError::DuplicateContact`].
    fn create(&mut self, contact: &NewContact) -> Result<Contact, StorageError>;

    /// Demote `demote_id` to a secondary of `onto_id` and move its
    /// secondaries onto `onto_id`, all in one atomic unit.
    fn atomic_merge(&mut self, demote_id: ContactId, onto_id: ContactId)
    -> Result<(), StorageError>;

    fn mark_deleted(&mut self, id: ContactId) -> Result<(), StorageError>;

    /// Read a contact by id, including soft-deleted ones.
    fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, StorageError>;

    fn contact_count(&self) -> Result<u64, StorageError>;

    fn list_live(&self) -> Result<Vec<Contact>, StorageError>;
}
