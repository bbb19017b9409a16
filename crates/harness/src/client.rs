use std::collections::{BTreeMap, BTreeSet};

use idgraph_core::{ConsolidatedContact, Contact, ContactId};
use idgraph_engine::{EngineError, Reconciler};
use idgraph_storage::{ContactStore, SqliteContactStore, StorageError, StoreConfig};

/// One caller: a reconciler over its own connection.
pub struct TestClient {
    pub reconciler: Reconciler<SqliteContactStore>,
}

impl TestClient {
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(Self {
            reconciler: Reconciler::new(SqliteContactStore::open_in_memory()?),
        })
    }

    pub fn open(config: &StoreConfig) -> Result<Self, StorageError> {
        Ok(Self {
            reconciler: Reconciler::new(SqliteContactStore::open_with(config)?),
        })
    }

    pub fn resolve(
        &mut self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<ConsolidatedContact, EngineError> {
        self.reconciler.resolve(email, phone_number)
    }

    pub fn store(&self) -> &SqliteContactStore {
        self.reconciler.store()
    }

    pub fn store_mut(&mut self) -> &mut SqliteContactStore {
        self.reconciler.store_mut()
    }

    pub fn contact(&self, id: ContactId) -> Result<Contact, Box<dyn std::error::Error>> {
        self.store()
            .get_contact(id)?
            .ok_or_else(|| format!("contact {id} not found").into())
    }

    /// Every live contact, ordered by id.
    pub fn contacts(&self) -> Result<Vec<Contact>, StorageError> {
        self.store().list_live()
    }

    /// Audit the stored graph. Returns one message per broken invariant;
    /// empty means the data is sound.
    pub fn invariant_violations(&self) -> Result<Vec<String>, StorageError> {
        let contacts = self.contacts()?;
        let by_id: BTreeMap<ContactId, &Contact> = contacts.iter().map(|c| (c.id, c)).collect();

        let mut violations = Vec::new();
        let mut pairs: BTreeSet<(ContactId, Option<&str>, Option<&str>)> = BTreeSet::new();
        for contact in &contacts {
            if contact.is_primary() && contact.linked_id.is_some() {
                violations.push(format!("primary {} carries a link", contact.id));
            }
            let Some(root) = contact.cluster_root() else {
                violations.push(format!("secondary {} has no link", contact.id));
                continue;
            };
            if !contact.is_primary() {
                match by_id.get(&root) {
                    None => violations.push(format!(
                        "secondary {} links to missing {root}",
                        contact.id
                    )),
                    Some(target) if !target.is_primary() => violations.push(format!(
                        "secondary {} links to secondary {root}",
                        contact.id
                    )),
                    Some(_) => {}
                }
            }
            let pair = (root, contact.email.as_deref(), contact.phone_number.as_deref());
            if !pairs.insert(pair) {
                violations.push(format!(
                    "contact {} duplicates a pair in cluster {root}",
                    contact.id
                ));
            }
        }
        Ok(violations)
    }
}
