use std::collections::BTreeSet;

use rusqlite::{Connection, OptionalExtension, TransactionBehavior};
use tracing::debug;

use idgraph_core::{Contact, ContactId, LinkPrecedence, NewContact, Timestamp, TimestampClock};

use crate::config::StoreConfig;
use crate::error::StorageError;
use crate::traits::ContactStore;

const CONTACT_COLUMNS: &str =
    "id, email, phone_number, linked_id, link_precedence, created_at, updated_at, deleted_at";

/// Column values of one `contacts` row, before domain decoding.
struct ContactRow {
    id: i64,
    email: Option<String>,
    phone_number: Option<String>,
    linked_id: Option<i64>,
    link_precedence: String,
    created_at: Vec<u8>,
    updated_at: Vec<u8>,
    deleted_at: Option<Vec<u8>>,
}

impl ContactRow {
    fn from_row(row: &rusqlite::Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            email: row.get(1)?,
            phone_number: row.get(2)?,
            linked_id: row.get(3)?,
            link_precedence: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
            deleted_at: row.get(7)?,
        })
    }

    fn into_contact(self) -> Result<Contact, StorageError> {
        let deleted_at = match self.deleted_at {
            Some(bytes) => Some(Timestamp::from_slice(&bytes)?),
            None => None,
        };
        Ok(Contact {
            id: ContactId::new(self.id),
            email: self.email,
            phone_number: self.phone_number,
            link_precedence: LinkPrecedence::parse(&self.link_precedence)?,
            linked_id: self.linked_id.map(ContactId::new),
            created_at: Timestamp::from_slice(&self.created_at)?,
            updated_at: Timestamp::from_slice(&self.updated_at)?,
            deleted_at,
        })
    }
}

/// Map a write error, separating unique-index conflicts and stale links
/// from other constraint failures.
fn map_write_error(e: rusqlite::Error, what: &str) -> StorageError {
    match e {
        rusqlite::Error::SqliteFailure(err, msg)
            if err.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            let detail = msg.unwrap_or_else(|| err.to_string());
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE {
                StorageError::DuplicateContact(format!("{what}: {detail}"))
            } else if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_TRIGGER {
                StorageError::StaleLink(format!("{what}: {detail}"))
            } else {
                StorageError::ConstraintViolation(format!("{what}: {detail}"))
            }
        }
        other => StorageError::Sqlite(other),
    }
}

pub struct SqliteContactStore {
    conn: Connection,
    clock: TimestampClock,
}

impl SqliteContactStore {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        Self::open_with(&StoreConfig::at_path(path))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_with(&StoreConfig::default())
    }

    pub fn open_with(config: &StoreConfig) -> Result<Self, StorageError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            Connection::open(&config.path)?
        };
        crate::schema::init_schema(&conn, config)?;

        // Resume the clock past anything already stored.
        let mut clock = TimestampClock::new();
        let latest: Option<Vec<u8>> = conn.query_row(
            "SELECT MAX(MAX(updated_at, IFNULL(deleted_at, updated_at))) FROM contacts",
            [],
            |row| row.get(0),
        )?;
        if let Some(bytes) = latest {
            clock.observe(&Timestamp::from_slice(&bytes)?);
        }

        debug!(path = %config.path, "contact store opened");
        Ok(Self { conn, clock })
    }

    fn query_contacts<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> Result<Vec<Contact>, StorageError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, ContactRow::from_row)?;

        let mut result = Vec::new();
        for row in rows {
            result.push(row?.into_contact()?);
        }
        Ok(result)
    }
}

impl ContactStore for SqliteContactStore {
    fn find_matching(
        &self,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Vec<Contact>, StorageError> {
        match (email, phone_number) {
            (Some(email), Some(phone)) => self.query_contacts(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND (email = ?1 OR phone_number = ?2) ORDER BY id"
                ),
                rusqlite::params![email, phone],
            ),
            (Some(email), None) => self.query_contacts(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND email = ?1 ORDER BY id"
                ),
                rusqlite::params![email],
            ),
            (None, Some(phone)) => self.query_contacts(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND phone_number = ?1 ORDER BY id"
                ),
                rusqlite::params![phone],
            ),
            (None, None) => Ok(Vec::new()),
        }
    }

    fn find_by_ids(&self, ids: &BTreeSet<ContactId>) -> Result<Vec<Contact>, StorageError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let placeholders = (1..=ids.len())
            .map(|i| format!("?{i}"))
            .collect::<Vec<_>>()
            .join(", ");
        self.query_contacts(
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND id IN ({placeholders}) ORDER BY id"
            ),
            rusqlite::params_from_iter(ids.iter().map(|id| id.get())),
        )
    }

    fn find_one(
        &self,
        linked_id: ContactId,
        email: Option<&str>,
        phone_number: Option<&str>,
    ) -> Result<Option<Contact>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND (id = ?1 OR linked_id = ?1) AND email IS ?2 AND phone_number IS ?3 ORDER BY id LIMIT 1"
                ),
                rusqlite::params![linked_id.get(), email, phone_number],
                ContactRow::from_row,
            )
            .optional()?;
        row.map(ContactRow::into_contact).transpose()
    }

    fn find_by_cluster_root(&self, primary_id: ContactId) -> Result<Vec<Contact>, StorageError> {
        self.query_contacts(
            &format!(
                "SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL AND (id = ?1 OR linked_id = ?1) ORDER BY id"
            ),
            rusqlite::params![primary_id.get()],
        )
    }

    fn create(&mut self, contact: &NewContact) -> Result<Contact, StorageError> {
        let now = self.clock.tick()?;
        self.conn
            .execute(
                "INSERT INTO contacts (email, phone_number, linked_id, link_precedence, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![
                    contact.email,
                    contact.phone_number,
                    contact.linked_id.map(|id| id.get()),
                    contact.link_precedence.as_str(),
                    &now.to_bytes()[..],
                ],
            )
            .map_err(|e| map_write_error(e, "insert contact"))?;
        let id = ContactId::new(self.conn.last_insert_rowid());

        Ok(Contact {
            id,
            email: contact.email.clone(),
            phone_number: contact.phone_number.clone(),
            link_precedence: contact.link_precedence,
            linked_id: contact.linked_id,
            created_at: now,
            updated_at: now,
            deleted_at: None,
        })
    }

    fn atomic_merge(
        &mut self,
        demote_id: ContactId,
        onto_id: ContactId,
    ) -> Result<(), StorageError> {
        if demote_id == onto_id {
            return Err(StorageError::ConstraintViolation(format!(
                "cannot merge contact {demote_id} onto itself"
            )));
        }
        let now = self.clock.tick()?;
        // IMMEDIATE takes the write lock up front so overlapping merges queue.
        let tx = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;

        let onto_live: i64 = tx.query_row(
            "SELECT COUNT(*) FROM contacts WHERE id = ?1 AND link_precedence = 'primary' AND deleted_at IS NULL",
            rusqlite::params![onto_id.get()],
            |row| row.get(0),
        )?;
        if onto_live == 0 {
            return Err(StorageError::NotFound(format!("primary contact {onto_id}")));
        }

        let demoted = tx
            .execute(
                "UPDATE contacts SET link_precedence = 'secondary', linked_id = ?1, updated_at = ?2 WHERE id = ?3 AND link_precedence = 'primary' AND deleted_at IS NULL",
                rusqlite::params![onto_id.get(), &now.to_bytes()[..], demote_id.get()],
            )
            .map_err(|e| map_write_error(e, "demote contact"))?;
        if demoted == 0 {
            return Err(StorageError::NotFound(format!("primary contact {demote_id}")));
        }

        let relinked = tx
            .execute(
                "UPDATE contacts SET linked_id = ?1, updated_at = ?2 WHERE linked_id = ?3",
                rusqlite::params![onto_id.get(), &now.to_bytes()[..], demote_id.get()],
            )
            .map_err(|e| map_write_error(e, "relink secondaries"))?;

        tx.commit()?;
        debug!(%demote_id, %onto_id, relinked, "clusters merged");
        Ok(())
    }

    fn mark_deleted(&mut self, id: ContactId) -> Result<(), StorageError> {
        let now = self.clock.tick()?;
        let changed = self.conn.execute(
            "UPDATE contacts SET deleted_at = ?1, updated_at = ?1 WHERE id = ?2 AND deleted_at IS NULL",
            rusqlite::params![&now.to_bytes()[..], id.get()],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("live contact {id}")));
        }
        Ok(())
    }

    fn get_contact(&self, id: ContactId) -> Result<Option<Contact>, StorageError> {
        let row = self
            .conn
            .query_row(
                &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE id = ?1"),
                rusqlite::params![id.get()],
                ContactRow::from_row,
            )
            .optional()?;
        row.map(ContactRow::into_contact).transpose()
    }

    fn contact_count(&self) -> Result<u64, StorageError> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM contacts WHERE deleted_at IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    fn list_live(&self) -> Result<Vec<Contact>, StorageError> {
        self.query_contacts(
            &format!("SELECT {CONTACT_COLUMNS} FROM contacts WHERE deleted_at IS NULL ORDER BY id"),
            [],
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteContactStore {
        SqliteContactStore::open_in_memory().unwrap()
    }

    #[test]
    fn create_assigns_increasing_ids_and_stamps() {
        let mut store = store();
        let a = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        let b = store.create(&NewContact::primary(None, Some("222"))).unwrap();
        assert!(a.id < b.id);
        assert!(a.created_at < b.created_at);
        assert_eq!(store.get_contact(a.id).unwrap(), Some(a));
    }

    #[test]
    fn find_matching_is_an_or_over_identifiers() {
        let mut store = store();
        let a = store.create(&NewContact::primary(Some("a@x.com"), Some("111"))).unwrap();
        let b = store.create(&NewContact::primary(Some("b@x.com"), Some("222"))).unwrap();
        store.create(&NewContact::primary(Some("c@x.com"), Some("333"))).unwrap();

        let ids: Vec<_> = store
            .find_matching(Some("a@x.com"), Some("222"))
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(ids, vec![a.id, b.id]);

        assert_eq!(store.find_matching(None, Some("111")).unwrap().len(), 1);
        assert!(store.find_matching(None, None).unwrap().is_empty());
    }

    #[test]
    fn deleted_contacts_are_invisible() {
        let mut store = store();
        let a = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        store.mark_deleted(a.id).unwrap();

        assert!(store.find_matching(Some("a@x.com"), None).unwrap().is_empty());
        assert!(store.find_by_cluster_root(a.id).unwrap().is_empty());
        assert!(store.find_by_ids(&BTreeSet::from([a.id])).unwrap().is_empty());
        assert_eq!(store.contact_count().unwrap(), 0);
        assert!(store.get_contact(a.id).unwrap().unwrap().is_deleted());
        assert!(matches!(store.mark_deleted(a.id), Err(StorageError::NotFound(_))));
    }

    #[test]
    fn find_one_matches_absent_as_absent() {
        let mut store = store();
        let p = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        let s = store
            .create(&NewContact::secondary(Some("a@x.com"), Some("111"), p.id))
            .unwrap();

        assert_eq!(store.find_one(p.id, Some("a@x.com"), None).unwrap().map(|c| c.id), Some(p.id));
        assert_eq!(
            store.find_one(p.id, Some("a@x.com"), Some("111")).unwrap().map(|c| c.id),
            Some(s.id)
        );
        assert!(store.find_one(p.id, None, Some("111")).unwrap().is_none());
    }

    #[test]
    fn duplicate_pairs_hit_unique_indexes() {
        let mut store = store();
        let p = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        let err = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap_err();
        assert!(matches!(err, StorageError::DuplicateContact(_)), "got {err:?}");

        store.create(&NewContact::secondary(Some("a@x.com"), Some("1"), p.id)).unwrap();
        let err = store
            .create(&NewContact::secondary(Some("a@x.com"), Some("1"), p.id))
            .unwrap_err();
        assert!(matches!(err, StorageError::DuplicateContact(_)), "got {err:?}");
    }

    #[test]
    fn linking_to_a_secondary_is_a_stale_link() {
        let mut store = store();
        let a = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        let b = store.create(&NewContact::primary(None, Some("222"))).unwrap();
        store.atomic_merge(b.id, a.id).unwrap();

        let err = store
            .create(&NewContact::secondary(Some("b@x.com"), Some("222"), b.id))
            .unwrap_err();
        assert!(matches!(err, StorageError::StaleLink(_)), "got {err:?}");
        assert_eq!(store.contact_count().unwrap(), 2);
    }

    #[test]
    fn contact_without_identifiers_is_rejected() {
        let mut store = store();
        let err = store.create(&NewContact::primary(None, None)).unwrap_err();
        assert!(matches!(err, StorageError::ConstraintViolation(_)), "got {err:?}");
    }

    #[test]
    fn atomic_merge_demotes_and_relinks() {
        let mut store = store();
        let a = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        let b = store.create(&NewContact::primary(None, Some("222"))).unwrap();
        let b_child = store
            .create(&NewContact::secondary(Some("b@x.com"), Some("222"), b.id))
            .unwrap();

        store.atomic_merge(b.id, a.id).unwrap();

        let b = store.get_contact(b.id).unwrap().unwrap();
        assert_eq!(b.link_precedence, LinkPrecedence::Secondary);
        assert_eq!(b.linked_id, Some(a.id));
        assert!(b.updated_at > b.created_at);
        let child = store.get_contact(b_child.id).unwrap().unwrap();
        assert_eq!(child.linked_id, Some(a.id));

        let cluster: Vec<_> = store
            .find_by_cluster_root(a.id)
            .unwrap()
            .iter()
            .map(|c| c.id)
            .collect();
        assert_eq!(cluster, vec![a.id, b.id, b_child.id]);
    }

    #[test]
    fn atomic_merge_rejects_non_primary_and_leaves_no_trace() {
        let mut store = store();
        let a = store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap();
        let s = store
            .create(&NewContact::secondary(Some("a@x.com"), Some("1"), a.id))
            .unwrap();
        let b = store.create(&NewContact::primary(None, Some("222"))).unwrap();

        assert!(matches!(store.atomic_merge(s.id, b.id), Err(StorageError::NotFound(_))));
        assert!(matches!(store.atomic_merge(b.id, s.id), Err(StorageError::NotFound(_))));
        assert!(matches!(
            store.atomic_merge(a.id, a.id),
            Err(StorageError::ConstraintViolation(_))
        ));

        assert_eq!(store.get_contact(s.id).unwrap().unwrap().linked_id, Some(a.id));
        assert!(store.get_contact(b.id).unwrap().unwrap().is_primary());
    }

    #[test]
    fn reopened_store_keeps_stamps_monotonic() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("contacts.db");
        let path = path.to_str().unwrap();

        let first = {
            let mut store = SqliteContactStore::open(path).unwrap();
            store.create(&NewContact::primary(Some("a@x.com"), None)).unwrap()
        };
        let mut store = SqliteContactStore::open(path).unwrap();
        let second = store.create(&NewContact::primary(Some("b@x.com"), None)).unwrap();
        assert!(second.created_at > first.created_at);
        assert_eq!(store.list_live().unwrap().len(), 2);
    }
}
