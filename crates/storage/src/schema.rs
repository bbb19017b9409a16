use std::time::Duration;

use rusqlite::Connection;

use crate::config::StoreConfig;
use crate::error::StorageError;

const SCHEMA_VERSION: i32 = 1;

pub fn init_schema(conn: &Connection, config: &StoreConfig) -> Result<(), StorageError> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
    ",
    )?;
    conn.pragma_update(None, "cache_size", -config.cache_size_kib)?;
    conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
    conn.execute_batch(SCHEMA_SQL)?;
    conn.execute(
        "INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (?1, unixepoch())",
        [SCHEMA_VERSION],
    )?;
    Ok(())
}

// Two partial unique indexes close the check-then-create races: one live
// primary per exact pair, and one live secondary per exact pair per cluster.
// The triggers keep links single-level when a merge demotes a primary that a
// concurrent writer is about to link to.
const SCHEMA_SQL: &str = "
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS contacts (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT,
    phone_number TEXT,
    linked_id INTEGER REFERENCES contacts (id),
    link_precedence TEXT NOT NULL CHECK (link_precedence IN ('primary', 'secondary')),
    created_at BLOB NOT NULL CHECK (length(created_at) = 12),
    updated_at BLOB NOT NULL CHECK (length(updated_at) = 12),
    deleted_at BLOB CHECK (deleted_at IS NULL OR length(deleted_at) = 12),
    CHECK (email IS NOT NULL OR phone_number IS NOT NULL),
    CHECK ((link_precedence = 'primary') = (linked_id IS NULL))
);
CREATE INDEX IF NOT EXISTS idx_contacts_email ON contacts (email) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_contacts_phone ON contacts (phone_number) WHERE deleted_at IS NULL;
CREATE INDEX IF NOT EXISTS idx_contacts_linked ON contacts (linked_id) WHERE deleted_at IS NULL;

CREATE UNIQUE INDEX IF NOT EXISTS uq_contacts_primary_pair
    ON contacts (IFNULL(email, ''), IFNULL(phone_number, ''))
    WHERE link_precedence = 'primary' AND deleted_at IS NULL;
CREATE UNIQUE INDEX IF NOT EXISTS uq_contacts_secondary_pair
    ON contacts (linked_id, IFNULL(email, ''), IFNULL(phone_number, ''))
    WHERE linked_id IS NOT NULL AND deleted_at IS NULL;

CREATE TRIGGER IF NOT EXISTS trg_contacts_insert_link_primary
BEFORE INSERT ON contacts
WHEN NEW.linked_id IS NOT NULL
    AND (SELECT link_precedence FROM contacts WHERE id = NEW.linked_id AND deleted_at IS NULL) IS NOT 'primary'
BEGIN
    SELECT RAISE(ABORT, 'linked contact is not a live primary');
END;

CREATE TRIGGER IF NOT EXISTS trg_contacts_update_link_primary
BEFORE UPDATE OF linked_id ON contacts
WHEN NEW.linked_id IS NOT NULL
    AND (SELECT link_precedence FROM contacts WHERE id = NEW.linked_id AND deleted_at IS NULL) IS NOT 'primary'
BEGIN
    SELECT RAISE(ABORT, 'linked contact is not a live primary');
END;
";
