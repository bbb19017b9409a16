use crate::error::StorageError;

pub const IN_MEMORY_PATH: &str = ":memory:";

const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5000;
const DEFAULT_CACHE_SIZE_KIB: i64 = 32000;

/// Connection settings for [`crate::SqliteContactStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    pub path: String,
    /// How long a writer waits on a concurrent writer before failing.
    pub busy_timeout_ms: u64,
    pub cache_size_kib: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            path: IN_MEMORY_PATH.to_string(),
            busy_timeout_ms: DEFAULT_BUSY_TIMEOUT_MS,
            cache_size_kib: DEFAULT_CACHE_SIZE_KIB,
        }
    }
}

impl StoreConfig {
    pub fn at_path(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    pub fn is_in_memory(&self) -> bool {
        self.path == IN_MEMORY_PATH
    }

    /// Read `IDGRAPH_DB_PATH` and `IDGRAPH_BUSY_TIMEOUT_MS`, falling back to
    /// defaults for unset variables.
    pub fn from_env() -> Result<Self, StorageError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, StorageError> {
        let mut config = Self::default();
        if let Some(path) = lookup("IDGRAPH_DB_PATH") {
            config.path = path;
        }
        if let Some(raw) = lookup("IDGRAPH_BUSY_TIMEOUT_MS") {
            config.busy_timeout_ms = raw.trim().parse().map_err(|_| {
                StorageError::InvalidConfig(format!(
                    "IDGRAPH_BUSY_TIMEOUT_MS is not a number: {raw}"
                ))
            })?;
        }
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_to_in_memory() {
        let config = StoreConfig::default();
        assert!(config.is_in_memory());
        assert_eq!(config.busy_timeout_ms, 5000);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = StoreConfig::from_lookup(|key| match key {
            "IDGRAPH_DB_PATH" => Some("/tmp/contacts.db".into()),
            "IDGRAPH_BUSY_TIMEOUT_MS" => Some("250".into()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.path, "/tmp/contacts.db");
        assert_eq!(config.busy_timeout_ms, 250);
        assert_eq!(config.cache_size_kib, 32000);
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let result = StoreConfig::from_lookup(|key| {
            (key == "IDGRAPH_BUSY_TIMEOUT_MS").then(|| "soon".to_string())
        });
        assert!(matches!(result, Err(StorageError::InvalidConfig(_))));
    }
}
