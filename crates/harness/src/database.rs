use idgraph_storage::StoreConfig;
use tempfile::TempDir;
use tracing_subscriber::EnvFilter;

use crate::TestClient;

/// A file-backed database shared by any number of clients, each holding its
/// own connection. Removed when dropped.
///
/// Connection settings come from the environment (see
/// [`StoreConfig::from_env`]); only the path is forced to the temp file.
pub struct TestDatabase {
    _dir: TempDir,
    config: StoreConfig,
}

impl TestDatabase {
    pub fn new() -> Result<Self, Box<dyn std::error::Error>> {
        let dir = tempfile::tempdir()?;
        let path = dir
            .path()
            .join("contacts.db")
            .to_str()
            .ok_or("temp path is not valid UTF-8")?
            .to_string();
        let config = StoreConfig {
            path,
            ..StoreConfig::from_env()?
        };
        // Create the schema before clients race to open it.
        TestClient::open(&config)?;
        Ok(Self { _dir: dir, config })
    }

    pub fn path(&self) -> &str {
        &self.config.path
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn client(&self) -> Result<TestClient, Box<dyn std::error::Error>> {
        Ok(TestClient::open(&self.config)?)
    }

    /// Route engine logs to the test output. Honors `RUST_LOG`; safe to call
    /// from every test.
    pub fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
