pub mod client;
pub mod database;

pub use client::TestClient;
pub use database::TestDatabase;
