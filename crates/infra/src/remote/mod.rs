//! Remote API adapter

pub mod api_client;

pub use api_client::{ApiClient, ApiClientConfig, ClientSession};
