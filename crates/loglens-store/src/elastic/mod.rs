// Elasticsearch access: thin HTTP client, bulk log store, search repository

pub mod client;
pub mod search;
pub mod store;

pub use client::{ElasticConfig, ElasticError, EsClient};
pub use search::ElasticLogRepository;
pub use store::ElasticLogStore;
