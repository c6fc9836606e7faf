pub mod artifact;
pub mod config;
pub mod cosmos_rpc;
pub mod deploy;
pub mod eth_client;
pub mod reporter;
pub mod scripts;
pub mod serde_utils;
pub mod tracing;
pub mod utils;
pub mod valset;
