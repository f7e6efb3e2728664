pub mod authorizer;
pub mod media_manager;
pub mod metadata_store;
pub mod orchestrator;
pub mod progress;
pub mod signer;
pub mod signing_client;
pub mod signing_service;
pub mod transfer;

#[cfg(test)]
pub(crate) mod test_support;
