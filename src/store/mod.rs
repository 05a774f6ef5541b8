//! # Store
//!
//! Durable projection of key metadata onto annotated secrets (spec.md §4.4).

mod key_secret_store;

pub use crate::model::RawKeySecret;
pub use key_secret_store::KeySecretStore;
