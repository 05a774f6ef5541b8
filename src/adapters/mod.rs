//! # Adapters
//!
//! Reference implementations of the `Migrator`, `Deployer` and
//! `EncryptionProvider` contracts (spec.md §6), wired up by `main.rs` so
//! the binary is runnable standalone. A deployment that already runs its
//! own key-generation, config-writer and deployer controllers can swap
//! any of these out without touching `controller::MigrationDriver`.

mod deployer;
mod encryption_provider;
mod fanout;
mod migrator;

pub use deployer::SecretDeployer;
pub use encryption_provider::EnvEncryptionProvider;
pub use migrator::KubeStorageVersionMigrator;
