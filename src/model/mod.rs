//! # Data model
//!
//! Types shared by the migration controller and the annotation protocol
//! other controllers observe (spec.md §3).

mod annotations;
mod encryption_config;
mod gr;
mod key;

pub use annotations::{
    compute_annotation_update, AnnotationUpdate, KeyAnnotations, MigratedResources,
    ANNOTATION_MIGRATED_RESOURCES, ANNOTATION_MIGRATED_TIMESTAMP,
};
pub use encryption_config::{DeployedConfig, EncryptionConfig};
pub use gr::GroupResource;
pub use key::{GrActualKeys, Key, KeyRole, KeyState, Mode, RawKeySecret};
