mod controller_metrics;
mod registry;

pub use controller_metrics::{
    record_annotation_conflict, record_migration_completed, record_migration_started, record_sync,
    set_resources_progressing,
};
pub use registry::{register_metrics, REGISTRY};
