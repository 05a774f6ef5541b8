//! # Controller metrics
//!
//! Per-sync and per-GR counters/gauges, registered once into the shared
//! registry.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts};
use std::sync::LazyLock;

static SYNC_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "encryption_migration_sync_total",
        "Total number of Sync invocations.",
    )
    .unwrap()
});

static SYNC_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "encryption_migration_sync_errors_total",
        "Total number of Sync invocations that returned an error.",
    )
    .unwrap()
});

static SYNC_DURATION_SECONDS: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(HistogramOpts::new(
        "encryption_migration_sync_duration_seconds",
        "Wall-clock duration of one Sync call.",
    ))
    .unwrap()
});

static MIGRATIONS_STARTED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "encryption_migration_migrations_started_total",
            "EnsureMigration invocations, by group_resource.",
        ),
        &["group_resource"],
    )
    .unwrap()
});

static MIGRATIONS_COMPLETED_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new(
            "encryption_migration_migrations_completed_total",
            "Migrations annotated as complete, by group_resource.",
        ),
        &["group_resource"],
    )
    .unwrap()
});

static ANNOTATION_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "encryption_migration_annotation_conflicts_total",
        "Optimistic-concurrency conflicts retried while annotating a key secret.",
    )
    .unwrap()
});

static RESOURCES_PROGRESSING: LazyLock<IntGauge> = LazyLock::new(|| {
    IntGauge::new(
        "encryption_migration_resources_progressing",
        "Number of GroupResources reported Progressing by the last Sync.",
    )
    .unwrap()
});

pub fn register_controller_metrics() {
    let registry = &super::registry::REGISTRY;
    let _ = registry.register(Box::new(SYNC_TOTAL.clone()));
    let _ = registry.register(Box::new(SYNC_ERRORS_TOTAL.clone()));
    let _ = registry.register(Box::new(SYNC_DURATION_SECONDS.clone()));
    let _ = registry.register(Box::new(MIGRATIONS_STARTED_TOTAL.clone()));
    let _ = registry.register(Box::new(MIGRATIONS_COMPLETED_TOTAL.clone()));
    let _ = registry.register(Box::new(ANNOTATION_CONFLICTS_TOTAL.clone()));
    let _ = registry.register(Box::new(RESOURCES_PROGRESSING.clone()));
}

pub fn record_sync(duration: std::time::Duration, errored: bool) {
    SYNC_TOTAL.inc();
    SYNC_DURATION_SECONDS.observe(duration.as_secs_f64());
    if errored {
        SYNC_ERRORS_TOTAL.inc();
    }
}

pub fn record_migration_started(group_resource: &str) {
    MIGRATIONS_STARTED_TOTAL.with_label_values(&[group_resource]).inc();
}

pub fn record_migration_completed(group_resource: &str) {
    MIGRATIONS_COMPLETED_TOTAL.with_label_values(&[group_resource]).inc();
}

pub fn record_annotation_conflict() {
    ANNOTATION_CONFLICTS_TOTAL.inc();
}

pub fn set_resources_progressing(count: i64) {
    RESOURCES_PROGRESSING.set(count);
}
