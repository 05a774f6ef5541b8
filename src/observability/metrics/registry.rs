//! # Metrics registry
//!
//! Shared Prometheus registry every metric family registers into.

use prometheus::Registry;
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

pub fn register_metrics() {
    super::controller_metrics::register_controller_metrics();
}
