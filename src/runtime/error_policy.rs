//! # Watch stream error policy
//!
//! Classifies errors surfaced by the key-secret, deployed-config and
//! storage-version-migration watch streams so `SyncLoop`'s spawned tasks
//! log at the right severity instead of treating every watch hiccup the
//! same way.

use kube::runtime::watcher;

pub fn log_watch_error(context: &str, error: &watcher::Error) {
    match error {
        watcher::Error::WatchFailed(kube::Error::Api(api_err)) if api_err.code == 410 => {
            tracing::info!(context, "watch resource-version expired (410 Gone), relisting");
        }
        watcher::Error::WatchFailed(kube::Error::Api(api_err)) if api_err.code == 401 => {
            tracing::error!(
                context,
                "watch rejected as unauthorized (401) — check the controller's RBAC and service account token"
            );
        }
        watcher::Error::WatchFailed(kube::Error::Api(api_err)) if api_err.code == 429 => {
            tracing::warn!(context, "watch throttled by the API server (429), backing off");
        }
        watcher::Error::WatchFailed(kube::Error::Api(api_err)) if api_err.code == 404 => {
            tracing::warn!(context, "watched resource not found (404)");
        }
        other => {
            tracing::warn!(context, error = %other, "watch stream error");
        }
    }
}
