//! # EnvEncryptionProvider
//!
//! A reference `EncryptionProvider` that reads the managed GR list and the
//! global enable switch from configuration rather than process-wide state,
//! per the design note in spec.md §9 ("must be evaluated inside `Sync` so
//! toggling propagates without restart").

use crate::model::GroupResource;
use crate::traits::EncryptionProvider;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub struct EnvEncryptionProvider {
    group_resources: Vec<GroupResource>,
    enabled: Arc<AtomicBool>,
}

impl EnvEncryptionProvider {
    pub fn new(group_resources: Vec<GroupResource>, enabled: Arc<AtomicBool>) -> Self {
        Self {
            group_resources,
            enabled,
        }
    }
}

#[async_trait]
impl EncryptionProvider for EnvEncryptionProvider {
    fn encrypted_group_resources(&self) -> Vec<GroupResource> {
        self.group_resources.clone()
    }

    async fn should_run_encryption_controllers(&self) -> anyhow::Result<bool> {
        Ok(self.enabled.load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn reflects_current_flag_value() {
        let flag = Arc::new(AtomicBool::new(true));
        let provider = EnvEncryptionProvider::new(vec![GroupResource::new("", "secrets")], flag.clone());
        assert!(provider.should_run_encryption_controllers().await.unwrap());
        flag.store(false, Ordering::Relaxed);
        assert!(!provider.should_run_encryption_controllers().await.unwrap());
    }
}
