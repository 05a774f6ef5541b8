//! # Fanout
//!
//! Shared helper backing the informer-like `subscribe()` methods on
//! `Migrator` and `Deployer`: each call hands back a fresh receiver, and
//! a single background task notifies every receiver still alive.

use std::sync::Mutex;
use tokio::sync::mpsc;

#[derive(Default)]
pub struct Fanout {
    senders: Mutex<Vec<mpsc::UnboundedSender<()>>>,
}

impl Fanout {
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<()> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.senders.lock().unwrap().push(tx);
        rx
    }

    /// Notifies every live subscriber, dropping ones whose receiver was
    /// closed.
    pub fn notify(&self) {
        let mut senders = self.senders.lock().unwrap();
        senders.retain(|tx| tx.send(()).is_ok());
    }
}
