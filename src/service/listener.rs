//! Background listener forwarding platform transactions to the owner.

use super::owner::Command;
use crate::error::{EngineError, Result};
use crate::platform::PurchasePlatform;
use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use tracing::{debug, warn};

/// Whether the listener thread is attached to the update stream.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ListenerState {
    Idle,
    Listening,
}

/// A running listener thread.
pub(crate) struct Listener {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

impl Listener {
    pub(crate) fn spawn(
        platform: Arc<dyn PurchasePlatform>,
        mailbox: Sender<Command>,
    ) -> Result<Self> {
        let (stop, stop_rx) = bounded(1);
        let handle = thread::Builder::new()
            .name("entitlement-listener".into())
            .spawn(move || run(platform, mailbox, stop_rx))
            .map_err(|e| EngineError::System(format!("failed to spawn listener: {}", e)))?;
        Ok(Self { stop, handle })
    }

    /// The thread exited on its own (stream closed or owner gone).
    pub(crate) fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    pub(crate) fn stop(self) {
        let _ = self.stop.try_send(());
        if self.handle.join().is_err() {
            warn!("transaction listener panicked");
        }
    }
}

fn run(platform: Arc<dyn PurchasePlatform>, mailbox: Sender<Command>, stop: Receiver<()>) {
    // Subscribe before draining so nothing delivered in between is lost;
    // duplicates are harmless.
    let updates = platform.transaction_updates();

    match platform.unfinished_transactions() {
        Ok(pending) => {
            debug!(count = pending.len(), "draining unfinished transactions");
            for tx in pending {
                if mailbox.send(Command::Transaction(tx)).is_err() {
                    return;
                }
            }
        }
        Err(e) => warn!(error = %e, "could not enumerate unfinished transactions"),
    }

    loop {
        select! {
            recv(stop) -> _ => break,
            recv(updates) -> msg => match msg {
                Ok(tx) => {
                    if mailbox.send(Command::Transaction(tx)).is_err() {
                        break;
                    }
                }
                Err(_) => {
                    debug!("transaction update stream closed");
                    break;
                }
            },
        }
    }
}
