//! Keep-alive connections of a client.
//!
//! One slot per destination, created on first use. A slot holds at most one
//! connection; a call takes it out for the duration of the round trip and
//! puts it back only if the connection is still in a known-good state.
//! A call that fails at the transport level, or is cancelled mid-flight,
//! leaves the slot empty and the next call reconnects.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::debug;

use corelib::{Connection, IdentityId};

pub(crate) type Slot = Arc<Mutex<Option<Connection>>>;

#[derive(Default)]
pub(crate) struct ConnectionPool {
    slots: DashMap<IdentityId, Slot>,
}

impl ConnectionPool {
    /// Slot for `id`, created empty if missing.
    pub(crate) fn slot(&self, id: IdentityId) -> Slot {
        Arc::clone(&self.slots.entry(id).or_default())
    }

    /// Open connections currently held.
    pub(crate) async fn held(&self) -> usize {
        let mut held = 0;
        for slot in self.snapshot() {
            if slot.lock().await.is_some() {
                held += 1;
            }
        }
        held
    }

    /// Close and forget every held connection.
    ///
    /// Waits for calls in progress on a slot to hand their connection back.
    pub(crate) async fn drain(&self) -> usize {
        let slots = self.snapshot();
        self.slots.clear();

        let mut closed = 0;
        for slot in slots {
            let taken = slot.lock().await.take();
            if let Some(mut conn) = taken {
                if let Err(e) = conn.close().await {
                    debug!(peer = conn.peer(), error = %e, "error closing pooled connection");
                }
                closed += 1;
            }
        }
        closed
    }

    fn snapshot(&self) -> Vec<Slot> {
        self.slots.iter().map(|entry| Arc::clone(entry.value())).collect()
    }
}
