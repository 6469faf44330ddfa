//! Parallel dispatch: ask several conodes, keep the first good answer.
//!
//! # Algorithm
//!
//! 1. Plan the call with the quorum planner; refuse it if the quorum cannot
//!    be reached
//! 2. Keep up to `quorum` requests in flight, one spawned task per node
//! 3. Decode every reply on its own; a failure hands the slot to the next
//!    node of the plan
//! 4. Return the first decoded reply together with the node that sent it
//!
//! Requests still in flight when a winner is found are not awaited. They
//! finish in the background and their results are discarded.

use std::fmt::Display;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use corelib::{codec, Message, ServerIdentity};
use quorum::ParallelOptions;

use crate::client::Client;
use crate::error::{Result, RpcError};

type Outcome<T> = (ServerIdentity, std::result::Result<T, String>);

impl Client {
    /// Send `request` to the nodes of `nodes` and return the first reply
    /// that decodes as `Resp`, with the node that sent it.
    ///
    /// `nodes` may be a [`Roster`](corelib::Roster), a slice or a vector of
    /// identities.
    pub async fn send_parallel<N, Req, Resp>(
        &self,
        nodes: &N,
        request: &Req,
        options: Option<&ParallelOptions>,
    ) -> Result<(Resp, ServerIdentity)>
    where
        N: AsRef<[ServerIdentity]> + Sync + ?Sized,
        Req: Message,
        Resp: DeserializeOwned + Send + 'static,
    {
        self.send_parallel_with_decoder(nodes, request, options, codec::decode::<Resp>)
            .await
    }

    /// Like [`send_parallel`](Self::send_parallel), with a caller supplied
    /// decoder that may also reject replies.
    ///
    /// # Errors
    ///
    /// - [`RpcError::QuorumUnreachable`] before anything is sent, when
    ///   `quit_error` is set and too few nodes are left
    /// - [`RpcError::ParallelExhausted`] when no node gave a reply the decoder
    ///   accepted; it carries the text of the last failure
    pub async fn send_parallel_with_decoder<N, Req, T, E, F>(
        &self,
        nodes: &N,
        request: &Req,
        options: Option<&ParallelOptions>,
        decoder: F,
    ) -> Result<(T, ServerIdentity)>
    where
        N: AsRef<[ServerIdentity]> + Sync + ?Sized,
        Req: Message,
        T: Send + 'static,
        E: Display + 'static,
        F: Fn(&[u8]) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        let plan = quorum::get_list(options, nodes);
        if plan.quit() {
            return Err(RpcError::QuorumUnreachable {
                available: plan.len(),
                required: plan.count(),
            });
        }

        let payload: Arc<[u8]> = codec::encode(request)?.into();
        let decoder = Arc::new(decoder);
        let (quorum, mut queue) = plan.into_parts();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outcome<T>>();

        let mut in_flight = 0;
        let mut tried = 0;
        let mut last = None;
        loop {
            while in_flight < quorum.max(1) {
                let Some(node) = queue.next() else { break };
                self.spawn_attempt(node, Req::PATH, Arc::clone(&payload), Arc::clone(&decoder), tx.clone());
                in_flight += 1;
                tried += 1;
            }
            if in_flight == 0 {
                break;
            }

            let Some((node, outcome)) = rx.recv().await else { break };
            in_flight -= 1;
            match outcome {
                Ok(value) => {
                    debug!(node = %node.id(), tried, "parallel call answered");
                    return Ok((value, node));
                }
                Err(e) => {
                    warn!(node = %node.id(), error = %e, "parallel request failed");
                    last = Some(e);
                }
            }
        }

        Err(RpcError::ParallelExhausted {
            tried,
            last: last.unwrap_or_else(|| "no node to ask".to_string()),
        })
    }

    fn spawn_attempt<T, E, F>(
        &self,
        node: ServerIdentity,
        path: &'static str,
        payload: Arc<[u8]>,
        decoder: Arc<F>,
        tx: mpsc::UnboundedSender<Outcome<T>>,
    ) where
        T: Send + 'static,
        E: Display + 'static,
        F: Fn(&[u8]) -> std::result::Result<T, E> + Send + Sync + 'static,
    {
        let client = self.clone();
        tokio::spawn(async move {
            let outcome = match client.send(&node, path, &payload).await {
                Ok(reply) => (*decoder)(&reply[..]).map_err(|e| format!("{}: {}", node, e)),
                Err(e) => Err(format!("{}: {}", node, e)),
            };
            // The receiver is gone once the call has its answer.
            let _ = tx.send((node, outcome));
        });
    }
}
