//! Quorum planner.
//!
//! Turns a roster and a set of [`ParallelOptions`] into the list of nodes a
//! parallel call may ask, and the number of them asked at once.
//!
//! # Algorithm
//!
//! 1. Walk the roster starting at `start_node`, wrapping around
//! 2. Drop every node in `ignore_nodes`
//! 3. Shuffle the result unless `dont_shuffle` is set
//! 4. Quorum = `ask_nodes`, or `n/2 + 1` of the full roster length `n`
//!
//! # Performance
//!
//! - **Time**: O(n) for the walk and the shuffle
//! - **Space**: O(n) - one copy of the identities

use rand::seq::SliceRandom;
use tracing::debug;

use corelib::ServerIdentity;

use crate::options::ParallelOptions;

/// The outcome of planning one parallel call.
#[derive(Debug, Clone)]
pub struct QuorumPlan {
    count: usize,
    nodes: Vec<ServerIdentity>,
    quit_error: bool,
}

impl QuorumPlan {
    /// Nominal quorum: how many nodes are asked at once.
    pub fn count(&self) -> usize {
        self.count
    }

    /// Nodes that may be asked, in the order they will be asked.
    pub fn nodes(&self) -> &[ServerIdentity] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// True when `quit_error` is set and fewer nodes are left than the
    /// quorum asks for, so the call can be refused before dispatch.
    pub fn quit(&self) -> bool {
        self.quit_error && self.nodes.len() < self.count
    }

    /// Split into the quorum count and the one-shot node sequence.
    pub fn into_parts(self) -> (usize, NodeQueue) {
        (
            self.count,
            NodeQueue {
                inner: self.nodes.into_iter(),
            },
        )
    }
}

/// Finite, non-restartable sequence of nodes to ask.
#[derive(Debug)]
pub struct NodeQueue {
    inner: std::vec::IntoIter<ServerIdentity>,
}

impl NodeQueue {
    /// Nodes not handed out yet.
    pub fn remaining(&self) -> usize {
        self.inner.len()
    }
}

impl Iterator for NodeQueue {
    type Item = ServerIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next()
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl ExactSizeIterator for NodeQueue {}

impl ParallelOptions {
    /// Plan a parallel call over `nodes`.
    pub fn get_list(&self, nodes: &[ServerIdentity]) -> QuorumPlan {
        let n = nodes.len();
        let count = self.quorum_count(n);
        let start = if n == 0 { 0 } else { self.start_node % n };

        let mut list: Vec<ServerIdentity> = (0..n)
            .map(|i| &nodes[(start + i) % n])
            .filter(|si| !self.ignore_nodes.contains(*si))
            .cloned()
            .collect();

        if !self.dont_shuffle {
            list.shuffle(&mut rand::thread_rng());
        }

        debug!(
            roster = n,
            queryable = list.len(),
            quorum = count,
            "planned parallel call"
        );

        QuorumPlan {
            count,
            nodes: list,
            quit_error: self.quit_error,
        }
    }
}

/// Plan with optional options; `None` behaves like the default options.
///
/// `nodes` is anything that reads as a list of identities, such as a
/// [`Roster`](corelib::Roster) or a `Vec<ServerIdentity>`.
pub fn get_list<N>(opts: Option<&ParallelOptions>, nodes: &N) -> QuorumPlan
where
    N: AsRef<[ServerIdentity]> + ?Sized,
{
    let nodes = nodes.as_ref();
    match opts {
        Some(opts) => opts.get_list(nodes),
        None => ParallelOptions::default().get_list(nodes),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use corelib::PublicKey;

    fn nodes(n: u8) -> Vec<ServerIdentity> {
        (0..n)
            .map(|i| ServerIdentity::new(PublicKey::new(vec![i]), format!("127.0.0.1:{}", 7000 + i as u16)))
            .collect()
    }

    #[test]
    fn test_rotation_wraps() {
        let roster = nodes(4);
        let plan = ParallelOptions::new().start_node(6).dont_shuffle(true).get_list(&roster);
        let order: Vec<_> = plan.nodes().to_vec();
        assert_eq!(order, vec![roster[2].clone(), roster[3].clone(), roster[0].clone(), roster[1].clone()]);
    }

    #[test]
    fn test_queue_is_consumed_once() {
        let plan = get_list(None, &nodes(3));
        let (count, mut queue) = plan.into_parts();
        assert_eq!(count, 2);
        assert_eq!(queue.remaining(), 3);
        assert!(queue.next().is_some());
        assert_eq!(queue.remaining(), 2);
        assert_eq!(queue.by_ref().count(), 2);
        assert!(queue.next().is_none());
    }

    #[test]
    fn test_empty_roster() {
        let plan = get_list(None, &Vec::new());
        assert_eq!(plan.count(), 1);
        assert!(plan.is_empty());
        assert!(!plan.quit());
        assert!(ParallelOptions::new().quit_error(true).get_list(&[]).quit());
    }
}
