// Copyright 2025 ScopeDB <contact@scopedb.io>
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use std::collections::BTreeMap;
use std::collections::BTreeSet;
use std::collections::HashMap;
use std::fmt::Debug;
use std::ops::Range;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::sync::RwLockReadGuard;
use std::sync::RwLockWriteGuard;
use std::time::Instant;

use error_stack::Report;
use error_stack::bail;
use shardring_metrics::GlobalMetrics;
use shardring_metrics::RingMetrics;

use crate::RingConfig;
use crate::RingError;
use crate::hasher::DoubleFnv;
use crate::hasher::HasherKind;
use crate::hasher::KeyHasher;

/// The weight a node gets when it is added without an explicit one.
pub const DEFAULT_WEIGHT: u32 = 1;

const REPLICA_SEPARATOR: &str = "%%";

/// A weighted consistent hash ring.
///
/// Every node owns `weight` replica positions on a `u64` ring. A key belongs to
/// the node owning the first position at or after the key's hash, wrapping
/// around to the smallest position. Adding, removing or reweighting a node only
/// moves the keys whose nearest position changed owner.
///
/// All state lives behind one reader-writer lock: mutations take it exclusively
/// and lookups share it. Mutations take `&self` and return `&Self` so they can
/// be chained; invalid input (zero weight, duplicate add, unknown node) leaves
/// the ring untouched.
///
/// Placing replicas re-sorts the full position list, so adding a node costs
/// O(V log V) in the total replica count V and removing one costs O(V) per
/// replica. Lookups are O(log V).
///
/// # Examples
///
/// ```
/// use shardring::HashRing;
///
/// let ring = HashRing::from(["node-1", "node-2", "node-3"]);
/// let node = ring.locate_key_str("key1").unwrap();
/// assert!(ring.contains_node(&node));
///
/// ring.add_node_weight("node-4", 4).del_node("node-1");
/// assert_eq!(ring.node_count(), 3);
/// assert_eq!(ring.replica_count(), 6);
/// ```
pub struct HashRing<H = DoubleFnv> {
    hasher: H,
    state: RwLock<RingState>,
}

#[derive(Default)]
struct RingState {
    weights: HashMap<String, u32>,
    owners: HashMap<u64, String>,
    /// Ascending; equals the key set of `owners`.
    positions: Vec<u64>,
}

impl RingState {
    /// Places the given replicas of `node` without restoring the order of
    /// `positions`; callers sort once they are done placing.
    fn place_replicas<H: KeyHasher>(&mut self, hasher: &H, node: &str, replicas: Range<u32>) {
        for replica in replicas {
            let position = replica_position(hasher, node, replica);
            match self.owners.insert(position, node.to_string()) {
                None => self.positions.push(position),
                Some(previous) if previous != node => {
                    log::warn!(
                        target: "ring",
                        "replica {replica} of node {node} takes position {position} over from node {previous}"
                    );
                }
                Some(_) => {}
            }
        }
    }

    /// Removes the given replicas of `node`. Positions taken over by another
    /// node through a hash collision stay where they are.
    fn remove_replicas<H: KeyHasher>(&mut self, hasher: &H, node: &str, replicas: Range<u32>) {
        for replica in replicas {
            let position = replica_position(hasher, node, replica);
            if self.owners.get(&position).is_none_or(|owner| owner != node) {
                continue;
            }
            self.owners.remove(&position);
            if let Ok(index) = self.positions.binary_search(&position) {
                self.positions.remove(index);
            }
        }
    }

    fn sort(&mut self) {
        self.positions.sort_unstable();
    }

    /// Index of the first position at or after `digest`, wrapping to zero.
    fn successor(&self, digest: u64) -> usize {
        let index = self.positions.partition_point(|position| *position < digest);
        if index == self.positions.len() { 0 } else { index }
    }

    fn locate(&self, digest: u64) -> Option<&str> {
        if self.positions.is_empty() {
            return None;
        }
        let position = self.positions[self.successor(digest)];
        self.owners.get(&position).map(String::as_str)
    }

    fn locate_until<F>(&self, digest: u64, predicate: F) -> Option<&str>
    where
        F: Fn(&str) -> bool,
    {
        let start = self.successor(digest);
        self.positions[start..]
            .iter()
            .chain(self.positions[..start].iter())
            .filter_map(|position| self.owners.get(position))
            .map(String::as_str)
            .find(|node| predicate(node))
    }
}

fn replica_position<H: KeyHasher>(hasher: &H, node: &str, replica: u32) -> u64 {
    let key = format!("{node}{REPLICA_SEPARATOR}{replica}");
    hasher.hash(key.as_bytes())
}

fn record_mutation(state: &RingState, operation: &str, start: Instant) {
    let metrics = &GlobalMetrics::get().ring;
    let labels = RingMetrics::operation_labels(operation);
    metrics.mutations.add(1, &labels);
    metrics
        .mutation_duration
        .record(start.elapsed().as_secs_f64(), &labels);
    metrics.record_size(state.weights.len(), state.positions.len());
}

impl<H> Debug for HashRing<H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.read();
        let weights = state
            .weights
            .iter()
            .map(|(node, weight)| (node.as_str(), *weight))
            .collect::<BTreeMap<_, _>>();
        let positions = state
            .owners
            .iter()
            .map(|(position, node)| (*position, node.as_str()))
            .collect::<BTreeMap<_, _>>();
        f.debug_struct("HashRing")
            .field("weights", &weights)
            .field("positions", &positions)
            .finish()
    }
}

impl<I, N> From<I> for HashRing<DoubleFnv>
where
    I: IntoIterator<Item = N>,
    N: Into<String>,
{
    fn from(iter: I) -> Self {
        Self::new(iter, DoubleFnv)
    }
}

impl HashRing<HasherKind> {
    /// Builds a ring from its configuration, with the configured hash strategy.
    pub fn from_config(config: &RingConfig) -> Self {
        Self::with_weights(
            config
                .nodes
                .iter()
                .map(|node| (node.id.clone(), node.weight)),
            config.hasher,
        )
    }
}

impl<H> HashRing<H> {
    fn read(&self) -> RwLockReadGuard<'_, RingState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, RingState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the hash strategy the ring was built with.
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// Returns the current node set.
    pub fn nodes(&self) -> BTreeSet<String> {
        self.read().weights.keys().cloned().collect()
    }

    /// Returns a copy of the node to weight mapping.
    pub fn node_weights(&self) -> BTreeMap<String, u32> {
        self.read()
            .weights
            .iter()
            .map(|(node, weight)| (node.clone(), *weight))
            .collect()
    }

    /// Returns a copy of the ring, grouped by owner. Each node's positions are
    /// in ascending order.
    pub fn ring_snapshot(&self) -> BTreeMap<String, Vec<u64>> {
        let state = self.read();
        let mut snapshot = BTreeMap::<String, Vec<u64>>::new();
        for position in &state.positions {
            if let Some(node) = state.owners.get(position) {
                snapshot.entry(node.clone()).or_default().push(*position);
            }
        }
        snapshot
    }

    /// Whether `node` is currently on the ring.
    pub fn contains_node(&self, node: &str) -> bool {
        self.read().weights.contains_key(node)
    }

    /// The number of nodes on the ring.
    pub fn node_count(&self) -> usize {
        self.read().weights.len()
    }

    /// The total number of replica positions on the ring.
    pub fn replica_count(&self) -> usize {
        self.read().positions.len()
    }

    /// Whether the ring has no replica positions; lookups fail while it does.
    pub fn is_empty(&self) -> bool {
        self.read().positions.is_empty()
    }
}

impl<H> HashRing<H>
where
    H: KeyHasher,
{
    /// Creates a ring where every node has [`DEFAULT_WEIGHT`]. Repeated ids are
    /// placed once.
    pub fn new<I, N>(nodes: I, hasher: H) -> Self
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        Self::with_weights(
            nodes.into_iter().map(|node| (node, DEFAULT_WEIGHT)),
            hasher,
        )
    }

    /// Creates a ring from explicit node weights. Zero-weight entries are
    /// skipped, and the first weight given for a repeated id wins.
    pub fn with_weights<I, N>(weights: I, hasher: H) -> Self
    where
        I: IntoIterator<Item = (N, u32)>,
        N: Into<String>,
    {
        let mut state = RingState::default();
        for (node, weight) in weights {
            let node = node.into();
            if weight == 0 {
                log::warn!(target: "ring", "skipping node {node} with zero weight");
                continue;
            }
            if state.weights.contains_key(&node) {
                log::warn!(target: "ring", "skipping repeated node {node}");
                continue;
            }
            state.place_replicas(&hasher, &node, 0..weight);
            state.weights.insert(node, weight);
        }
        state.sort();

        log::debug!(
            target: "ring",
            "built ring with {} nodes and {} replicas",
            state.weights.len(),
            state.positions.len()
        );
        GlobalMetrics::get()
            .ring
            .record_size(state.weights.len(), state.positions.len());

        Self {
            hasher,
            state: RwLock::new(state),
        }
    }

    /// Adds a node with [`DEFAULT_WEIGHT`].
    pub fn add_node(&self, node: &str) -> &Self {
        self.add_node_weight(node, DEFAULT_WEIGHT)
    }

    /// Adds a node owning `weight` replica positions.
    ///
    /// Does nothing if `weight` is zero or the node is already on the ring; use
    /// [`HashRing::update_node_weight`] to change an existing node's weight.
    pub fn add_node_weight(&self, node: &str, weight: u32) -> &Self {
        if weight == 0 {
            log::trace!(target: "ring", "ignoring add of node {node} with zero weight");
            return self;
        }

        let start = Instant::now();
        let mut state = self.write();
        if state.weights.contains_key(node) {
            log::trace!(target: "ring", "ignoring add of existing node {node}");
            return self;
        }

        state.place_replicas(&self.hasher, node, 0..weight);
        state.sort();
        state.weights.insert(node.to_string(), weight);

        log::debug!(
            target: "ring",
            "added node {node} with weight {weight}; ring has {} replicas",
            state.positions.len()
        );
        record_mutation(&state, RingMetrics::OPERATION_ADD, start);
        self
    }

    /// Removes a node and all of its replica positions. Unknown nodes are ignored.
    pub fn del_node(&self, node: &str) -> &Self {
        let start = Instant::now();
        let mut state = self.write();
        let Some(weight) = state.weights.remove(node) else {
            log::trace!(target: "ring", "ignoring delete of unknown node {node}");
            return self;
        };

        state.remove_replicas(&self.hasher, node, 0..weight);

        log::debug!(
            target: "ring",
            "deleted node {node} with weight {weight}; ring has {} replicas",
            state.positions.len()
        );
        record_mutation(&state, RingMetrics::OPERATION_DELETE, start);
        self
    }

    /// Changes the number of replica positions a node owns.
    ///
    /// Growing from `old` to `new` places replicas `old..new`; shrinking removes
    /// replicas `new..old`, so every other key keeps its destination. A weight of
    /// zero removes the node. Unknown nodes and unchanged weights are ignored.
    pub fn update_node_weight(&self, node: &str, weight: u32) -> &Self {
        let start = Instant::now();
        let mut state = self.write();
        let Some(&old_weight) = state.weights.get(node) else {
            log::trace!(target: "ring", "ignoring reweight of unknown node {node}");
            return self;
        };
        if old_weight == weight {
            log::trace!(target: "ring", "ignoring reweight of node {node} to its current weight {weight}");
            return self;
        }

        if weight > old_weight {
            state.place_replicas(&self.hasher, node, old_weight..weight);
            state.sort();
        } else {
            state.remove_replicas(&self.hasher, node, weight..old_weight);
        }

        if weight == 0 {
            state.weights.remove(node);
        } else {
            state.weights.insert(node.to_string(), weight);
        }

        log::debug!(
            target: "ring",
            "reweighted node {node} from {old_weight} to {weight}; ring has {} replicas",
            state.positions.len()
        );
        record_mutation(&state, RingMetrics::OPERATION_UPDATE, start);
        self
    }

    /// Locates the node owning `key`.
    ///
    /// Fails with [`RingError::EmptyRing`] if the ring has no positions.
    pub fn locate_key<K>(&self, key: K) -> Result<String, Report<RingError>>
    where
        K: AsRef<[u8]>,
    {
        let digest = self.hasher.hash(key.as_ref());
        let metrics = &GlobalMetrics::get().ring;
        let state = self.read();
        let Some(node) = state.locate(digest) else {
            metrics.lookups.add(
                1,
                &RingMetrics::status_labels(RingMetrics::STATUS_EMPTY_RING),
            );
            bail!(RingError::EmptyRing);
        };
        metrics
            .lookups
            .add(1, &RingMetrics::status_labels(RingMetrics::STATUS_SUCCESS));
        Ok(node.to_string())
    }

    pub fn locate_key_str(&self, key: &str) -> Result<String, Report<RingError>> {
        self.locate_key(key.as_bytes())
    }

    /// Walks the ring clockwise from `key` and returns the first owner that
    /// satisfies `predicate`, or `None` if no node does.
    pub fn locate_key_until<K, F>(
        &self,
        key: K,
        predicate: F,
    ) -> Result<Option<String>, Report<RingError>>
    where
        K: AsRef<[u8]>,
        F: Fn(&str) -> bool,
    {
        let digest = self.hasher.hash(key.as_ref());
        let state = self.read();
        if state.positions.is_empty() {
            bail!(RingError::EmptyRing);
        }
        Ok(state.locate_until(digest, predicate).map(str::to_string))
    }

    /// Returns the positions a node currently owns, in ascending order.
    pub fn replica_positions(&self, node: &str) -> Vec<u64> {
        let state = self.read();
        let Some(&weight) = state.weights.get(node) else {
            return vec![];
        };
        let mut positions = (0..weight)
            .map(|replica| replica_position(&self.hasher, node, replica))
            .filter(|position| state.owners.get(position).is_some_and(|owner| owner == node))
            .collect::<Vec<_>>();
        positions.sort_unstable();
        positions.dedup();
        positions
    }
}
