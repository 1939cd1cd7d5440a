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

use behavior_tests::Testkit;
use behavior_tests::harness;
use insta::assert_compact_debug_snapshot;
use pretty_assertions::assert_eq;
use shardring::DoubleFnv;
use shardring::HashRing;
use shardring::RingError;
use test_harness::test;
use tests_toolkit::FixedHasher;
use tests_toolkit::route;
use tests_toolkit::sample_keys;

fn assert_moved_only_to(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
    node: &str,
) {
    for (key, dest) in after {
        let prev = &before[key];
        assert!(
            dest == prev || dest == node,
            "{key} moved from {prev} to {dest}, expected {node}"
        );
    }
}

fn assert_moved_only_from(
    before: &BTreeMap<String, String>,
    after: &BTreeMap<String, String>,
    node: &str,
) {
    for (key, prev) in before {
        let dest = &after[key];
        if prev == node {
            assert_ne!(dest, node, "{key} still routed to {node}");
        } else {
            assert_eq!(dest, prev, "{key} moved away from {prev}");
        }
    }
}

#[test(harness)]
fn test_months_add_then_delete(testkit: Testkit) {
    let [a, b, c] = testkit.hosts();
    let d = "185.199.110.156";
    let months = testkit.months();

    let ring = testkit.ring([a, b, c]);
    let initial = route(&ring, &months);

    ring.add_node_weight(d, 1);
    let added = route(&ring, &months);
    assert_moved_only_to(&initial, &added, d);

    ring.del_node(a);
    let deleted = route(&ring, &months);
    assert_moved_only_from(&added, &deleted, a);

    // the mutated ring routes exactly like one built from the surviving nodes
    let fresh = testkit.ring([b, c, d]);
    assert_eq!(route(&fresh, &months), deleted);
}

#[test(harness)]
fn test_weighted_months_add_then_delete(testkit: Testkit) {
    let [a, b, c] = testkit.hosts();
    let d = "185.199.110.156";
    let months = testkit.months();

    let ring = HashRing::with_weights([(a, 3), (b, 2), (c, 1)], DoubleFnv);
    let initial = route(&ring, &months);

    ring.add_node_weight(d, 1);
    let added = route(&ring, &months);
    assert_moved_only_to(&initial, &added, d);

    ring.del_node(a);
    let deleted = route(&ring, &months);
    assert_moved_only_from(&added, &deleted, a);

    assert_compact_debug_snapshot!(
        ring.node_weights(),
        @r#"{"185.199.110.154": 2, "185.199.110.155": 1, "185.199.110.156": 1}"#
    );
}

#[test(harness)]
fn test_delete_moves_keys_to_successor(_testkit: Testkit) {
    let hasher = FixedHasher::new()
        .with("A%%0", 100)
        .with("B%%0", 200)
        .with("C%%0", 300);
    let ring = HashRing::new(["A", "B", "C"], hasher);
    let keys = ["50", "100", "150", "250", "301"];
    assert_compact_debug_snapshot!(
        route(&ring, &keys),
        @r#"{"100": "A", "150": "B", "250": "C", "301": "A", "50": "A"}"#
    );

    ring.del_node("A");
    assert_compact_debug_snapshot!(
        route(&ring, &keys),
        @r#"{"100": "B", "150": "B", "250": "C", "301": "B", "50": "B"}"#
    );
}

#[test(harness)]
fn test_determinism_and_membership(testkit: Testkit) {
    let ring = HashRing::with_weights(
        (0..16).map(|i| (format!("node-{i}"), 1 + i % 4)),
        DoubleFnv,
    );
    let keys = sample_keys(10_000);
    let first = route(&ring, &keys);
    let second = route(&ring, &keys);
    assert_eq!(first, second);

    let nodes = ring.nodes();
    assert!(first.values().all(|node| nodes.contains(node)));

    // a second ring over the same state agrees
    let twin = HashRing::with_weights(ring.node_weights(), DoubleFnv);
    assert_eq!(route(&twin, &keys), first);
    assert_eq!(twin.ring_snapshot(), ring.ring_snapshot());
    log::debug!(target: "test", "{}: {} keys routed", testkit.test_name, keys.len());
}

#[test(harness)]
fn test_bounded_impact(_testkit: Testkit) {
    let ring = HashRing::with_weights((0..10).map(|i| (format!("node-{i}"), 50)), DoubleFnv);
    let keys = sample_keys(20_000);
    let before = route(&ring, &keys);

    ring.del_node("node-3");
    let after = route(&ring, &keys);
    assert_moved_only_from(&before, &after, "node-3");

    ring.add_node_weight("node-3", 50);
    assert_eq!(route(&ring, &keys), before);
}

#[test(harness)]
fn test_reweight_moves_only_affected_keys(_testkit: Testkit) {
    let ring = HashRing::with_weights((0..6).map(|i| (format!("node-{i}"), 20)), DoubleFnv);
    let keys = sample_keys(10_000);
    let initial = route(&ring, &keys);

    ring.update_node_weight("node-2", 60);
    let grown = route(&ring, &keys);
    assert_moved_only_to(&initial, &grown, "node-2");
    assert_eq!(ring.replica_positions("node-2").len(), 60);

    ring.update_node_weight("node-2", 20);
    assert_eq!(route(&ring, &keys), initial);

    ring.update_node_weight("node-2", 5);
    let shrunk = route(&ring, &keys);
    for (key, prev) in &initial {
        if prev != "node-2" {
            assert_eq!(&shrunk[key], prev);
        }
    }
    assert_eq!(ring.node_weights()["node-2"], 5);
}

#[test(harness)]
fn test_weighted_fairness(_testkit: Testkit) {
    let weights = [("alpha", 400u32), ("beta", 800), ("gamma", 1200)];
    let total = weights.iter().map(|(_, weight)| *weight).sum::<u32>() as f64;
    let ring = HashRing::with_weights(weights, DoubleFnv);

    let keys = sample_keys(100_000);
    let mut counts = BTreeMap::<String, usize>::new();
    for node in route(&ring, &keys).into_values() {
        *counts.entry(node).or_default() += 1;
    }

    for (node, weight) in weights {
        let expected = weight as f64 / total;
        let actual = counts.get(node).copied().unwrap_or_default() as f64 / keys.len() as f64;
        log::info!(target: "test", "{node}: expected share {expected:.3}, actual {actual:.3}");
        assert!(
            (actual - expected).abs() <= expected * 0.2,
            "{node}: expected share {expected:.3}, actual {actual:.3}"
        );
    }
}

#[test(harness)]
fn test_idempotent_add(testkit: Testkit) {
    let ring = testkit.ring(testkit.hosts());
    ring.add_node_weight("185.199.110.156", 4);
    let weights = ring.node_weights();
    let snapshot = ring.ring_snapshot();

    ring.add_node_weight("185.199.110.156", 4)
        .add_node_weight("185.199.110.156", 9)
        .add_node("185.199.110.153");
    assert_eq!(ring.node_weights(), weights);
    assert_eq!(ring.ring_snapshot(), snapshot);
    assert_eq!(ring.replica_positions("185.199.110.156").len(), 4);
}

#[test(harness)]
fn test_emptying(testkit: Testkit) {
    let hosts = testkit.hosts();
    let ring = HashRing::with_weights(hosts.map(|host| (host, 3)), DoubleFnv);
    assert_eq!(ring.replica_count(), 9);

    for host in hosts {
        ring.del_node(host);
    }
    assert!(ring.nodes().is_empty());
    assert!(ring.node_weights().is_empty());
    assert!(ring.ring_snapshot().is_empty());
    assert_eq!(ring.replica_count(), 0);

    let err = ring.locate_key_str("January").unwrap_err();
    assert_eq!(err.current_context(), &RingError::EmptyRing);

    // the ring is usable again after being emptied
    ring.add_node(hosts[0]);
    assert_eq!(ring.locate_key_str("January").unwrap(), hosts[0]);
}
