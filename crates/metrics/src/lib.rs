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

use std::sync::LazyLock;

use opentelemetry::KeyValue;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Gauge;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;

pub struct GlobalMetrics {
    pub meter: Meter,
    pub ring: RingMetrics,
}

impl GlobalMetrics {
    fn new() -> Self {
        let meter = opentelemetry::global::meter("shardring");
        Self {
            ring: RingMetrics::new(meter.clone()),
            meter,
        }
    }

    pub fn get() -> &'static GlobalMetrics {
        static GLOBAL_METRICS: LazyLock<GlobalMetrics> = LazyLock::new(GlobalMetrics::new);
        &GLOBAL_METRICS
    }
}

pub struct RingMetrics {
    pub nodes: Gauge<u64>,
    pub replicas: Gauge<u64>,
    pub lookups: Counter<u64>,
    pub mutations: Counter<u64>,
    pub mutation_duration: Histogram<f64>,
}

impl RingMetrics {
    pub fn new(meter: Meter) -> Self {
        Self {
            nodes: meter
                .u64_gauge("shardring.ring.nodes")
                .with_description("The number of nodes in the ring")
                .build(),
            replicas: meter
                .u64_gauge("shardring.ring.replicas")
                .with_description("The number of replica positions in the ring")
                .build(),
            lookups: meter
                .u64_counter("shardring.lookup.count")
                .with_description("The number of key lookups")
                .build(),
            mutations: meter
                .u64_counter("shardring.mutation.count")
                .with_description("The number of mutations that changed the ring")
                .build(),
            mutation_duration: meter
                .f64_histogram("shardring.mutation.duration")
                .with_description("The duration of a ring mutation, including the re-sort")
                .with_unit("second")
                .with_boundaries(
                    [
                        0.000001, 0.000005, 0.00001, 0.00005, 0.0001, 0.0005, 0.001, 0.005, 0.01,
                        0.05, 0.1,
                    ]
                    .into(),
                )
                .build(),
        }
    }

    pub const OPERATION_ADD: &str = "add";
    pub const OPERATION_DELETE: &str = "delete";
    pub const OPERATION_UPDATE: &str = "update";

    pub const STATUS_SUCCESS: &str = "ok";
    pub const STATUS_EMPTY_RING: &str = "empty_ring";

    pub fn operation_labels(operation: &str) -> [KeyValue; 1] {
        [KeyValue::new("op", operation.to_string())]
    }

    pub fn status_labels(status: &str) -> [KeyValue; 1] {
        [KeyValue::new("status", status.to_string())]
    }

    /// Records the size of the ring after it has been built or mutated.
    pub fn record_size(&self, nodes: usize, replicas: usize) {
        self.nodes.record(nodes as u64, &[]);
        self.replicas.record(replicas as u64, &[]);
    }
}
