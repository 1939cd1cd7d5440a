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

mod config;
mod hasher;
mod ring;

pub use config::NodeConfig;
pub use config::RingConfig;
pub use hasher::DoubleFnv;
pub use hasher::HasherKind;
pub use hasher::KeyHasher;
pub use hasher::Sha256Hasher;
pub use ring::DEFAULT_WEIGHT;
pub use ring::HashRing;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RingError {
    #[error("cannot locate a key on an empty ring")]
    EmptyRing,
}

#[derive(Debug, Error)]
#[error("{0}")]
pub struct ConfigError(pub String);
