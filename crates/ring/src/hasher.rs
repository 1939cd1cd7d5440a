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

use std::hash::Hasher;

use fnv::FnvHasher;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;

/// Maps a byte sequence to a position on the ring.
///
/// Implementations must be deterministic and should spread their output close
/// to uniformly over `u64`. A ring keeps its hasher for its whole lifetime, so
/// replica positions computed on insertion can be recomputed on removal.
///
/// Any `Fn(&[u8]) -> u64` closure is a `KeyHasher`, which lets tests pin
/// positions to fixed values:
///
/// ```
/// use shardring::HashRing;
///
/// let ring = HashRing::new(["a", "b"], |data: &[u8]| -> u64 {
///     match data {
///         b"a%%0" => 100,
///         b"b%%0" => 200,
///         _ => 150,
///     }
/// });
/// assert_eq!(ring.locate_key("any").unwrap(), "b");
/// ```
pub trait KeyHasher: Send + Sync {
    fn hash(&self, data: &[u8]) -> u64;
}

impl<F> KeyHasher for F
where
    F: Fn(&[u8]) -> u64 + Send + Sync,
{
    fn hash(&self, data: &[u8]) -> u64 {
        self(data)
    }
}

/// FNV-1a over the input, then FNV-1a again over the big-endian bytes of the
/// first digest. The second pass spreads short, similar inputs such as
/// `node%%0`, `node%%1` further apart on the ring.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DoubleFnv;

impl KeyHasher for DoubleFnv {
    fn hash(&self, data: &[u8]) -> u64 {
        let digest = fnv1a(data);
        fnv1a(&digest.to_be_bytes())
    }
}

fn fnv1a(data: &[u8]) -> u64 {
    let mut hasher = FnvHasher::default();
    hasher.write(data);
    hasher.finish()
}

/// The leading eight bytes of the SHA-256 digest, read as a big-endian integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Sha256Hasher;

impl KeyHasher for Sha256Hasher {
    fn hash(&self, data: &[u8]) -> u64 {
        let digest = Sha256::digest(data);
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        u64::from_be_bytes(prefix)
    }
}

/// A hash strategy that can be chosen by name in a [`crate::RingConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HasherKind {
    #[default]
    DoubleFnv,
    Sha256,
}

impl KeyHasher for HasherKind {
    fn hash(&self, data: &[u8]) -> u64 {
        match self {
            HasherKind::DoubleFnv => DoubleFnv.hash(data),
            HasherKind::Sha256 => Sha256Hasher.hash(data),
        }
    }
}
