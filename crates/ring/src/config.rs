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

use std::str::FromStr;

use error_stack::Report;
use error_stack::ResultExt;
use serde::Deserialize;
use serde::Serialize;
use serde::de::IntoDeserializer;
use toml_edit::DocumentMut;

use crate::ConfigError;
use crate::DEFAULT_WEIGHT;
use crate::HasherKind;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RingConfig {
    #[serde(default)]
    pub hasher: HasherKind,
    #[serde(default)]
    pub nodes: Vec<NodeConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    pub id: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    DEFAULT_WEIGHT
}

impl RingConfig {
    /// Parses a ring configuration from TOML.
    ///
    /// ```toml
    /// hasher = "double_fnv"
    ///
    /// [[nodes]]
    /// id = "185.199.110.153"
    /// weight = 3
    ///
    /// [[nodes]]
    /// id = "185.199.110.154"
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, Report<ConfigError>> {
        let config = DocumentMut::from_str(content)
            .change_context_lazy(|| ConfigError("failed to parse ring config".to_string()))?;
        RingConfig::deserialize(config.into_deserializer())
            .change_context_lazy(|| ConfigError("failed to deserialize ring config".to_string()))
    }
}
