// Copyright 2022 Webb Technologies Inc.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use sp_core::crypto::AccountId32;
use sp_core::sr25519::Pair as Sr25519Pair;
use sp_core::Pair;

use crate::error::{Error, Result};
use crate::identity::{RelayerIdentity, SigningScheme};
use crate::types::ChainId;

const fn enabled_default() -> bool {
    true
}

const fn default_block_retry_limit() -> u32 {
    15
}

/// Nominal destination block time.
const fn default_round_interval_ms() -> u64 {
    6_000
}

const fn default_max_weight() -> u64 {
    22_698_000_000
}

const fn default_fee_rate() -> u64 {
    1_000
}

/// RelayerConfig is the configuration of the redeem writer.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(rename_all = "kebab-case")]
pub struct RelayerConfig {
    /// Destination chains and their writer configuration.
    ///
    /// a map between chain name and its configuration.
    #[serde(default)]
    pub chains: HashMap<String, WriterConfig>,
}

/// WriterConfig is the configuration of one destination-chain writer.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct WriterConfig {
    /// if it is enabled for this chain or not.
    #[serde(default = "enabled_default")]
    pub enabled: bool,
    /// The destination chain this writer serves.
    pub chain_id: ChainId,
    /// Websocket Endpoint for long living connections.
    #[serde(skip_serializing)]
    pub ws_endpoint: url::Url,
    /// Interprets the string in order to generate the relayer key pair; a
    /// SURI literal or a `$ENV_VAR` holding one.
    #[serde(skip_serializing)]
    pub suri: Suri,
    /// This relayer's index in the ordered relayer set.
    pub relayer_index: u64,
    /// Total number of relayers in the set.
    pub total_relayers: u64,
    /// Approvals required to dispatch the multisig call.
    pub threshold: u16,
    /// Hex account ids of all peers except this relayer.
    pub other_signatories: Vec<String>,
    /// Dispatch weight allowed on approve-path multisig calls.
    #[serde(default = "default_max_weight")]
    pub max_weight: u64,
    /// Caps both redeem attempts and submission retries.
    #[serde(default = "default_block_retry_limit")]
    pub block_retry_limit: u32,
    /// Round pacing in milliseconds; nominally one destination block time.
    #[serde(default = "default_round_interval_ms")]
    pub round_interval: u64,
    /// Bridge fee parameters.
    #[serde(default)]
    pub fee: FeeConfig,
    /// Append the resource id to transfer calls, for backward compatibility
    /// with the example pallet.
    #[serde(default)]
    pub extend_call: bool,
    /// Extrinsic wire format override; derived from the chain id when
    /// absent.
    #[serde(default)]
    pub signing: Option<SigningScheme>,
}

/// Bridge fee parameters.
#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct FeeConfig {
    /// Proportional fee divisor: `received / fee_rate` is added to the
    /// fixed fee.
    #[serde(default = "default_fee_rate")]
    pub fee_rate: u64,
    /// Fixed fee withheld from DOT redeems, in DOT units.
    #[serde(default)]
    pub fixed_dot_fee: u128,
    /// Fixed fee withheld from KSM redeems, in KSM units.
    #[serde(default)]
    pub fixed_ksm_fee: u128,
}

impl Default for FeeConfig {
    fn default() -> Self {
        Self {
            fee_rate: default_fee_rate(),
            fixed_dot_fee: 0,
            fixed_ksm_fee: 0,
        }
    }
}

impl WriterConfig {
    /// Round pacing as a [`Duration`].
    pub fn round_interval(&self) -> Duration {
        Duration::from_millis(self.round_interval)
    }

    /// The configured signing scheme, or the chain's conventional one:
    /// ChainX runtimes still take the legacy plain-address format.
    pub fn signing_scheme(&self) -> SigningScheme {
        self.signing.unwrap_or(match self.chain_id {
            ChainId::CHAINX_BTC | ChainId::CHAINX_PCX => {
                SigningScheme::PlainAddress
            }
            _ => SigningScheme::MultiAddress,
        })
    }

    /// Builds the relayer identity this configuration describes.
    pub fn identity(&self) -> Result<RelayerIdentity> {
        let mut others = Vec::with_capacity(self.other_signatories.len());
        for account in &self.other_signatories {
            let raw = hex::decode(account.trim_start_matches("0x")).map_err(
                |_| Error::InvalidRelayerSet("signatories must be hex encoded"),
            )?;
            let account = AccountId32::try_from(&raw[..]).map_err(|_| {
                Error::InvalidRelayerSet(
                    "signatories must be 32-byte account ids",
                )
            })?;
            others.push(account);
        }
        RelayerIdentity::new(
            self.suri.clone().into(),
            self.relayer_index,
            self.total_relayers,
            self.threshold,
            others,
            self.signing_scheme(),
        )
    }
}

/// The relayer's [`Substrate Uri`](https://polkadot.js.org/docs/keyring/start/suri/).
#[derive(Clone)]
pub struct Suri(Sr25519Pair);

impl std::fmt::Debug for Suri {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SubstratePrivateKey").finish()
    }
}

impl From<Suri> for Sr25519Pair {
    fn from(suri: Suri) -> Self {
        suri.0
    }
}

impl From<Sr25519Pair> for Suri {
    fn from(pair: Sr25519Pair) -> Self {
        Self(pair)
    }
}

impl std::ops::Deref for Suri {
    type Target = Sr25519Pair;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl<'de> Deserialize<'de> for Suri {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct PrivateKeyVistor;
        impl<'de> serde::de::Visitor<'de> for PrivateKeyVistor {
            type Value = Sr25519Pair;

            fn expecting(
                &self,
                formatter: &mut std::fmt::Formatter,
            ) -> std::fmt::Result {
                formatter.write_str(
                    "hex string, dervation path or an env var containing a hex string in it",
                )
            }

            fn visit_str<E>(self, value: &str) -> std::result::Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if value.starts_with('$') {
                    // env
                    let var = value.strip_prefix('$').unwrap_or(value);
                    tracing::trace!("Reading {} from env", var);
                    let val = std::env::var(var).map_err(|e| {
                        serde::de::Error::custom(format!(
                            "error while loading this env {}: {}",
                            var, e,
                        ))
                    })?;
                    let maybe_pair =
                        Sr25519Pair::from_string_with_seed(&val, None);
                    match maybe_pair {
                        Ok((pair, _)) => Ok(pair),
                        Err(e) => {
                            Err(serde::de::Error::custom(format!("{:?}", e)))
                        }
                    }
                } else {
                    let maybe_pair =
                        Sr25519Pair::from_string_with_seed(value, None);
                    match maybe_pair {
                        Ok((pair, _)) => Ok(pair),
                        Err(e) => {
                            Err(serde::de::Error::custom(format!("{:?}", e)))
                        }
                    }
                }
            }
        }

        let secret = deserializer.deserialize_str(PrivateKeyVistor)?;
        Ok(Self(secret))
    }
}

/// Loads and merges every `*.toml`/`*.json` under `path`, along with the
/// `BRIDGE_*` environment, into a validated [`RelayerConfig`].
pub fn load<P: AsRef<Path>>(path: P) -> Result<RelayerConfig> {
    let mut cfg = config::Config::new();
    // A pattern that covers all toml or json files in the config directory
    // and subdirectories.
    let toml_pattern = format!("{}/**/*.toml", path.as_ref().display());
    let json_pattern = format!("{}/**/*.json", path.as_ref().display());
    tracing::trace!(
        "Loading config files from {} and {}",
        toml_pattern,
        json_pattern
    );
    let config_files = glob::glob(&toml_pattern)?
        .flatten()
        .chain(glob::glob(&json_pattern)?.flatten());
    for config_file in config_files {
        tracing::trace!("Loading config file: {}", config_file.display());
        let ext = config_file
            .extension()
            .map(|e| e.to_str().unwrap_or(""))
            .unwrap_or("");
        let format = match ext {
            "toml" => config::FileFormat::Toml,
            "json" => config::FileFormat::Json,
            _ => {
                tracing::warn!("Unknown file extension: {}", ext);
                continue;
            }
        };
        let file = config::File::from(config_file).format(format);
        if let Err(e) = cfg.merge(file) {
            tracing::warn!("Error while loading config file: {} skipping!", e);
            continue;
        }
    }

    // also merge in the environment (with a prefix of BRIDGE).
    cfg.merge(config::Environment::with_prefix("BRIDGE").separator("_"))?;
    let config: std::result::Result<
        RelayerConfig,
        serde_path_to_error::Error<config::ConfigError>,
    > = serde_path_to_error::deserialize(cfg);
    postloading_process(config?)
}

// The postloading_process exists to validate configuration and standardize
// the format of the configuration
fn postloading_process(mut config: RelayerConfig) -> Result<RelayerConfig> {
    tracing::trace!("Checking configration sanity ...");
    // 1. drain everything, and take enabled chains.
    let old_chains = config
        .chains
        .drain()
        .filter(|(_, chain)| chain.enabled)
        .collect::<HashMap<_, _>>();
    // 2. insert them again, as lowercased.
    for (k, v) in old_chains {
        config.chains.insert(k.to_lowercase(), v);
    }
    // surface relayer-set mistakes at load time instead of on the first
    // redeem
    for (chain_name, chain) in &config.chains {
        if let Err(e) = chain.identity() {
            tracing::error!("chain {} is misconfigured: {}", chain_name, e);
            return Err(e);
        }
    }
    Ok(config)
}
