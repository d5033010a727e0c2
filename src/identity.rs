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
use serde::{Deserialize, Serialize};
use sp_core::crypto::AccountId32;
use sp_core::sr25519;
use sp_core::Pair;

use crate::error::{Error, Result};
use crate::round::Round;

/// How extrinsics are addressed and signed on the destination chain.
///
/// Polkadot and Kusama take the modern `MultiAddress`/`MultiSignature` wire
/// format; legacy ChainX runtimes still expect a plain account-id address
/// with a bare sr25519 signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SigningScheme {
    /// `MultiAddress::Id` + `MultiSignature::Sr25519`.
    MultiAddress,
    /// Legacy `0xff`-tagged account-id address + raw 64-byte sr25519
    /// signature.
    PlainAddress,
}

/// This relayer's identity within the multisig relayer set.
#[derive(Clone)]
pub struct RelayerIdentity {
    pair: sr25519::Pair,
    /// This relayer's index in `[0, total)`.
    pub index: u64,
    /// Total number of relayers in the set.
    pub total: u64,
    /// Approvals required to dispatch the inner call.
    pub threshold: u16,
    /// All peers except self, sorted the way the multisig pallet expects.
    pub other_signatories: Vec<AccountId32>,
    /// Extrinsic wire format for the destination chain.
    pub signing: SigningScheme,
}

impl std::fmt::Debug for RelayerIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayerIdentity")
            .field("account", &self.account())
            .field("index", &self.index)
            .field("total", &self.total)
            .field("threshold", &self.threshold)
            .finish()
    }
}

impl RelayerIdentity {
    /// Builds and validates a relayer identity.
    ///
    /// `other_signatories` are sorted and deduplicated here; the multisig
    /// pallet rejects unsorted signatory lists.
    pub fn new(
        pair: sr25519::Pair,
        index: u64,
        total: u64,
        threshold: u16,
        mut other_signatories: Vec<AccountId32>,
        signing: SigningScheme,
    ) -> Result<Self> {
        if total == 0 {
            return Err(Error::InvalidRelayerSet("total relayers must be > 0"));
        }
        if index >= total {
            return Err(Error::InvalidRelayerSet(
                "relayer index out of range",
            ));
        }
        if threshold == 0 || u64::from(threshold) > total {
            return Err(Error::InvalidRelayerSet(
                "threshold must be in 1..=total",
            ));
        }
        other_signatories.sort();
        other_signatories.dedup();
        if other_signatories.len() as u64 + 1 != total {
            return Err(Error::InvalidRelayerSet(
                "expected total - 1 distinct other signatories",
            ));
        }
        let own: AccountId32 = pair.public().into();
        if other_signatories.contains(&own) {
            return Err(Error::InvalidRelayerSet(
                "own account listed among other signatories",
            ));
        }
        Ok(Self {
            pair,
            index,
            total,
            threshold,
            other_signatories,
            signing,
        })
    }

    /// This relayer's on-chain account.
    pub fn account(&self) -> AccountId32 {
        self.pair.public().into()
    }

    /// Hex form of the public key, as used by the multisig record table.
    pub fn account_hex(&self) -> String {
        hex::encode(self.pair.public().0)
    }

    /// Signs an opaque payload with the relayer keypair.
    pub fn sign(&self, payload: &[u8]) -> sr25519::Signature {
        self.pair.sign(payload)
    }

    /// The round-robin turn rule: a round belongs to this relayer iff
    /// `block_round == (index + nonce) % total`. Offsetting by the deposit
    /// nonce scatters concurrent nonces across relayers.
    pub fn is_my_turn(&self, deposit_nonce: u64, round: &Round) -> bool {
        round.block_round
            == (self.index.wrapping_add(deposit_nonce)) % self.total
    }
}
