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

/// Bridge-level chain identifier, as carried on inbound deposit messages.
///
/// The writer recognizes the four well-known destinations below; any other
/// value is representable but has no asset route, so the call builder will
/// reject it.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
#[serde(transparent)]
pub struct ChainId(pub u8);

impl ChainId {
    /// The Polkadot relay chain (DOT).
    pub const POLKADOT: ChainId = ChainId(1);
    /// The Kusama relay chain (KSM).
    pub const KUSAMA: ChainId = ChainId(2);
    /// ChainX, redeeming X-BTC.
    pub const CHAINX_BTC: ChainId = ChainId(3);
    /// ChainX, redeeming the native PCX.
    pub const CHAINX_PCX: ChainId = ChainId(4);
}

impl std::fmt::Display for ChainId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            ChainId::POLKADOT => write!(f, "polkadot"),
            ChainId::KUSAMA => write!(f, "kusama"),
            ChainId::CHAINX_BTC => write!(f, "chainx-btc"),
            ChainId::CHAINX_PCX => write!(f, "chainx-pcx"),
            ChainId(other) => write!(f, "chain-{}", other),
        }
    }
}

/// A bridge-level identifier of the source asset, used to disambiguate
/// cross-chain intent.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub [u8; 32]);

impl std::fmt::Debug for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResourceId(0x{})", hex::encode(self.0))
    }
}

/// An inbound deposit message, as observed on the source chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Source-chain deposit nonce; unique per (source, destination) lane.
    pub deposit_nonce: u64,
    /// The chain the deposit was observed on.
    pub source: ChainId,
    /// The chain the redeem must happen on.
    pub destination: ChainId,
    /// Big-endian arbitrary-precision amount in the source asset's
    /// smallest unit.
    pub amount: Vec<u8>,
    /// The 32-byte destination account id receiving the redeem.
    pub recipient: Vec<u8>,
    /// Optional resource id of the source asset.
    pub resource_id: Option<ResourceId>,
}

impl Message {
    /// The byte-exact identity of this redeem while it is in flight.
    pub fn dest_key(&self) -> DestKey {
        DestKey {
            deposit_nonce: self.deposit_nonce,
            recipient: self.recipient.clone(),
            amount: self.amount.clone(),
        }
    }
}

/// Identity of an in-flight redeem.
///
/// Equality is byte-exact on all three fields; two messages with the same
/// recipient and amount but different nonces are *different* keys (and are
/// serialized against each other by the writer's repeat gate).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DestKey {
    /// Source-chain deposit nonce.
    pub deposit_nonce: u64,
    /// Raw recipient account bytes.
    pub recipient: Vec<u8>,
    /// Raw big-endian amount bytes.
    pub amount: Vec<u8>,
}

impl DestKey {
    /// Whether `other` redeems the same amount to the same recipient under
    /// a different nonce. Such pairs would produce identical multisig call
    /// hashes on the destination and must not run concurrently.
    pub fn conflicts_with(&self, other: &DestKey) -> bool {
        self.deposit_nonce != other.deposit_nonce
            && self.recipient == other.recipient
            && self.amount == other.amount
    }
}
