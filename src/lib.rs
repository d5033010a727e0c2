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
#![deny(unsafe_code)]
#![warn(missing_docs)]

//! # Substrate Redeem Writer 🕸️
//!
//! The outbound half of a cross-chain bridge relayer. The writer consumes
//! inbound deposit messages (coin-locked events observed on a source chain)
//! and redeems the equivalent asset on a Substrate destination chain by
//! participating in a threshold multisig extrinsic protocol together with
//! `N - 1` peer relayers.
//!
//! ## Overview
//!
//! Every accepted message is driven by its own detached coordinator task:
//! it converts the wrapped amount into the destination asset (minus the
//! bridge fee), waits for its round-robin turn (derived from the finalized
//! block height and the deposit nonce), consults the shared multisig record
//! table maintained by the inbound listener, and either *initiates* a new
//! `Multisig.as_multi` call or *approves* an existing one at its timepoint.
//! The redeem is complete once the record table shows the multisig as
//! executed; the destination pallet deduplicates on
//! `(threshold, signatories, call-hash, timepoint)`, which is what makes
//! retried submissions harmless.
//!
//! The concrete chain client, the inbound event listener and any CLI or
//! metrics surface are collaborators that plug into this crate: the client
//! implements [`rpc::ChainRpc`], the listener writes into
//! [`store::SharedState`], and the embedding service owns the
//! [`context::RelayerContext`].

/// Decimal-scale conversion and fee computation per destination asset.
pub mod amount;
/// Destination-chain transfer calls and their multisig wrapping.
pub mod calls;
/// A module for the writer configuration and its loader.
pub mod config;
/// A module for managing the context of the relayer.
pub mod context;
/// A module for the crate-wide error type.
pub mod error;
/// Relayer identity: keypair, turn discipline and signing scheme.
pub mod identity;
/// A light view of the destination runtime metadata.
pub mod metadata;
/// A module used for debugging relayer lifecycle and redeem state.
pub mod probe;
/// Bounded constant-interval retry policy.
pub mod retry;
/// Round clock: finalized block height to relayer turn mapping.
pub mod round;
/// The chain RPC capability surface the writer runs against.
pub mod rpc;
/// Shared in-flight set and multisig record table.
pub mod store;
/// Extrinsic assembly, signing and submission.
pub mod submitter;
/// Read-only view that locates in-flight multisig records.
pub mod tracker;
/// Inbound message types.
pub mod types;
/// The writer façade and the per-message coordinator.
pub mod writer;

#[cfg(test)]
mod test_utils;

pub use error::{Error, Result};
pub use store::SharedState;
pub use types::{ChainId, Message};
pub use writer::Writer;
