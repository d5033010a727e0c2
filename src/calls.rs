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
use codec::{Compact, Decode, Encode, Output};
use num_bigint::BigUint;
use sp_core::crypto::AccountId32;
use sp_core::hashing::blake2_256;
use sp_core::H256;
use sp_runtime::MultiAddress;

use crate::error::{Error, Result};
use crate::identity::RelayerIdentity;
use crate::metadata::ChainMetadata;
use crate::types::{ChainId, ResourceId};

/// The modern account address wire format.
pub type Address = MultiAddress<AccountId32, u32>;

/// Role byte expected by legacy ChainX transfer calls.
pub const X_ROLE: u8 = 255;
/// The ChainX asset id of X-BTC.
pub const X_BTC_ASSET_ID: u32 = 1;

const BALANCES_TRANSFER_KEEP_ALIVE: (&str, &str) =
    ("Balances", "transfer_keep_alive");
const BALANCES_TRANSFER: (&str, &str) = ("Balances", "transfer");
const XASSETS_TRANSFER: (&str, &str) = ("XAssets", "transfer");
const MULTISIG_AS_MULTI: (&str, &str) = ("Multisig", "as_multi");

/// A runtime call, resolved to its dispatch indices with pre-encoded
/// arguments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    /// The pallet's dispatch index.
    pub pallet_index: u8,
    /// The call's index within the pallet.
    pub call_index: u8,
    /// SCALE-encoded call arguments.
    pub args: Vec<u8>,
}

impl Encode for Call {
    fn size_hint(&self) -> usize {
        2 + self.args.len()
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        dest.push_byte(self.pallet_index);
        dest.push_byte(self.call_index);
        dest.write(&self.args);
    }
}

impl Call {
    /// The blake2-256 hash of the encoded call; what the multisig pallet
    /// deduplicates approvals on.
    pub fn hash(&self) -> H256 {
        blake2_256(&self.encode()).into()
    }
}

/// Identifies a multisig operation by its initiating extrinsic.
///
/// Required by every approval after the first; absent when initiating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
pub struct Timepoint {
    /// Block number of the `new_multisig` extrinsic.
    pub height: u32,
    /// Index of that extrinsic within its block.
    pub index: u32,
}

/// The pre-`MultiAddress` account address, still used by legacy ChainX
/// runtimes. When pallet indices are suppressed (the default for calls
/// resolved by name) the account encodes raw; otherwise with the legacy
/// `0xff` account-id tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LegacyAddress {
    account: AccountId32,
    tagged: bool,
}

impl LegacyAddress {
    /// Wraps an account for legacy-address encoding.
    pub fn new(account: AccountId32, no_pallet_indices: bool) -> Self {
        Self { account, tagged: !no_pallet_indices }
    }
}

impl Encode for LegacyAddress {
    fn size_hint(&self) -> usize {
        33
    }

    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        if self.tagged {
            dest.push_byte(0xff);
        }
        dest.write(self.account.as_ref());
    }
}

/// Builds destination-chain transfer calls and wraps them in
/// `Multisig.as_multi`.
///
/// The builder is deterministic given metadata: rebuilding with identical
/// inputs yields an identical encoding (and thus call hash), which is what
/// lets peer relayers converge on one multisig operation.
#[derive(Debug, Clone)]
pub struct CallBuilder<'a> {
    meta: &'a ChainMetadata,
    threshold: u16,
    other_signatories: &'a [AccountId32],
    no_pallet_indices: bool,
    extend_call: bool,
}

impl<'a> CallBuilder<'a> {
    /// A builder over the given metadata view for this relayer set.
    pub fn new(
        meta: &'a ChainMetadata,
        identity: &'a RelayerIdentity,
        extend_call: bool,
    ) -> Self {
        Self {
            meta,
            threshold: identity.threshold,
            other_signatories: &identity.other_signatories,
            // calls here are resolved by pallet name, which requires the
            // suppressed-index address format
            no_pallet_indices: true,
            extend_call,
        }
    }

    /// Builds the inner transfer call for the destination chain.
    pub fn build_transfer(
        &self,
        dest: ChainId,
        recipient: &AccountId32,
        amount: &BigUint,
        resource_id: Option<&ResourceId>,
    ) -> Result<Call> {
        let value =
            u128::try_from(amount).map_err(|_| Error::AmountOverflow)?;
        let mut args = Vec::new();
        let (pallet_index, call_index) = match dest {
            ChainId::POLKADOT | ChainId::KUSAMA => {
                let (pallet, call) = BALANCES_TRANSFER_KEEP_ALIVE;
                Address::from(recipient.clone()).encode_to(&mut args);
                Compact(value).encode_to(&mut args);
                self.meta.call_index(pallet, call)?
            }
            ChainId::CHAINX_BTC => {
                let (pallet, call) = XASSETS_TRANSFER;
                X_ROLE.encode_to(&mut args);
                LegacyAddress::new(recipient.clone(), self.no_pallet_indices)
                    .encode_to(&mut args);
                Compact(X_BTC_ASSET_ID).encode_to(&mut args);
                Compact(value).encode_to(&mut args);
                self.meta.call_index(pallet, call)?
            }
            ChainId::CHAINX_PCX => {
                // legacy shape inherited from the XAssets branch; isolated
                // here so a metadata-validated fix touches one arm
                let (pallet, call) = BALANCES_TRANSFER;
                X_ROLE.encode_to(&mut args);
                LegacyAddress::new(recipient.clone(), self.no_pallet_indices)
                    .encode_to(&mut args);
                Compact(value).encode_to(&mut args);
                self.meta.call_index(pallet, call)?
            }
            other => return Err(Error::UnsupportedDestination(other)),
        };
        if self.extend_call {
            if let Some(resource_id) = resource_id {
                args.extend_from_slice(&resource_id.0);
            }
        }
        Ok(Call { pallet_index, call_index, args })
    }

    /// Wraps `inner` in `Multisig.as_multi`.
    ///
    /// `timepoint` is `None` when initiating a new multisig operation and
    /// the origin timepoint when approving an existing one; `max_weight` is
    /// zero when initiating (no dispatch can happen yet) and the configured
    /// weight when the approval may complete the threshold.
    pub fn build_multisig(
        &self,
        inner: &Call,
        timepoint: Option<Timepoint>,
        max_weight: u64,
    ) -> Result<Call> {
        let (pallet, call) = MULTISIG_AS_MULTI;
        let (pallet_index, call_index) = self.meta.call_index(pallet, call)?;
        let mut args = Vec::new();
        self.threshold.encode_to(&mut args);
        self.other_signatories.encode_to(&mut args);
        timepoint.encode_to(&mut args);
        inner.encode().encode_to(&mut args);
        false.encode_to(&mut args); // store_call
        max_weight.encode_to(&mut args);
        Ok(Call { pallet_index, call_index, args })
    }
}
