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
use std::sync::Arc;
use std::time::Duration;

use codec::{Compact, Decode, Encode, Output};
use futures::{StreamExt, TryFutureExt};
use sp_core::crypto::AccountId32;
use sp_core::hashing::{blake2_128, blake2_256, twox_128};
use sp_core::{sr25519, H256};
use sp_runtime::MultiSignature;

use crate::calls::{Address, Call, LegacyAddress};
use crate::error::{Error, Result};
use crate::identity::{RelayerIdentity, SigningScheme};
use crate::probe;
use crate::retry::ConstantWithMaxRetryCount;
use crate::rpc::{ChainRpc, TxStatus};

/// Wait between submission attempts.
const RETRY_INTERVAL: Duration = Duration::from_millis(500);

/// Transaction mortality. Redeems are paced by the round clock, not by tx
/// expiry, so everything is submitted immortal against the genesis hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Era {
    Immortal,
}

impl Encode for Era {
    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        match self {
            Era::Immortal => dest.push_byte(0),
        }
    }
}

/// The signed extensions carried inside the extrinsic.
struct SignedExtra {
    era: Era,
    nonce: u32,
    tip: u128,
}

impl Encode for SignedExtra {
    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.era.encode_to(dest);
        Compact(self.nonce).encode_to(dest);
        Compact(self.tip).encode_to(dest);
    }
}

/// The additional data that is signed but not transmitted.
struct AdditionalSigned {
    spec_version: u32,
    transaction_version: u32,
    genesis_hash: H256,
    block_hash: H256,
}

impl Encode for AdditionalSigned {
    fn encode_to<T: Output + ?Sized>(&self, dest: &mut T) {
        self.spec_version.encode_to(dest);
        self.transaction_version.encode_to(dest);
        self.genesis_hash.encode_to(dest);
        self.block_hash.encode_to(dest);
    }
}

/// The nonce sits first in the `System.Account` record; the balance data
/// behind it is not needed here.
#[derive(Decode)]
struct AccountInfoPrefix {
    nonce: u32,
}

/// The storage key of this account's `System.Account` entry.
pub(crate) fn account_storage_key(account: &AccountId32) -> Vec<u8> {
    let mut key = Vec::with_capacity(16 + 16 + 16 + 32);
    key.extend_from_slice(&twox_128(b"System"));
    key.extend_from_slice(&twox_128(b"Account"));
    key.extend_from_slice(&blake2_128(account.as_ref()));
    key.extend_from_slice(account.as_ref());
    key
}

/// Signs and submits runtime calls, re-fetching all chain state on every
/// attempt.
///
/// Submitting the same multisig call twice from the same relayer produces
/// the same call hash and is rejected by the pallet as a duplicate approval,
/// so a retried submission is harmless; true completion is observed through
/// the multisig tracker, never through the submission status.
#[derive(Debug)]
pub struct Submitter<R> {
    rpc: Arc<R>,
    identity: Arc<RelayerIdentity>,
    retry_limit: u32,
}

impl<R: ChainRpc> Submitter<R> {
    /// A submitter with a bounded per-call attempt budget.
    pub fn new(
        rpc: Arc<R>,
        identity: Arc<RelayerIdentity>,
        retry_limit: u32,
    ) -> Self {
        Self { rpc, identity, retry_limit }
    }

    /// Submits `call`, retrying transport failures up to the configured
    /// attempt budget.
    #[tracing::instrument(skip_all, fields(call_hash = %call.hash()))]
    pub async fn submit(&self, call: &Call) -> Result<()> {
        let backoff = ConstantWithMaxRetryCount::new(
            RETRY_INTERVAL,
            self.retry_limit.saturating_sub(1) as usize,
        );
        let attempt =
            || self.attempt(call).map_err(backoff::Error::transient);
        match backoff::future::retry(backoff, attempt).await {
            Ok(()) => Ok(()),
            Err(e) => {
                tracing::error!(error = %e, "submit tx failed, check it");
                Err(Error::RetryExhausted)
            }
        }
    }

    async fn attempt(&self, call: &Call) -> Result<()> {
        // fresh state every attempt: metadata, genesis, runtime version and
        // the on-chain account nonce
        let meta = self.rpc.latest_metadata().await?;
        if !meta.has_pallet_index(call.pallet_index) {
            return Err(Error::Generic(
                "call pallet is gone from the runtime, rebuild the call",
            ));
        }
        let genesis_hash = self.rpc.block_hash(0).await?;
        let runtime = self.rpc.latest_runtime_version().await?;
        let account = self.identity.account();
        let raw = self
            .rpc
            .storage(&account_storage_key(&account))
            .await?
            .ok_or(Error::Generic("relayer account not found on chain"))?;
        let nonce = AccountInfoPrefix::decode(&mut &raw[..])?.nonce;

        let extra = SignedExtra { era: Era::Immortal, nonce, tip: 0 };
        let additional = AdditionalSigned {
            spec_version: runtime.spec_version,
            transaction_version: runtime.transaction_version,
            genesis_hash,
            block_hash: genesis_hash,
        };

        let signature = {
            let mut payload = Vec::new();
            call.encode_to(&mut payload);
            extra.encode_to(&mut payload);
            additional.encode_to(&mut payload);
            if payload.len() > 256 {
                self.identity.sign(&blake2_256(&payload))
            } else {
                self.identity.sign(&payload)
            }
        };

        let extrinsic = self.seal(call, &extra, signature, account);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::TxSubmit,
            nonce,
            call_hash = %call.hash(),
            submitting = true,
        );

        let mut progress = self.rpc.submit_and_watch(extrinsic).await?;
        while let Some(event) = progress.next().await {
            let status = match event {
                Ok(status) => status,
                Err(err) => {
                    // in-flight errors are advisory, the tracker is the truth
                    tracing::trace!(error = %err, "extrinsic subscription error");
                    return Ok(());
                }
            };
            match status {
                TxStatus::Ready | TxStatus::Broadcast => {
                    tracing::debug!(status = ?status, "extrinsic pending");
                }
                TxStatus::InBlock(block) => {
                    tracing::info!(%block, "extrinsic included in block");
                    return Ok(());
                }
                TxStatus::Finalized(block) => {
                    tracing::info!(%block, "extrinsic finalized");
                    return Ok(());
                }
                TxStatus::Retracted(block) => {
                    tracing::warn!(%block, "extrinsic retracted");
                    return Ok(());
                }
                TxStatus::FinalityTimeout(block) => {
                    tracing::warn!(%block, "extrinsic finality timeout");
                    return Ok(());
                }
                TxStatus::Dropped => {
                    tracing::warn!("extrinsic dropped from the pool");
                    return Ok(());
                }
                TxStatus::Invalid => {
                    tracing::warn!("extrinsic invalid");
                    return Ok(());
                }
            }
        }
        Ok(())
    }

    /// Assembles the signed v4 extrinsic in the wire format of the
    /// destination chain.
    fn seal(
        &self,
        call: &Call,
        extra: &SignedExtra,
        signature: sr25519::Signature,
        account: AccountId32,
    ) -> Vec<u8> {
        let mut inner = Vec::new();
        // "is signed" + transaction protocol version (4)
        (0b1000_0000 + 4u8).encode_to(&mut inner);
        match self.identity.signing {
            SigningScheme::MultiAddress => {
                Address::from(account).encode_to(&mut inner);
                MultiSignature::from(signature).encode_to(&mut inner);
            }
            SigningScheme::PlainAddress => {
                // the signer field of a legacy extrinsic always carries the
                // 0xff account-id tag; only call arguments suppress it
                LegacyAddress::new(account, false).encode_to(&mut inner);
                signature.encode_to(&mut inner);
            }
        }
        extra.encode_to(&mut inner);
        call.encode_to(&mut inner);

        let len = Compact(
            u32::try_from(inner.len())
                .expect("extrinsic size expected to be <4GB"),
        );
        let mut extrinsic = Vec::new();
        len.encode_to(&mut extrinsic);
        extrinsic.extend(inner);
        extrinsic
    }
}
