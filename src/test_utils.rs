//! Shared helpers for the crate's tests: deterministic dev identities and a
//! scripted destination chain.

use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use codec::{Compact, Decode, Encode};
use futures::stream;
use futures::StreamExt;
use parking_lot::Mutex;
use sp_core::crypto::AccountId32;
use sp_core::{sr25519, Pair, H256};

use crate::error::{Error, Result};
use crate::metadata::ChainMetadata;
use crate::rpc::{ChainRpc, Header, RuntimeVersion, TxStatus, TxStatusStream};

pub(crate) fn dev_pair(suri: &str) -> sr25519::Pair {
    sr25519::Pair::from_string(suri, None).expect("static dev suri")
}

pub(crate) fn dev_account(suri: &str) -> AccountId32 {
    dev_pair(suri).public().into()
}

pub(crate) fn dev_account_hex(suri: &str) -> String {
    hex::encode(dev_pair(suri).public().0)
}

pub(crate) fn dev_signatories(suris: &[&str]) -> Vec<AccountId32> {
    suris.iter().map(|suri| dev_account(suri)).collect()
}

/// A metadata view with realistic pallet layout for the tests.
pub(crate) fn test_metadata() -> ChainMetadata {
    ChainMetadata::new()
        .with_pallet(
            "Balances",
            5,
            &[("transfer", 0), ("transfer_keep_alive", 3)],
        )
        .with_pallet("XAssets", 8, &[("transfer", 0)])
        .with_pallet("Multisig", 30, &[("as_multi", 1)])
}

/// A scripted destination chain.
///
/// The finalized head advances by one block on every fetch; submitted
/// extrinsics are recorded together with the height they were submitted at.
/// Failure counters make the next N calls of an RPC fail, to exercise the
/// transient-error paths.
pub(crate) struct MockChain {
    height: AtomicU64,
    account_nonce: AtomicU32,
    fail_finalized: AtomicU32,
    fail_storage: AtomicU32,
    submissions: Mutex<Vec<Vec<u8>>>,
    submission_heights: Mutex<Vec<u64>>,
}

impl MockChain {
    pub(crate) fn at_height(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            account_nonce: AtomicU32::new(0),
            fail_finalized: AtomicU32::new(0),
            fail_storage: AtomicU32::new(0),
            submissions: Mutex::new(Vec::new()),
            submission_heights: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn fail_finalized(&self, count: u32) {
        self.fail_finalized.store(count, Ordering::SeqCst);
    }

    pub(crate) fn fail_storage(&self, count: u32) {
        self.fail_storage.store(count, Ordering::SeqCst);
    }

    pub(crate) fn set_account_nonce(&self, nonce: u32) {
        self.account_nonce.store(nonce, Ordering::SeqCst);
    }

    pub(crate) fn submissions(&self) -> Vec<Vec<u8>> {
        self.submissions.lock().clone()
    }

    pub(crate) fn submission_heights(&self) -> Vec<u64> {
        self.submission_heights.lock().clone()
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        .is_ok()
}

#[async_trait::async_trait]
impl ChainRpc for MockChain {
    async fn latest_metadata(&self) -> Result<ChainMetadata> {
        Ok(test_metadata())
    }

    async fn block_hash(&self, height: u64) -> Result<H256> {
        Ok(H256::from_low_u64_be(height))
    }

    async fn latest_runtime_version(&self) -> Result<RuntimeVersion> {
        Ok(RuntimeVersion { spec_version: 9122, transaction_version: 7 })
    }

    async fn finalized_head(&self) -> Result<H256> {
        if take_failure(&self.fail_finalized) {
            return Err(Error::Rpc("finalized head unavailable".into()));
        }
        let height = self.height.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(H256::from_low_u64_be(height))
    }

    async fn header(&self, hash: H256) -> Result<Header> {
        Ok(Header { number: hash.to_low_u64_be() })
    }

    async fn storage(&self, _key: &[u8]) -> Result<Option<Vec<u8>>> {
        if take_failure(&self.fail_storage) {
            return Err(Error::Rpc("storage unavailable".into()));
        }
        // System.Account layout: the nonce, the ref counters, then balances
        let mut raw = self.account_nonce.load(Ordering::SeqCst).encode();
        raw.extend_from_slice(&[0u8; 12]);
        Ok(Some(raw))
    }

    async fn submit_and_watch(
        &self,
        extrinsic: Vec<u8>,
    ) -> Result<TxStatusStream> {
        let height = self.height.load(Ordering::SeqCst);
        self.submissions.lock().push(extrinsic);
        self.submission_heights.lock().push(height);
        let statuses = vec![
            Ok(TxStatus::Ready),
            Ok(TxStatus::InBlock(H256::from_low_u64_be(height))),
        ];
        Ok(stream::iter(statuses).boxed())
    }
}

/// The interesting parts of a signed v4 extrinsic in the
/// `MultiAddress`/`MultiSignature` wire format.
pub(crate) struct DecodedExtrinsic {
    pub signer: [u8; 32],
    pub signature: [u8; 64],
    pub nonce: u32,
    pub call: Vec<u8>,
}

pub(crate) fn decode_extrinsic(bytes: &[u8]) -> DecodedExtrinsic {
    let mut input = bytes;
    let len = Compact::<u32>::decode(&mut input).expect("length prefix").0;
    assert_eq!(input.len(), len as usize, "length prefix covers the body");
    assert_eq!(input[0], 0x84, "signed v4 extrinsic");
    assert_eq!(input[1], 0x00, "MultiAddress::Id");
    let mut signer = [0u8; 32];
    signer.copy_from_slice(&input[2..34]);
    assert_eq!(input[34], 0x01, "MultiSignature::Sr25519");
    let mut signature = [0u8; 64];
    signature.copy_from_slice(&input[35..99]);
    let mut rest = &input[99..];
    assert_eq!(rest[0], 0x00, "immortal era");
    rest = &rest[1..];
    let nonce = Compact::<u32>::decode(&mut rest).expect("nonce").0;
    let tip = Compact::<u128>::decode(&mut rest).expect("tip").0;
    assert_eq!(tip, 0, "redeems are never tipped");
    DecodedExtrinsic { signer, signature, nonce, call: rest.to_vec() }
}

/// Polls `f` until it holds or `timeout` passes.
pub(crate) async fn wait_until(
    what: &str,
    timeout: Duration,
    f: impl Fn() -> bool,
) {
    let deadline = Instant::now() + timeout;
    while !f() {
        if Instant::now() > deadline {
            panic!("timed out waiting for {}", what);
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}
