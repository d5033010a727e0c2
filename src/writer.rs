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
use std::time::{Duration, Instant};

use num_bigint::BigUint;
use sp_core::crypto::AccountId32;
use tokio::sync::mpsc;

use crate::amount::AmountCodec;
use crate::calls::CallBuilder;
use crate::context::RelayerContext;
use crate::error::{Error, Result};
use crate::identity::RelayerIdentity;
use crate::probe;
use crate::round::RoundClock;
use crate::rpc::ChainRpc;
use crate::store::{EventId, SharedState};
use crate::submitter::Submitter;
use crate::tracker::{MultiSigTracker, TrackerCheck};
use crate::types::{ChainId, DestKey, Message};

/// Result of one redeem attempt (one coordinator round).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxOutcome {
    /// Submitted or skipped; the multisig is not known to be dispatched yet.
    NotExecuted,
    /// This relayer already approved and must wait for the peers.
    YesVoted,
    /// The redeem cannot cover the bridge fee; not retryable.
    AmountError,
    /// The multisig was dispatched at the given origin.
    Executed(EventId),
}

/// Accepts inbound deposit messages and drives each one to a redeem on the
/// destination chain through a detached coordinator task.
pub struct Writer<R> {
    chain: ChainId,
    rpc: Arc<R>,
    identity: Arc<RelayerIdentity>,
    state: SharedState,
    codec: AmountCodec,
    round_interval: Duration,
    retry_limit: u32,
    max_weight: u64,
    extend_call: bool,
}

impl<R> std::fmt::Debug for Writer<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Writer")
            .field("chain", &self.chain)
            .field("identity", &self.identity)
            .field("codec", &self.codec)
            .field("round_interval", &self.round_interval)
            .field("retry_limit", &self.retry_limit)
            .field("max_weight", &self.max_weight)
            .field("extend_call", &self.extend_call)
            .finish()
    }
}

impl<R: ChainRpc> Writer<R> {
    /// A writer for the chain named `chain_name` in the context's
    /// configuration.
    ///
    /// Configuration the writer can never make progress with (a broken
    /// relayer set) is system-fatal and is routed to `sys_err` in addition
    /// to failing construction.
    pub fn new(
        ctx: &RelayerContext,
        chain_name: &str,
        rpc: Arc<R>,
        state: SharedState,
        sys_err: mpsc::UnboundedSender<Error>,
    ) -> Result<Self> {
        let config = ctx
            .config
            .chains
            .get(chain_name)
            .ok_or(Error::Generic("this chain not configured"))?;
        let identity = match config.identity() {
            Ok(identity) => identity,
            Err(e) => {
                let _ = sys_err.send(e);
                return Err(Error::InvalidRelayerSet(
                    "writer cannot establish its multisig identity",
                ));
            }
        };
        Ok(Self {
            chain: config.chain_id,
            rpc,
            identity: Arc::new(identity),
            state,
            codec: AmountCodec::new(config.fee),
            round_interval: config.round_interval(),
            retry_limit: config.block_retry_limit,
            max_weight: config.max_weight,
            extend_call: config.extend_call,
        })
    }

    /// Resolves an inbound message: returns `false` if the message is not
    /// for this chain, otherwise spawns a coordinator for it and returns
    /// `true`.
    ///
    /// Blocks while another in-flight redeem targets the same recipient and
    /// amount under a different nonce; such pairs alias each other's
    /// multisig call hash and must run one after the other.
    #[tracing::instrument(
        skip_all,
        fields(
            nonce = message.deposit_nonce,
            source = %message.source,
            destination = %message.destination,
        ),
    )]
    pub async fn resolve(&self, message: Message) -> bool {
        if message.destination != self.chain {
            tracing::debug!(chain = %self.chain, "message is not for this chain");
            return false;
        }
        let key = message.dest_key();
        loop {
            let removed = self.state.removal_signal();
            let reopened = removed.notified();
            if !self.state.has_conflicting(&key) {
                break;
            }
            tracing::info!(
                waiting = ?self.round_interval,
                "repeated redeem in flight, waiting",
            );
            tokio::select! {
                _ = reopened => {}
                _ = tokio::time::sleep(self.round_interval) => {}
            }
        }
        if !self.state.begin_redeem(key.clone()) {
            tracing::debug!("redeem already in flight, coalescing");
            return true;
        }
        tracing::info!("start a redeem tx");
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Lifecycle,
            nonce = message.deposit_nonce,
            accepted = true,
        );
        let coordinator = MessageCoordinator {
            key,
            message,
            rpc: self.rpc.clone(),
            identity: self.identity.clone(),
            state: self.state.clone(),
            codec: self.codec.clone(),
            round_interval: self.round_interval,
            retry_limit: self.retry_limit,
            max_weight: self.max_weight,
            extend_call: self.extend_call,
        };
        tokio::spawn(coordinator.run());
        true
    }
}

/// Drives one accepted message to its terminal state: per-round redeem
/// attempts, repeat pacing, completion detection and state cleanup.
struct MessageCoordinator<R> {
    key: DestKey,
    message: Message,
    rpc: Arc<R>,
    identity: Arc<RelayerIdentity>,
    state: SharedState,
    codec: AmountCodec,
    round_interval: Duration,
    retry_limit: u32,
    max_weight: u64,
    extend_call: bool,
}

impl<R: ChainRpc> MessageCoordinator<R> {
    #[tracing::instrument(
        skip_all,
        fields(
            nonce = self.message.deposit_nonce,
            relayer = self.identity.index,
        ),
    )]
    async fn run(self) {
        let started = Instant::now();
        let clock =
            RoundClock::new(self.rpc.clone(), self.identity.total);
        let tracker = MultiSigTracker::new(
            self.state.clone(),
            &self.identity,
            self.max_weight,
        );
        let submitter = Submitter::new(
            self.rpc.clone(),
            self.identity.clone(),
            self.retry_limit,
        );

        let mut retries = self.retry_limit;
        let executed = loop {
            retries = retries.saturating_sub(1);
            if retries == 0 {
                tracing::error!("redeem tx tried too many times, giving up");
                break None;
            }
            if retries < self.retry_limit / 2 {
                tracing::warn!(retries, "redeem is still unfinished, may be a problem");
            }
            match self.redeem_round(&clock, &tracker, &submitter).await {
                Ok(TxOutcome::Executed(origin)) => {
                    tracing::info!(
                        origin_block = origin.block,
                        "multisig extrinsic executed",
                    );
                    break Some(origin);
                }
                Ok(TxOutcome::AmountError) => {
                    tracing::error!("multisig extrinsic error, dropping the redeem");
                    break None;
                }
                Ok(TxOutcome::YesVoted) => {
                    // wait roughly half a full rotation for the peers
                    tokio::time::sleep(
                        self.round_interval * self.identity.total as u32 / 2,
                    )
                    .await;
                }
                Ok(TxOutcome::NotExecuted) => {
                    // one submission per round
                    tokio::time::sleep(self.round_interval).await;
                }
                Err(e @ Error::UnsupportedDestination(_)) => {
                    tracing::error!(error = %e, "no call for this destination, dropping the redeem");
                    break None;
                }
                Err(e) => {
                    tracing::error!(error = %e, "redeem round failed");
                    tokio::time::sleep(self.round_interval).await;
                }
            }
        };
        // exactly one removal per accepted message; the record goes with it
        // only when the multisig actually executed
        self.state.finish_redeem(&self.key, executed);
        tracing::event!(
            target: probe::TARGET,
            tracing::Level::DEBUG,
            kind = %probe::Kind::Redeem,
            nonce = self.message.deposit_nonce,
            executed = executed.is_some(),
            finished = true,
        );
        tracing::info!(elapsed = ?started.elapsed(), "relayer finished the redeem tx");
    }

    /// One redeem attempt: rebuild the call against fresh metadata, wait
    /// for this relayer's round, then initiate or approve the multisig.
    async fn redeem_round(
        &self,
        clock: &RoundClock<R>,
        tracker: &MultiSigTracker,
        submitter: &Submitter<R>,
    ) -> Result<TxOutcome> {
        // cheap guard against runtime upgrades between rounds
        let meta = self.rpc.latest_metadata().await?;

        let wrapped = BigUint::from_bytes_be(&self.message.amount);
        let redeem = match self.codec.convert(self.message.destination, &wrapped)
        {
            Ok(redeem) => redeem,
            Err(Error::AmountTooLow) => {
                tracing::error!(amount = %wrapped, "redeem of an amount below the fee");
                return Ok(TxOutcome::AmountError);
            }
            Err(e) => return Err(e),
        };
        let (wrapped_token, token) =
            AmountCodec::asset_pair(self.message.destination);
        tracing::info!(
            from = wrapped_token,
            to = token,
            amount = %redeem.received,
            fee = %redeem.fee,
            actual = %redeem.actual,
            "converted the wrapped deposit",
        );

        let recipient = AccountId32::try_from(&self.message.recipient[..])
            .map_err(|_| {
                Error::Generic("recipient must be a 32-byte account id")
            })?;
        let builder = CallBuilder::new(&meta, &self.identity, self.extend_call);
        let inner = builder.build_transfer(
            self.message.destination,
            &recipient,
            &redeem.actual,
            self.message.resource_id.as_ref(),
        )?;

        // wait for our slot in the block-round rotation
        loop {
            let round = clock.current_round().await;
            if self
                .identity
                .is_my_turn(self.message.deposit_nonce, &round)
            {
                tracing::debug!(
                    block = round.block_height,
                    "round belongs to this relayer",
                );
                break;
            }
            tokio::time::sleep(self.round_interval).await;
        }

        let dest_address = hex::encode(&self.message.recipient);
        let (timepoint, max_weight) =
            match tracker.check(&dest_address, &redeem.actual.to_string()) {
                TrackerCheck::Executed(origin) => {
                    return Ok(TxOutcome::Executed(origin))
                }
                TrackerCheck::AlreadyVoted => {
                    tracing::info!("relayer has voted, wait for the others");
                    return Ok(TxOutcome::YesVoted);
                }
                TrackerCheck::Approve { timepoint, max_weight } => {
                    (Some(timepoint), max_weight)
                }
                TrackerCheck::Initiate => (None, 0),
            };
        match timepoint {
            None => tracing::info!("try to make a new multisig tx"),
            Some(tp) => tracing::info!(
                block = tp.height,
                index = tp.index,
                "try to approve the multisig tx",
            ),
        }
        let call = builder.build_multisig(&inner, timepoint, max_weight)?;
        if let Err(e) = submitter.submit(&call).await {
            tracing::error!(error = %e, "multisig submission failed");
        }
        Ok(TxOutcome::NotExecuted)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::calls::Timepoint;
    use crate::config::{FeeConfig, RelayerConfig, WriterConfig};
    use crate::identity::SigningScheme;
    use crate::store::MultiSigRecord;
    use crate::test_utils::{
        decode_extrinsic, dev_account_hex, dev_pair, dev_signatories,
        test_metadata, wait_until, MockChain,
    };

    const MAX_WEIGHT: u64 = 22_698_000_000;
    const INTERVAL: Duration = Duration::from_millis(5);
    const TIMEOUT: Duration = Duration::from_secs(10);

    fn fees() -> FeeConfig {
        FeeConfig { fee_rate: 1_000, fixed_dot_fee: 1_000, fixed_ksm_fee: 3_000 }
    }

    fn identity(index: u64, total: u64) -> RelayerIdentity {
        let peers: Vec<&str> =
            ["//Bob", "//Charlie", "//Dave"][..(total - 1) as usize].to_vec();
        RelayerIdentity::new(
            dev_pair("//Alice"),
            index,
            total,
            2.min(total as u16),
            dev_signatories(&peers),
            SigningScheme::MultiAddress,
        )
        .unwrap()
    }

    fn writer(
        chain: &Arc<MockChain>,
        state: &SharedState,
        index: u64,
        total: u64,
        retry_limit: u32,
    ) -> Writer<MockChain> {
        Writer {
            chain: ChainId::POLKADOT,
            rpc: chain.clone(),
            identity: Arc::new(identity(index, total)),
            state: state.clone(),
            codec: AmountCodec::new(fees()),
            round_interval: INTERVAL,
            retry_limit,
            max_weight: MAX_WEIGHT,
            extend_call: false,
        }
    }

    /// 2000 DOT worth of BDOT; converts to 998 DOT after the fee.
    fn dot_message(nonce: u64) -> Message {
        Message {
            deposit_nonce: nonce,
            source: ChainId(22),
            destination: ChainId::POLKADOT,
            amount: 200_000_000_000u64.to_be_bytes().to_vec(),
            recipient: vec![0xaa; 32],
            resource_id: None,
        }
    }

    fn executed_record(block: u64) -> MultiSigRecord {
        MultiSigRecord {
            threshold: 2,
            signatories: vec![],
            origin: EventId { block, index: 2 },
            dest_address: "aa".repeat(32),
            dest_amount: "998".into(),
            executed: true,
            approvals: vec![],
        }
    }

    fn chain_config(relayer_index: u64) -> WriterConfig {
        WriterConfig {
            enabled: true,
            chain_id: ChainId::POLKADOT,
            ws_endpoint: "wss://rpc.polkadot.io".parse().unwrap(),
            suri: dev_pair("//Alice").into(),
            relayer_index,
            total_relayers: 3,
            threshold: 2,
            other_signatories: vec![
                dev_account_hex("//Bob"),
                dev_account_hex("//Charlie"),
            ],
            max_weight: MAX_WEIGHT,
            block_retry_limit: 10,
            round_interval: 6_000,
            fee: fees(),
            extend_call: false,
            signing: None,
        }
    }

    fn context_with(config: WriterConfig) -> RelayerContext {
        let mut chains = HashMap::new();
        chains.insert("polkadot".to_string(), config);
        RelayerContext::new(RelayerConfig { chains })
    }

    #[tokio::test]
    async fn writer_builds_from_the_context() {
        let ctx = context_with(chain_config(0));
        let (sys_err, _sys_err_rx) = mpsc::unbounded_channel();
        let chain = Arc::new(MockChain::at_height(0));
        let writer =
            Writer::new(&ctx, "polkadot", chain, SharedState::new(), sys_err)
                .unwrap();
        assert_eq!(writer.chain, ChainId::POLKADOT);
        assert_eq!(writer.identity.total, 3);
    }

    #[tokio::test]
    async fn broken_relayer_set_is_system_fatal() {
        // index out of range: this writer can never own a round
        let ctx = context_with(chain_config(5));
        let (sys_err, mut sys_err_rx) = mpsc::unbounded_channel();
        let chain = Arc::new(MockChain::at_height(0));
        let err =
            Writer::new(&ctx, "polkadot", chain, SharedState::new(), sys_err)
                .unwrap_err();
        assert!(matches!(err, Error::InvalidRelayerSet(_)));
        assert!(matches!(
            sys_err_rx.recv().await,
            Some(Error::InvalidRelayerSet(_))
        ));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn foreign_messages_are_not_ours() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        let writer = writer(&chain, &state, 0, 3, 10);
        let mut message = dot_message(1);
        message.destination = ChainId::KUSAMA;
        assert!(!writer.resolve(message).await);
        assert_eq!(state.in_flight_len(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    #[tracing_test::traced_test]
    async fn initiator_submits_a_fresh_multisig() -> anyhow::Result<()> {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        let writer = writer(&chain, &state, 0, 3, 64);
        // (0 + 6) % 3 == 0: rounds at heights divisible by 3 are ours
        assert!(writer.resolve(dot_message(6)).await);

        let submissions = chain.clone();
        wait_until("first submission", TIMEOUT, move || {
            !submissions.submissions().is_empty()
        })
        .await;

        let decoded = decode_extrinsic(&chain.submissions()[0]);
        let meta = test_metadata();
        let id = identity(0, 3);
        let builder = CallBuilder::new(&meta, &id, false);
        let inner = builder.build_transfer(
            ChainId::POLKADOT,
            &AccountId32::from([0xaa; 32]),
            &BigUint::from(998u32),
            None,
        )?;
        let expected = builder.build_multisig(&inner, None, 0)?;
        assert_eq!(decoded.call, codec::Encode::encode(&expected));

        // let the listener observe the execution so the coordinator stops
        state.insert_multisig(executed_record(40));
        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
        // the completed redeem took its record with it
        state.scan_multisig_txs(|txs| assert!(txs.is_empty()));
        Ok(())
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn approver_submits_at_the_origin_timepoint() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        // a peer initiated at block 40; its approval round lists us
        let mut record = executed_record(40);
        record.executed = false;
        record.approvals =
            vec![vec![crate::test_utils::dev_account_hex("//Alice")]];
        state.insert_multisig(record);

        let writer = writer(&chain, &state, 0, 3, 64);
        assert!(writer.resolve(dot_message(6)).await);

        let submissions = chain.clone();
        wait_until("approval submission", TIMEOUT, move || {
            !submissions.submissions().is_empty()
        })
        .await;

        let decoded = decode_extrinsic(&chain.submissions()[0]);
        let meta = test_metadata();
        let id = identity(0, 3);
        let builder = CallBuilder::new(&meta, &id, false);
        let inner = builder
            .build_transfer(
                ChainId::POLKADOT,
                &AccountId32::from([0xaa; 32]),
                &BigUint::from(998u32),
                None,
            )
            .unwrap();
        let expected = builder
            .build_multisig(
                &inner,
                Some(Timepoint { height: 40, index: 2 }),
                MAX_WEIGHT,
            )
            .unwrap();
        assert_eq!(decoded.call, codec::Encode::encode(&expected));

        state.mark_executed(EventId { block: 40, index: 2 });
        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn voted_relayer_waits_without_submitting() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        // we initiated earlier: the approval round lists only the others
        let mut record = executed_record(40);
        record.executed = false;
        record.approvals = vec![vec![
            crate::test_utils::dev_account_hex("//Bob"),
            crate::test_utils::dev_account_hex("//Charlie"),
        ]];
        state.insert_multisig(record);

        let writer = writer(&chain, &state, 0, 3, 64);
        assert!(writer.resolve(dot_message(6)).await);

        tokio::time::sleep(INTERVAL * 20).await;
        assert!(chain.submissions().is_empty(), "a voted relayer must wait");

        state.mark_executed(EventId { block: 40, index: 2 });
        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
        assert!(chain.submissions().is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn executed_record_short_circuits_without_submitting() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        state.insert_multisig(executed_record(40));

        let writer = writer(&chain, &state, 0, 3, 64);
        assert!(writer.resolve(dot_message(6)).await);

        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
        assert!(chain.submissions().is_empty());
        state.scan_multisig_txs(|txs| assert!(txs.is_empty()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn underfunded_redeem_cleans_up_without_touching_records() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        // an unrelated record that must survive the failed redeem
        let mut unrelated = executed_record(77);
        unrelated.dest_address = "bb".repeat(32);
        state.insert_multisig(unrelated);

        let writer = Writer {
            chain: ChainId::KUSAMA,
            ..writer(&chain, &state, 0, 3, 64)
        };
        // 2999 KSM-units received < 3000 fixed fee
        let message = Message {
            deposit_nonce: 9,
            source: ChainId(22),
            destination: ChainId::KUSAMA,
            amount: 2_999_000_000u64.to_be_bytes().to_vec(),
            recipient: vec![0xaa; 32],
            resource_id: None,
        };
        assert!(writer.resolve(message).await);

        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
        assert!(chain.submissions().is_empty());
        state.scan_multisig_txs(|txs| assert_eq!(txs.len(), 1));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn resolve_is_idempotent_per_message() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        let writer = writer(&chain, &state, 0, 3, 64);
        assert!(writer.resolve(dot_message(6)).await);
        assert!(writer.resolve(dot_message(6)).await);
        assert_eq!(state.in_flight_len(), 1, "the second resolve coalesces");

        state.insert_multisig(executed_record(40));
        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn repeated_recipient_and_amount_are_serialized() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        let writer = Arc::new(writer(&chain, &state, 0, 3, 64));

        assert!(writer.resolve(dot_message(6)).await);
        assert_eq!(state.in_flight_len(), 1);

        // same (recipient, amount), different nonce: must park in the gate
        let second = {
            let writer = writer.clone();
            tokio::spawn(async move { writer.resolve(dot_message(7)).await })
        };
        tokio::time::sleep(INTERVAL * 10).await;
        assert!(!second.is_finished(), "the second redeem must be gated");
        assert_eq!(state.in_flight_len(), 1);

        // complete the first; the gate opens and the second proceeds
        state.insert_multisig(executed_record(40));
        assert!(second.await.unwrap());

        let submissions = chain.clone();
        wait_until("second redeem submits", TIMEOUT, move || {
            !submissions.submissions().is_empty()
        })
        .await;
        state.insert_multisig(executed_record(90));
        let state_done = state.clone();
        wait_until("both coordinators exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn submissions_happen_only_on_owned_rounds() {
        let chain = Arc::new(MockChain::at_height(8));
        let state = SharedState::new();
        // index 1, nonce 5: (1 + 5) % 3 == 0, owned rounds are multiples of 3
        let writer = writer(&chain, &state, 1, 3, 64);
        assert!(writer.resolve(dot_message(5)).await);

        let submissions = chain.clone();
        wait_until("three submissions", TIMEOUT, move || {
            submissions.submissions().len() >= 3
        })
        .await;
        state.insert_multisig(executed_record(40));
        let state_done = state.clone();
        wait_until("coordinator exit", TIMEOUT, move || {
            state_done.in_flight_len() == 0
        })
        .await;

        for height in chain.submission_heights() {
            assert_eq!(
                height % 3,
                0,
                "submitted outside this relayer's round",
            );
        }
    }
}
