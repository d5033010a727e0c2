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
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::Notify;

use crate::types::DestKey;

/// Identifies a multisig operation by its initiating extrinsic: the origin
/// timepoint, which also keys the record table in observation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EventId {
    /// Block number of the initiating extrinsic.
    pub block: u64,
    /// Index of the extrinsic within that block.
    pub index: u32,
}

/// One in-flight multisig operation, as observed by the inbound listener.
///
/// Created when a `new_multisig` extrinsic is seen, mutated as approvals and
/// the execution are seen, removed by the writer once the redeem completes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiSigRecord {
    /// Approvals required to dispatch.
    pub threshold: u16,
    /// Hex account ids of the full signatory set.
    pub signatories: Vec<String>,
    /// Timepoint of the initiating extrinsic.
    pub origin: EventId,
    /// Hex form of the destination account.
    pub dest_address: String,
    /// Decimal string of the redeemed (post-fee) amount.
    pub dest_amount: String,
    /// Whether the inner call has been dispatched.
    pub executed: bool,
    /// One entry per observed approval, each listing the hex account ids of
    /// the signatories *other than* the approver.
    pub approvals: Vec<Vec<String>>,
}

#[derive(Debug, Default)]
struct Inner {
    in_flight: HashSet<DestKey>,
    multisig_txs: BTreeMap<EventId, MultiSigRecord>,
}

/// The state shared between the writer, its coordinator tasks and the
/// inbound listener: the in-flight redeem set and the multisig record
/// table.
///
/// Both maps sit behind one long-lived mutex, held only across map
/// operations and never across an RPC call or a sleep. The type is cheap to
/// clone and designed to be shared across tasks.
#[derive(Debug, Clone, Default)]
pub struct SharedState {
    inner: Arc<Mutex<Inner>>,
    removed: Arc<Notify>,
}

impl SharedState {
    /// An empty shared state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks a redeem as in flight. Returns `false` if the exact key is
    /// already being worked on, in which case the caller must not spawn a
    /// second coordinator.
    pub(crate) fn begin_redeem(&self, key: DestKey) -> bool {
        self.inner.lock().in_flight.insert(key)
    }

    /// Removes an in-flight redeem and, on a completed redeem, its multisig
    /// record, under a single lock acquisition. Wakes anyone parked in the
    /// repeat gate.
    pub(crate) fn finish_redeem(&self, key: &DestKey, record: Option<EventId>) {
        {
            let mut inner = self.inner.lock();
            inner.in_flight.remove(key);
            if let Some(id) = record {
                inner.multisig_txs.remove(&id);
            }
        }
        self.removed.notify_waiters();
    }

    /// Whether another in-flight redeem targets the same recipient and
    /// amount under a different nonce.
    pub(crate) fn has_conflicting(&self, key: &DestKey) -> bool {
        self.inner
            .lock()
            .in_flight
            .iter()
            .any(|other| key.conflicts_with(other))
    }

    /// The notifier signalled whenever an in-flight redeem is removed.
    pub(crate) fn removal_signal(&self) -> Arc<Notify> {
        self.removed.clone()
    }

    /// Runs `f` over the record table in origin-timepoint order.
    pub(crate) fn scan_multisig_txs<T>(
        &self,
        f: impl FnOnce(&BTreeMap<EventId, MultiSigRecord>) -> T,
    ) -> T {
        f(&self.inner.lock().multisig_txs)
    }

    /// Number of redeems currently in flight.
    pub fn in_flight_len(&self) -> usize {
        self.inner.lock().in_flight.len()
    }

    /// Listener surface: registers a newly observed multisig operation.
    pub fn insert_multisig(&self, record: MultiSigRecord) {
        self.inner.lock().multisig_txs.insert(record.origin, record);
    }

    /// Listener surface: appends an observed approval round.
    pub fn record_approval(&self, id: EventId, other_signatories: Vec<String>) {
        if let Some(record) = self.inner.lock().multisig_txs.get_mut(&id) {
            record.approvals.push(other_signatories);
        }
    }

    /// Listener surface: flags the operation as dispatched.
    pub fn mark_executed(&self, id: EventId) {
        if let Some(record) = self.inner.lock().multisig_txs.get_mut(&id) {
            record.executed = true;
        }
    }

    /// Listener surface: drops a record, returning it if present.
    pub fn remove_multisig(&self, id: &EventId) -> Option<MultiSigRecord> {
        self.inner.lock().multisig_txs.remove(id)
    }
}
