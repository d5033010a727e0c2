use crate::calls::Timepoint;
use crate::identity::RelayerIdentity;
use crate::store::{EventId, SharedState};

/// What the tracker found for a redeem, and therefore what the coordinator
/// should do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerCheck {
    /// The multisig operation has been dispatched; the redeem is done.
    Executed(EventId),
    /// This relayer already approved and must wait for the peers.
    AlreadyVoted,
    /// An operation exists and still needs this relayer's approval.
    Approve {
        /// Origin timepoint of the operation being approved.
        timepoint: Timepoint,
        /// Dispatch weight to allow, since this approval may complete the
        /// threshold.
        max_weight: u64,
    },
    /// No matching operation yet; this relayer initiates one.
    Initiate,
}

/// Read-only view into the listener-maintained multisig record table.
///
/// Given the redeem's destination and post-fee amount it locates the
/// in-flight operation, its timepoint, execution status, and whether this
/// relayer has already voted.
#[derive(Debug, Clone)]
pub struct MultiSigTracker {
    state: SharedState,
    relayer_hex: String,
    max_weight: u64,
}

impl MultiSigTracker {
    /// A tracker for the given relayer over the shared record table.
    pub fn new(
        state: SharedState,
        identity: &RelayerIdentity,
        max_weight: u64,
    ) -> Self {
        Self { state, relayer_hex: identity.account_hex(), max_weight }
    }

    /// Scans the record table for a record matching `(dest_address,
    /// dest_amount)`, in origin-timepoint order; the first match wins.
    ///
    /// A record's approval rounds each list the signatories *other than*
    /// the approver, so this relayer has already voted exactly when rounds
    /// exist and none of them lists it.
    pub fn check(&self, dest_address: &str, dest_amount: &str) -> TrackerCheck {
        self.state.scan_multisig_txs(|txs| {
            for record in txs.values() {
                if record.dest_address != dest_address
                    || record.dest_amount != dest_amount
                {
                    continue;
                }
                if record.executed {
                    return TrackerCheck::Executed(record.origin);
                }
                let voted = !record.approvals.is_empty()
                    && !record.approvals.iter().any(|round| {
                        round.iter().any(|account| *account == self.relayer_hex)
                    });
                if voted {
                    return TrackerCheck::AlreadyVoted;
                }
                return TrackerCheck::Approve {
                    timepoint: Timepoint {
                        height: record.origin.block as u32,
                        index: record.origin.index,
                    },
                    max_weight: self.max_weight,
                };
            }
            TrackerCheck::Initiate
        })
    }
}
