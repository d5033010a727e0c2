use derive_more::Display;

/// The target used for all probe events.
pub const TARGET: &str = "writer_probe";

/// The Kind of the Probe.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    /// When the Lifecycle of the writer changes, like accepting a message.
    #[display(fmt = "lifecycle")]
    Lifecycle,
    /// Per-message redeem progress.
    #[display(fmt = "redeem")]
    Redeem,
    /// Extrinsic submission state.
    #[display(fmt = "tx_submit")]
    TxSubmit,
}
