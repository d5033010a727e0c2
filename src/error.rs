use crate::types::ChainId;

/// An enum of all possible errors that could be encountered during the
/// execution of the redeem writer.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An Io error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// Config loading error.
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    /// Error while parsing the config files.
    #[error("Config parse error: {}", _0)]
    ParseConfig(#[from] serde_path_to_error::Error<config::ConfigError>),
    /// Error while iterating over a glob pattern.
    #[error(transparent)]
    GlobPattern(#[from] glob::PatternError),
    /// Error while parsing a URL.
    #[error(transparent)]
    Url(#[from] url::ParseError),
    /// SCALE Codec error.
    #[error(transparent)]
    ScaleCodec(#[from] codec::Error),
    /// Transport-level failure of the underlying chain RPC.
    #[error("RPC transport error: {}", _0)]
    Rpc(String),
    /// The destination chain has no asset route in this writer.
    #[error("Unsupported destination chain: {}", _0)]
    UnsupportedDestination(ChainId),
    /// The runtime metadata no longer carries the requested call.
    #[error("No such call in the runtime metadata: {}.{}", pallet, call)]
    CallNotFound {
        /// The pallet the call was looked up in.
        pallet: String,
        /// The call name that could not be resolved.
        call: String,
    },
    /// The redeemed amount does not cover the bridge fee.
    #[error("Redeemed amount does not cover the bridge fee")]
    AmountTooLow,
    /// The redeemed amount does not fit the destination balance type.
    #[error("Redeemed amount does not fit the destination balance type")]
    AmountOverflow,
    /// The configured relayer set is inconsistent.
    #[error("Invalid relayer set: {}", _0)]
    InvalidRelayerSet(&'static str),
    /// An extrinsic submission ran out of retries.
    #[error("Tx submission retried too many times")]
    RetryExhausted,
    /// Generic error.
    #[error("{}", _0)]
    Generic(&'static str),
}

/// A type alias for the result of the redeem writer, that uses the [`Error`]
/// enum.
pub type Result<T> = std::result::Result<T, Error>;
