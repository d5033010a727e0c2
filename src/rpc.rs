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
use futures::stream::BoxStream;
use sp_core::H256;

use crate::error::Result;
use crate::metadata::ChainMetadata;

/// The latest runtime version, as reported by the destination node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeVersion {
    /// Version of the runtime specification.
    pub spec_version: u32,
    /// Version of the transaction format.
    pub transaction_version: u32,
}

/// The slice of a block header the writer cares about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// The block number.
    pub number: u64,
}

/// Lifecycle of a submitted extrinsic, as reported by the node's
/// submit-and-watch subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    /// Part of the ready transaction queue.
    Ready,
    /// Broadcast to the network.
    Broadcast,
    /// Included in the given block.
    InBlock(H256),
    /// The block this extrinsic was included in has been retracted.
    Retracted(H256),
    /// Finality gadget timed out waiting for the block.
    FinalityTimeout(H256),
    /// Included in a finalized block.
    Finalized(H256),
    /// Dropped from the transaction pool.
    Dropped,
    /// Declared invalid by the pool or a block author.
    Invalid,
}

/// A stream of transaction status updates for one submitted extrinsic.
pub type TxStatusStream = BoxStream<'static, Result<TxStatus>>;

/// The chain RPC capability surface the writer runs against.
///
/// The production implementation wraps a Substrate RPC client; tests use a
/// scripted mock. All methods surface transport failures as
/// [`crate::Error::Rpc`], which callers treat as transient.
#[async_trait::async_trait]
pub trait ChainRpc: Send + Sync + 'static {
    /// Fetches and decodes the latest runtime metadata.
    async fn latest_metadata(&self) -> Result<ChainMetadata>;

    /// The hash of the block at `height`. The writer only ever asks for
    /// height 0, the genesis hash.
    async fn block_hash(&self, height: u64) -> Result<H256>;

    /// The latest runtime version.
    async fn latest_runtime_version(&self) -> Result<RuntimeVersion>;

    /// The hash of the latest finalized block.
    async fn finalized_head(&self) -> Result<H256>;

    /// The header of the block with the given hash.
    async fn header(&self, hash: H256) -> Result<Header>;

    /// Reads raw storage under `key` at the latest block.
    async fn storage(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    /// Submits a signed extrinsic and subscribes to its status updates.
    async fn submit_and_watch(
        &self,
        extrinsic: Vec<u8>,
    ) -> Result<TxStatusStream>;
}
