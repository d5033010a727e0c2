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
use num_bigint::BigUint;

use crate::config::FeeConfig;
use crate::error::{Error, Result};
use crate::types::ChainId;

/// Wrapped BDOT units per DOT (DOT carries 10 decimals, BDOT 18).
const UNITS_PER_DOT: u64 = 100_000_000;
/// Wrapped BKSM units per KSM (KSM carries 12 decimals).
const UNITS_PER_KSM: u64 = 1_000_000;
/// Wrapped BBTC units per X-BTC (X-BTC carries 8 decimals).
const UNITS_PER_XBTC: u64 = 10_000_000_000;
/// Wrapped BPCX units per PCX.
const UNITS_PER_PCX: u64 = 10_000_000_000;

/// The result of converting a wrapped deposit into the destination asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedeemAmount {
    /// Wrapped amount scaled down to the destination unit. The division
    /// remainder is discarded; sub-unit dust stays on the source chain.
    pub received: BigUint,
    /// Total bridge fee withheld from `received`.
    pub fee: BigUint,
    /// What the recipient actually gets: `received - fee`.
    pub actual: BigUint,
}

/// Converts wrapped deposit amounts into destination-asset amounts and
/// computes the bridge fee.
#[derive(Debug, Clone)]
pub struct AmountCodec {
    fees: FeeConfig,
}

impl AmountCodec {
    /// A codec using the given fee parameters.
    pub fn new(fees: FeeConfig) -> Self {
        Self { fees }
    }

    /// Scales `wrapped` down by the destination unit divisor and withholds
    /// the fee.
    ///
    /// Redeems that cannot cover the fee are rejected: an `actual` of zero
    /// counts as not covering it, the same as underflow.
    pub fn convert(
        &self,
        dest: ChainId,
        wrapped: &BigUint,
    ) -> Result<RedeemAmount> {
        let (divisor, fixed_fee, fee_rate) = match dest {
            ChainId::POLKADOT => {
                (UNITS_PER_DOT, self.fees.fixed_dot_fee, self.fees.fee_rate)
            }
            ChainId::KUSAMA => {
                (UNITS_PER_KSM, self.fees.fixed_ksm_fee, self.fees.fee_rate)
            }
            ChainId::CHAINX_BTC => (UNITS_PER_XBTC, 0, 0),
            ChainId::CHAINX_PCX => (UNITS_PER_PCX, 0, 0),
            other => return Err(Error::UnsupportedDestination(other)),
        };

        let received = wrapped / divisor;
        let fee = if fee_rate == 0 {
            BigUint::from(fixed_fee)
        } else {
            BigUint::from(fixed_fee) + &received / fee_rate
        };
        // received == fee leaves nothing to redeem, reject along with underflow
        if received <= fee {
            return Err(Error::AmountTooLow);
        }
        let actual = &received - &fee;

        Ok(RedeemAmount { received, fee, actual })
    }

    /// The `(wrapped, destination)` token symbols for a destination, used
    /// for conversion logging.
    pub fn asset_pair(dest: ChainId) -> (&'static str, &'static str) {
        match dest {
            ChainId::POLKADOT => ("BDOT", "DOT"),
            ChainId::KUSAMA => ("BKSM", "KSM"),
            ChainId::CHAINX_BTC => ("BBTC", "XBTC"),
            ChainId::CHAINX_PCX => ("BPCX", "PCX"),
            ChainId(_) => ("?", "?"),
        }
    }
}
