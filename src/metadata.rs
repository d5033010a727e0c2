use std::collections::HashMap;

use crate::error::{Error, Result};

/// A light view of the destination runtime metadata: just enough to resolve
/// `(pallet, call)` names into dispatch indices.
///
/// The concrete RPC client decodes the full frame-metadata blob and hands the
/// writer this view; refreshing it at the top of every redeem round (and on
/// every submit attempt) is what keeps the writer safe across runtime
/// upgrades.
#[derive(Debug, Clone, Default)]
pub struct ChainMetadata {
    pallets: HashMap<String, PalletMetadata>,
}

/// Per-pallet slice of [`ChainMetadata`].
#[derive(Debug, Clone)]
pub struct PalletMetadata {
    index: u8,
    calls: HashMap<String, u8>,
}

impl ChainMetadata {
    /// An empty metadata view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a pallet with its dispatch index and call table.
    pub fn with_pallet(
        mut self,
        name: &str,
        index: u8,
        calls: &[(&str, u8)],
    ) -> Self {
        let calls = calls
            .iter()
            .map(|(call, idx)| (call.to_string(), *idx))
            .collect();
        self.pallets
            .insert(name.to_string(), PalletMetadata { index, calls });
        self
    }

    /// Resolves a call referenced by pallet and call name into its
    /// `(pallet_index, call_index)` pair.
    pub fn call_index(&self, pallet: &str, call: &str) -> Result<(u8, u8)> {
        let not_found = || Error::CallNotFound {
            pallet: pallet.to_string(),
            call: call.to_string(),
        };
        let p = self.pallets.get(pallet).ok_or_else(not_found)?;
        let c = p.calls.get(call).ok_or_else(not_found)?;
        Ok((p.index, *c))
    }

    /// Whether any known pallet lives at `index`. Used as a stale-call guard
    /// when re-fetching metadata right before submission.
    pub fn has_pallet_index(&self, index: u8) -> bool {
        self.pallets.values().any(|p| p.index == index)
    }
}
