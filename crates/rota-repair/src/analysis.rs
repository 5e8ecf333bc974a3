//! Blocking analysis as supplied by the explanation service

use rota_core::ItemId;
use serde::{Deserialize, Serialize};

/// Why an item could not be placed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingDescriptor {
    /// Blocked item
    pub item: ItemId,
    /// Explanation for the user
    pub reason: String,
}

/// A relaxation the explanation service believes would help
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelaxCandidate {
    /// Display label; the first token's description is used when empty
    #[serde(default)]
    pub label: String,
    /// Raw repair tokens
    pub tokens: Vec<String>,
    /// Items this candidate unblocks; empty means all blocked items
    #[serde(default)]
    pub affected_items: Vec<ItemId>,
}

/// Explanation service output
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockingAnalysis {
    /// Items that could not be placed
    #[serde(default)]
    pub blocking: Vec<BlockingDescriptor>,
    /// Suggested relaxations
    #[serde(default)]
    pub relax_candidates: Vec<RelaxCandidate>,
}

impl BlockingAnalysis {
    /// All blocked items, in order, without repeats
    #[must_use]
    pub fn blocked_items(&self) -> Vec<ItemId> {
        let mut items: Vec<ItemId> = Vec::with_capacity(self.blocking.len());
        for descriptor in &self.blocking {
            if !items.contains(&descriptor.item) {
                items.push(descriptor.item.clone());
            }
        }
        items
    }
}
