//! Ledger contract: the durable, append-only home of committed sub-blocks.

use meridian_types::{Address, SubBlock, SubBlockId, Timestamp, Transaction, TxId, TxStatus, ValidatorId};
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// One validator's cut of a sub-block reward.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardShare {
    pub validator: ValidatorId,
    pub amount: u128,
}

/// Everything the ledger persists for one committed sub-block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommittedSubBlock {
    pub sub_block: SubBlock,
    /// Full transaction bodies, in the sub-block's fixed order.
    pub transactions: Vec<Transaction>,
    pub validator: ValidatorId,
    pub rewards: Vec<RewardShare>,
    pub difficulty: u64,
    pub committed_at: Timestamp,
}

impl CommittedSubBlock {
    pub fn id(&self) -> SubBlockId {
        self.sub_block.id()
    }
}

/// Summary statistics for the ledger.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSummary {
    pub height: u64,
    pub transactions: u64,
    pub accounts: u64,
}

/// Durable ledger interface.
///
/// Implementations must make [`append_sub_block`](Ledger::append_sub_block)
/// all-or-nothing and serialize appends into a single height sequence.
pub trait Ledger: Send + Sync {
    /// Atomically append a sub-block: persist it, apply its transfers and
    /// credit its rewards. Returns the new height.
    ///
    /// Fails with [`StoreError::Conflict`] if any transaction is already
    /// present or a transfer cannot be applied; nothing is written then.
    fn append_sub_block(&self, entry: CommittedSubBlock) -> Result<u64, StoreError>;

    /// Number of committed sub-blocks.
    fn height(&self) -> Result<u64, StoreError>;

    fn sub_block(&self, id: &SubBlockId) -> Result<Option<CommittedSubBlock>, StoreError>;

    fn contains_transaction(&self, id: &TxId) -> Result<bool, StoreError>;

    /// Most recent committed transactions involving `address`, newest first.
    fn history(&self, address: &Address, limit: usize) -> Result<Vec<Transaction>, StoreError>;

    /// Highest committed nonce for `address`, if it has sent anything.
    fn last_nonce(&self, address: &Address) -> Result<Option<u64>, StoreError>;

    fn balance(&self, address: &Address) -> Result<u128, StoreError>;

    /// Total rewards credited to a validator.
    fn reward_balance(&self, validator: &ValidatorId) -> Result<u128, StoreError>;

    fn summary(&self) -> Result<LedgerSummary, StoreError>;

    /// Ledger-side status: `Some(Committed)` for committed transactions.
    fn transaction_status(&self, id: &TxId) -> Result<Option<TxStatus>, StoreError> {
        Ok(self
            .contains_transaction(id)?
            .then_some(TxStatus::Committed))
    }
}
