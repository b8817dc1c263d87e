//! Nullable ledger: in-memory, append-only sub-block ledger.
//!
//! Committed sub-blocks are kept bincode-encoded, the way a persistent
//! backend would store them, so encoding problems surface in tests too.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

use meridian_store::{CommittedSubBlock, Ledger, LedgerSummary, StoreError};
use meridian_types::{Address, SubBlockId, Transaction, TxId, TxStatus, ValidatorId};
use parking_lot::Mutex;

#[derive(Default)]
struct LedgerState {
    blocks: Vec<Vec<u8>>,
    index: HashMap<SubBlockId, usize>,
    committed: HashSet<TxId>,
    /// Committed transactions in commit order.
    history: Vec<Transaction>,
    nonces: HashMap<Address, u64>,
    balances: HashMap<Address, u128>,
    rewards: HashMap<ValidatorId, u128>,
}

/// An in-memory ledger for testing and development runs.
/// Thread-safe for use with tokio's multi-threaded runtime.
#[derive(Default)]
pub struct NullLedger {
    state: Mutex<LedgerState>,
    check_balances: bool,
    unavailable: AtomicBool,
}

impl NullLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse transfers the sender cannot cover.
    pub fn with_balance_checks() -> Self {
        Self {
            check_balances: true,
            ..Self::default()
        }
    }

    /// Mint funds to an address (genesis allocation).
    pub fn credit(&self, address: impl Into<Address>, amount: u128) {
        let mut state = self.state.lock();
        let balance = state.balances.entry(address.into()).or_insert(0);
        *balance = balance.saturating_add(amount);
    }

    /// While set, every call fails with `StoreError::Unavailable`.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("null ledger set to fail".into()));
        }
        Ok(())
    }
}

impl Ledger for NullLedger {
    fn append_sub_block(&self, entry: CommittedSubBlock) -> Result<u64, StoreError> {
        self.check()?;
        let mut state = self.state.lock();
        if state.index.contains_key(&entry.id()) {
            return Err(StoreError::Duplicate(format!("sub-block {}", entry.id())));
        }

        // Validate against scratch copies first so a failure writes nothing.
        let mut seen = HashSet::new();
        let mut nonces: HashMap<Address, u64> = HashMap::new();
        let mut balances: HashMap<Address, u128> = HashMap::new();
        for tx in &entry.transactions {
            if state.committed.contains(&tx.id) || !seen.insert(&tx.id) {
                return Err(StoreError::Conflict(format!("transaction {} already committed", tx.id)));
            }
            let last = nonces
                .get(&tx.sender)
                .or_else(|| state.nonces.get(&tx.sender))
                .copied();
            if let Some(last) = last {
                if tx.nonce <= last {
                    return Err(StoreError::Conflict(format!(
                        "nonce {} for {} not above {}",
                        tx.nonce, tx.sender, last
                    )));
                }
            }
            nonces.insert(tx.sender.clone(), tx.nonce);

            let sender_balance = balances
                .get(&tx.sender)
                .or_else(|| state.balances.get(&tx.sender))
                .copied()
                .unwrap_or(0);
            if self.check_balances && sender_balance < tx.amount {
                return Err(StoreError::Conflict(format!(
                    "{} has {} but sends {}",
                    tx.sender, sender_balance, tx.amount
                )));
            }
            balances.insert(tx.sender.clone(), sender_balance.saturating_sub(tx.amount));
            let receiver_balance = balances
                .get(&tx.receiver)
                .or_else(|| state.balances.get(&tx.receiver))
                .copied()
                .unwrap_or(0);
            balances.insert(tx.receiver.clone(), receiver_balance.saturating_add(tx.amount));
        }

        let encoded =
            bincode::serialize(&entry).map_err(|e| StoreError::Serialization(e.to_string()))?;

        state.nonces.extend(nonces);
        state.balances.extend(balances);
        for share in &entry.rewards {
            let r = state.rewards.entry(share.validator.clone()).or_insert(0);
            *r = r.saturating_add(share.amount);
        }
        for tx in &entry.transactions {
            state.committed.insert(tx.id.clone());
            let mut committed = tx.clone();
            committed.status = TxStatus::Committed;
            state.history.push(committed);
        }
        let position = state.blocks.len();
        state.index.insert(entry.id(), position);
        state.blocks.push(encoded);

        let height = state.blocks.len() as u64;
        tracing::debug!(sub_block = %entry.id(), height, "null ledger appended sub-block");
        Ok(height)
    }

    fn height(&self) -> Result<u64, StoreError> {
        self.check()?;
        Ok(self.state.lock().blocks.len() as u64)
    }

    fn sub_block(&self, id: &SubBlockId) -> Result<Option<CommittedSubBlock>, StoreError> {
        self.check()?;
        let state = self.state.lock();
        let Some(&position) = state.index.get(id) else {
            return Ok(None);
        };
        let bytes = state
            .blocks
            .get(position)
            .ok_or_else(|| StoreError::Backend(format!("index points past block {position}")))?;
        bincode::deserialize(bytes)
            .map(Some)
            .map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn contains_transaction(&self, id: &TxId) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.state.lock().committed.contains(id))
    }

    fn history(&self, address: &Address, limit: usize) -> Result<Vec<Transaction>, StoreError> {
        self.check()?;
        Ok(self
            .state
            .lock()
            .history
            .iter()
            .rev()
            .filter(|tx| tx.involves(address))
            .take(limit)
            .cloned()
            .collect())
    }

    fn last_nonce(&self, address: &Address) -> Result<Option<u64>, StoreError> {
        self.check()?;
        Ok(self.state.lock().nonces.get(address).copied())
    }

    fn balance(&self, address: &Address) -> Result<u128, StoreError> {
        self.check()?;
        Ok(self.state.lock().balances.get(address).copied().unwrap_or(0))
    }

    fn reward_balance(&self, validator: &ValidatorId) -> Result<u128, StoreError> {
        self.check()?;
        Ok(self.state.lock().rewards.get(validator).copied().unwrap_or(0))
    }

    fn summary(&self) -> Result<LedgerSummary, StoreError> {
        self.check()?;
        let state = self.state.lock();
        Ok(LedgerSummary {
            height: state.blocks.len() as u64,
            transactions: state.committed.len() as u64,
            accounts: state.balances.len() as u64,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use meridian_store::RewardShare;
    use meridian_types::{SubBlock, Timestamp};

    fn tx(id: &str, from: &str, to: &str, amount: u128, nonce: u64) -> Transaction {
        Transaction::new(id, from, to, amount, nonce, Timestamp::EPOCH)
    }

    fn entry(byte: u8, txs: Vec<Transaction>) -> CommittedSubBlock {
        let ids = txs.iter().map(|t| t.id.clone()).collect();
        CommittedSubBlock {
            sub_block: SubBlock::new(SubBlockId::new([byte; 32]), ids, Timestamp::EPOCH),
            transactions: txs,
            validator: ValidatorId::new("v"),
            rewards: vec![RewardShare {
                validator: ValidatorId::new("v"),
                amount: 10,
            }],
            difficulty: 1,
            committed_at: Timestamp::from_millis(5),
        }
    }

    #[test]
    fn append_applies_everything() {
        let ledger = NullLedger::with_balance_checks();
        ledger.credit("alice", 100);
        let e = entry(1, vec![tx("t1", "alice", "bob", 30, 1), tx("t2", "alice", "bob", 20, 2)]);
        assert_eq!(ledger.append_sub_block(e.clone()).unwrap(), 1);

        assert_eq!(ledger.balance(&"alice".into()).unwrap(), 50);
        assert_eq!(ledger.balance(&"bob".into()).unwrap(), 50);
        assert_eq!(ledger.last_nonce(&"alice".into()).unwrap(), Some(2));
        assert_eq!(ledger.reward_balance(&ValidatorId::new("v")).unwrap(), 10);
        assert_eq!(ledger.sub_block(&e.id()).unwrap(), Some(e));
        assert_eq!(
            ledger.transaction_status(&TxId::new("t1")).unwrap(),
            Some(TxStatus::Committed)
        );

        let history = ledger.history(&"bob".into(), 10).unwrap();
        let ids: Vec<&str> = history.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["t2", "t1"]);
        assert_eq!(
            ledger.summary().unwrap(),
            LedgerSummary {
                height: 1,
                transactions: 2,
                accounts: 2
            }
        );
    }

    #[test]
    fn conflicting_append_writes_nothing() {
        let ledger = NullLedger::with_balance_checks();
        ledger.credit("alice", 100);
        ledger
            .append_sub_block(entry(1, vec![tx("t1", "alice", "bob", 10, 5)]))
            .unwrap();

        // Stale nonce.
        let stale = entry(2, vec![tx("t2", "alice", "bob", 10, 6), tx("t3", "alice", "bob", 10, 5)]);
        assert!(matches!(ledger.append_sub_block(stale), Err(StoreError::Conflict(_))));
        // Already committed.
        let dup = entry(3, vec![tx("t1", "alice", "bob", 10, 9)]);
        assert!(matches!(ledger.append_sub_block(dup), Err(StoreError::Conflict(_))));
        // Overdraft.
        let broke = entry(4, vec![tx("t4", "alice", "bob", 1_000, 9)]);
        assert!(matches!(ledger.append_sub_block(broke), Err(StoreError::Conflict(_))));

        assert_eq!(ledger.height().unwrap(), 1);
        assert_eq!(ledger.balance(&"alice".into()).unwrap(), 90);
        assert_eq!(ledger.last_nonce(&"alice".into()).unwrap(), Some(5));
        assert!(!ledger.contains_transaction(&TxId::new("t2")).unwrap());
    }

    #[test]
    fn unavailable_ledger_fails_every_call() {
        let ledger = NullLedger::new();
        ledger.set_unavailable(true);
        assert!(matches!(ledger.height(), Err(StoreError::Unavailable(_))));
        assert!(matches!(
            ledger.append_sub_block(entry(1, vec![])),
            Err(StoreError::Unavailable(_))
        ));
    }
}
