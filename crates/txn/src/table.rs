//! Process-wide transaction id -> status map.

use common::TxId;
use hashbrown::HashMap;
use parking_lot::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TxStatus {
    Active,
    Preparing,
    Committed,
    Aborted,
}

#[derive(Default)]
pub struct TransactionTable {
    statuses: Mutex<HashMap<u64, TxStatus>>,
}

impl TransactionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, txid: TxId, status: TxStatus) {
        self.statuses.lock().insert(txid.0, status);
    }

    pub fn set_status(&self, txid: TxId, status: TxStatus) {
        self.statuses.lock().insert(txid.0, status);
    }

    pub fn status(&self, txid: TxId) -> Option<TxStatus> {
        self.statuses.lock().get(&txid.0).copied()
    }
}
