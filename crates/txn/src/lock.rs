//! Row-level exclusive locking with no waiting.
//!
//! Acquisition either succeeds immediately or fails; the lock table never
//! blocks a caller, so deadlock is structurally impossible. Liveness (a
//! transaction actually making progress) is the caller's responsibility.

use common::{RowId, TxId};
use hashbrown::HashMap;
use parking_lot::Mutex;

#[derive(Default)]
pub struct LockTable {
    holders: Mutex<HashMap<i64, TxId>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grants the lock if the row is free or already held by `txid`.
    ///
    /// Returns `false` immediately on any other conflict; never blocks.
    pub fn try_acquire(&self, txid: TxId, row_id: RowId) -> bool {
        let mut holders = self.holders.lock();
        match holders.get(&row_id.0) {
            Some(&holder) if holder == txid => true,
            Some(_) => false,
            None => {
                holders.insert(row_id.0, txid);
                true
            }
        }
    }

    /// Releases the lock if `txid` is the current holder. No-op otherwise.
    pub fn release(&self, txid: TxId, row_id: RowId) {
        let mut holders = self.holders.lock();
        if holders.get(&row_id.0) == Some(&txid) {
            holders.remove(&row_id.0);
        }
    }

    /// Drops every row held by `txid`.
    pub fn release_all(&self, txid: TxId) {
        self.holders.lock().retain(|_, &mut holder| holder != txid);
    }

    pub fn is_locked(&self, row_id: RowId) -> bool {
        self.holders.lock().contains_key(&row_id.0)
    }

    pub fn holder_of(&self, row_id: RowId) -> Option<TxId> {
        self.holders.lock().get(&row_id.0).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_is_granted_when_free() {
        let locks = LockTable::new();
        assert!(locks.try_acquire(TxId(1), RowId(1)));
        assert_eq!(locks.holder_of(RowId(1)), Some(TxId(1)));
    }

    #[test]
    fn reacquire_by_the_same_holder_is_a_noop_success() {
        let locks = LockTable::new();
        assert!(locks.try_acquire(TxId(1), RowId(1)));
        assert!(locks.try_acquire(TxId(1), RowId(1)));
    }

    #[test]
    fn acquire_by_another_transaction_is_refused() {
        let locks = LockTable::new();
        assert!(locks.try_acquire(TxId(1), RowId(1)));
        assert!(!locks.try_acquire(TxId(2), RowId(1)));
    }

    #[test]
    fn release_frees_the_row_for_other_holders() {
        let locks = LockTable::new();
        locks.try_acquire(TxId(1), RowId(1));
        locks.release(TxId(1), RowId(1));
        assert!(!locks.is_locked(RowId(1)));
        assert!(locks.try_acquire(TxId(2), RowId(1)));
    }

    #[test]
    fn release_by_a_non_holder_is_a_noop() {
        let locks = LockTable::new();
        locks.try_acquire(TxId(1), RowId(1));
        locks.release(TxId(2), RowId(1));
        assert_eq!(locks.holder_of(RowId(1)), Some(TxId(1)));
    }

    #[test]
    fn release_all_drops_every_row_for_that_transaction() {
        let locks = LockTable::new();
        locks.try_acquire(TxId(1), RowId(1));
        locks.try_acquire(TxId(1), RowId(2));
        locks.try_acquire(TxId(2), RowId(3));

        locks.release_all(TxId(1));

        assert!(!locks.is_locked(RowId(1)));
        assert!(!locks.is_locked(RowId(2)));
        assert!(locks.is_locked(RowId(3)));
    }
}
