//! Pools of records still available for matching

use std::collections::BTreeMap;

use crate::types::*;

/// Unclaimed receipts, iterated in id order
#[derive(Debug, Clone, Default)]
pub struct ReceiptPool<'a> {
    unclaimed: BTreeMap<ReceiptId, &'a ReceiptRecord>,
}

impl<'a> ReceiptPool<'a> {
    pub fn unclaimed(&self) -> impl Iterator<Item = &'a ReceiptRecord> + '_ {
        self.unclaimed.values().copied()
    }

    pub fn get(&self, id: ReceiptId) -> Option<&'a ReceiptRecord> {
        self.unclaimed.get(&id).copied()
    }

    pub fn is_unclaimed(&self, id: ReceiptId) -> bool {
        self.unclaimed.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.unclaimed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.unclaimed.is_empty()
    }

    fn claim(&mut self, id: ReceiptId) -> Option<&'a ReceiptRecord> {
        self.unclaimed.remove(&id)
    }
}

/// Entries and receipts not yet claimed by any pass
///
/// Owned by the orchestrator for the duration of one run. Records are only
/// borrowed; claiming removes them from the pool and nothing else.
#[derive(Debug, Clone)]
pub struct MatchPool<'a> {
    entries: BTreeMap<EntryId, &'a StatementEntry>,
    receipts: ReceiptPool<'a>,
}

impl<'a> MatchPool<'a> {
    /// Build a pool, rejecting duplicate entry or receipt ids
    pub fn new<E, R>(entries: E, receipts: R) -> ReconciliationResult<Self>
    where
        E: IntoIterator<Item = &'a StatementEntry>,
        R: IntoIterator<Item = &'a ReceiptRecord>,
    {
        let mut entry_map = BTreeMap::new();
        for entry in entries {
            if entry_map.insert(entry.id, entry).is_some() {
                return Err(ReconciliationError::DuplicateRecord(format!(
                    "statement entry {}",
                    entry.id
                )));
            }
        }

        let mut receipt_map = BTreeMap::new();
        for receipt in receipts {
            if receipt_map.insert(receipt.id, receipt).is_some() {
                return Err(ReconciliationError::DuplicateRecord(format!(
                    "receipt {}",
                    receipt.id
                )));
            }
        }

        Ok(Self {
            entries: entry_map,
            receipts: ReceiptPool {
                unclaimed: receipt_map,
            },
        })
    }

    /// Snapshot of unmatched entries in id order
    pub fn pending_entries(&self) -> Vec<&'a StatementEntry> {
        self.entries.values().copied().collect()
    }

    pub fn receipts(&self) -> &ReceiptPool<'a> {
        &self.receipts
    }

    pub fn pending_entry_count(&self) -> usize {
        self.entries.len()
    }

    /// Take an entry out of the pool; false if it was already taken
    pub fn claim_entry(&mut self, id: EntryId) -> bool {
        self.entries.remove(&id).is_some()
    }

    /// Take a receipt out of the pool; false if it was already taken
    pub fn claim_receipt(&mut self, id: ReceiptId) -> bool {
        self.receipts.claim(id).is_some()
    }

    /// Remaining entry ids and receipts, both in id order
    pub fn into_remaining(self) -> (Vec<EntryId>, Vec<&'a ReceiptRecord>) {
        (
            self.entries.into_keys().collect(),
            self.receipts.unclaimed.into_values().collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;
    use chrono::NaiveDate;

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 11, 2).unwrap()
    }

    #[test]
    fn test_claims_are_exclusive() {
        let entries = vec![StatementEntry::debit(2, date(), BigDecimal::from(10), "A").unwrap()];
        let receipts = vec![
            ReceiptRecord::simple(7, BigDecimal::from(10), date()).unwrap(),
            ReceiptRecord::simple(3, BigDecimal::from(10), date()).unwrap(),
        ];
        let mut pool = MatchPool::new(&entries, &receipts).unwrap();

        let order: Vec<ReceiptId> = pool.receipts().unclaimed().map(|r| r.id).collect();
        assert_eq!(order, vec![ReceiptId(3), ReceiptId(7)]);

        assert!(pool.claim_receipt(ReceiptId(3)));
        assert!(!pool.claim_receipt(ReceiptId(3)));
        assert!(pool.claim_entry(EntryId(2)));
        assert!(!pool.claim_entry(EntryId(2)));

        let (entries_left, receipts_left) = pool.into_remaining();
        assert!(entries_left.is_empty());
        assert_eq!(receipts_left.len(), 1);
        assert_eq!(receipts_left[0].id, ReceiptId(7));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let entries = vec![
            StatementEntry::debit(1, date(), BigDecimal::from(10), "A").unwrap(),
            StatementEntry::credit(1, date(), BigDecimal::from(20), "B").unwrap(),
        ];
        assert!(matches!(
            MatchPool::new(&entries, &[]),
            Err(ReconciliationError::DuplicateRecord(_))
        ));
    }
}
