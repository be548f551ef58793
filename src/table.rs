//! Hash table of baby steps for the giant-step search.
//!
//! Keys are the (a, b) coefficients of a reduced ideal, hashed to u64; the
//! stored entry keeps the exact coefficients for verification, the distance
//! of the step, and its position in the walk. Capacity is derived from a
//! memory budget so a search with many workers degrades to longer giant
//! strides instead of exhausting memory.

use std::collections::hash_map::{DefaultHasher, Entry};
use std::collections::HashMap;
use std::hash::{Hash, Hasher};

use num_bigint::BigInt;

use crate::ideal::Ideal;
use crate::InfraError;

/// One stored baby step.
#[derive(Debug, Clone)]
pub struct BabyStepEntry {
    pub a: BigInt,
    pub b: BigInt,
    pub distance: f64,
    /// Position of this step in the baby-step walk.
    pub baby_index: u64,
    /// Which giant-step window the entry belongs to: baby_index / l.
    pub window: u32,
}

#[derive(Debug)]
pub struct BabyStepTable {
    entries: Vec<BabyStepEntry>,
    index: HashMap<u64, u32>,
    capacity: usize,
}

/// Canonical key for a reduced ideal: (a, b) determine c given the
/// discriminant, so hashing the pair identifies the ideal.
pub fn hash_coeffs(a: &BigInt, b: &BigInt) -> u64 {
    let mut h = DefaultHasher::new();
    a.hash(&mut h);
    b.hash(&mut h);
    h.finish()
}

/// Estimated bytes per entry: three machine words of table overhead, the
/// two coefficients at about half the discriminant's bits each, and the
/// distance unless the search only needs existence (`nodist`).
pub fn estimate_entry_size(delta_bits: u64, nodist: bool) -> usize {
    let coeff_bytes = (delta_bits as usize / 2 + 7) / 8;
    let mut size = 3 * std::mem::size_of::<usize>() + 2 * coeff_bytes;
    if !nodist {
        size += std::mem::size_of::<f64>();
    }
    size
}

impl BabyStepTable {
    pub fn with_capacity(capacity: usize) -> Self {
        BabyStepTable {
            entries: Vec::new(),
            index: HashMap::new(),
            capacity,
        }
    }

    /// Size the table from a per-worker share of the memory budget.
    pub fn with_budget(
        max_memory: usize,
        workers: usize,
        entry_size: usize,
    ) -> Result<Self, InfraError> {
        let capacity = max_memory / (workers.max(1) * entry_size);
        if capacity == 0 {
            return Err(InfraError::MemoryBudgetExceeded {
                needed: entry_size,
                budget: max_memory,
            });
        }
        Ok(Self::with_capacity(capacity))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert a baby step. On a key collision the first entry wins, which
    /// keeps the smallest distance for a repeated ideal.
    pub fn insert(
        &mut self,
        ideal: &Ideal,
        distance: f64,
        baby_index: u64,
        window: u32,
    ) -> Result<(), InfraError> {
        if self.entries.len() >= self.capacity {
            return Err(InfraError::TableFull {
                capacity: self.capacity,
            });
        }
        let key = hash_coeffs(&ideal.a, &ideal.b);
        if let Entry::Vacant(slot) = self.index.entry(key) {
            slot.insert(self.entries.len() as u32);
            self.entries.push(BabyStepEntry {
                a: ideal.a.clone(),
                b: ideal.b.clone(),
                distance,
                baby_index,
                window,
            });
        }
        Ok(())
    }

    /// Look up an ideal, verifying the stored coefficients against the
    /// query so hash collisions never produce a false match.
    pub fn search(&self, ideal: &Ideal) -> Option<&BabyStepEntry> {
        let key = hash_coeffs(&ideal.a, &ideal.b);
        let &slot = self.index.get(&key)?;
        let entry = &self.entries[slot as usize];
        if entry.a == ideal.a && entry.b == ideal.b {
            Some(entry)
        } else {
            None
        }
    }

    /// Fold another worker's table into this one. Capacity grows to the
    /// sum so merging never reports a spurious overflow.
    pub fn merge(&mut self, other: BabyStepTable) {
        self.capacity += other.capacity;
        for entry in other.entries {
            let key = hash_coeffs(&entry.a, &entry.b);
            if let Entry::Vacant(slot) = self.index.entry(key) {
                slot.insert(self.entries.len() as u32);
                self.entries.push(entry);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ideal(a: i64, b: i64, c: i64) -> Ideal {
        Ideal::new(BigInt::from(a), BigInt::from(b), BigInt::from(c))
    }

    #[test]
    fn test_insert_and_search() {
        let mut t = BabyStepTable::with_capacity(8);
        t.insert(&ideal(3, 13, -5), 1.25, 0, 0).unwrap();
        t.insert(&ideal(5, 13, -3), 2.5, 1, 0).unwrap();
        let hit = t.search(&ideal(3, 13, -5)).unwrap();
        assert_eq!(hit.distance, 1.25);
        assert_eq!(hit.baby_index, 0);
        assert!(t.search(&ideal(9, 11, -3)).is_none());
    }

    #[test]
    fn test_search_ignores_c_coefficient() {
        // Reduced ideals are determined by (a, b); c is derived.
        let mut t = BabyStepTable::with_capacity(4);
        t.insert(&ideal(3, 13, -5), 1.0, 0, 0).unwrap();
        assert!(t.search(&ideal(3, 13, 0)).is_some());
    }

    #[test]
    fn test_first_entry_wins_on_duplicate() {
        let mut t = BabyStepTable::with_capacity(4);
        t.insert(&ideal(3, 13, -5), 1.0, 0, 0).unwrap();
        t.insert(&ideal(3, 13, -5), 9.0, 7, 1).unwrap();
        assert_eq!(t.search(&ideal(3, 13, -5)).unwrap().distance, 1.0);
        assert_eq!(t.len(), 1);
    }

    #[test]
    fn test_capacity_enforced() {
        let mut t = BabyStepTable::with_capacity(1);
        t.insert(&ideal(3, 13, -5), 1.0, 0, 0).unwrap();
        assert!(matches!(
            t.insert(&ideal(5, 13, -3), 2.0, 1, 0),
            Err(InfraError::TableFull { capacity: 1 })
        ));
    }

    #[test]
    fn test_budget_sizing() {
        let entry = estimate_entry_size(64, false);
        let t = BabyStepTable::with_budget(entry * 100, 4, entry).unwrap();
        assert_eq!(t.capacity, 25);
        assert!(matches!(
            BabyStepTable::with_budget(entry - 1, 1, entry),
            Err(InfraError::MemoryBudgetExceeded { .. })
        ));
    }

    #[test]
    fn test_merge_keeps_all_distinct_entries() {
        let mut t1 = BabyStepTable::with_capacity(4);
        t1.insert(&ideal(3, 13, -5), 1.0, 0, 0).unwrap();
        let mut t2 = BabyStepTable::with_capacity(4);
        t2.insert(&ideal(3, 13, -5), 5.0, 3, 0).unwrap();
        t2.insert(&ideal(5, 13, -3), 2.0, 1, 0).unwrap();
        t1.merge(t2);
        assert_eq!(t1.len(), 2);
        assert_eq!(t1.search(&ideal(3, 13, -5)).unwrap().distance, 1.0);
        assert_eq!(t1.search(&ideal(5, 13, -3)).unwrap().distance, 2.0);
    }
}
