//! Collision-free category allocation
//!
//! Containers that share a type are kept apart by their categories: a file
//! labeled `s0:c3,c4` is unreadable to a process running at `s0:c5,c6`. The
//! allocator is the only authority that hands out category pairs, so two
//! containers never end up behind the same isolation boundary by accident.
//!
//! Each category carries an owner count. A label replayed into a second
//! container adds an owner, and the category only returns to the pool once
//! every owner has released it.
//!
//! ```text
//! level "s0"  category:  0 1 2 3 4 5 6 7 ...
//!               owners:  2 2 1 1 0 0 0 0
//!                        └┬┘ └┬┘ └┬┘
//!                         │   │   └─ next reserve() returns c4,c5
//!                         │   └───── container C
//!                         └───────── container A and its duplicate B
//! ```
//!
//! State lives in memory only; a range that is never released stays taken
//! until the allocator is dropped.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use lazy_static::lazy_static;
use tracing::{debug, warn};

use super::context::{CategoryRange, SecurityContext, MAX_CATEGORY};
use super::error::{LabelError, Result};
use crate::metrics::{CATEGORIES_RESERVED, CATEGORY_EXHAUSTED};

/// Number of categories in the historical MCS universe (`c0.c1023`)
pub const DEFAULT_CATEGORY_UNIVERSE: u32 = MAX_CATEGORY;

lazy_static! {
    static ref GLOBAL_ALLOCATOR: Arc<CategoryAllocator> = Arc::new(CategoryAllocator::new());
}

/// Owner count per category for one sensitivity
struct Owners {
    counts: Vec<u16>,
}

impl Owners {
    fn new(size: u32) -> Self {
        Self {
            counts: vec![0; size as usize],
        }
    }

    fn is_free(&self, category: u32) -> bool {
        self.counts[category as usize] == 0
    }

    /// Add an owner; returns true if the category was free
    fn claim(&mut self, category: u32) -> bool {
        let count = &mut self.counts[category as usize];
        *count = count.saturating_add(1);
        *count == 1
    }

    /// Drop an owner; returns true if that was the last one
    fn release(&mut self, category: u32) -> bool {
        let count = &mut self.counts[category as usize];
        if *count == 0 {
            return false;
        }
        *count -= 1;
        *count == 0
    }

    fn held(&self) -> usize {
        self.counts.iter().filter(|&&c| c > 0).count()
    }
}

/// Process-wide pool of categories, one owner table per sensitivity
///
/// Share it with `Arc`; every method takes `&self`.
pub struct CategoryAllocator {
    universe: u32,
    levels: Mutex<HashMap<String, Owners>>,
}

impl CategoryAllocator {
    /// Allocator over the default 1024-category universe
    pub fn new() -> Self {
        Self::with_universe(DEFAULT_CATEGORY_UNIVERSE)
    }

    /// Allocator over categories `0..universe`
    pub fn with_universe(universe: u32) -> Self {
        Self {
            universe,
            levels: Mutex::new(HashMap::new()),
        }
    }

    /// Shared allocator for callers that want a single pool per process
    pub fn global() -> Arc<CategoryAllocator> {
        Arc::clone(&GLOBAL_ALLOCATOR)
    }

    pub fn universe(&self) -> u32 {
        self.universe
    }

    // Owner tables are only touched by code that cannot panic mid-update, so
    // a poisoned lock still guards consistent state.
    fn state(&self) -> MutexGuard<'_, HashMap<String, Owners>> {
        self.levels.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the two lowest free categories for `level`
    ///
    /// The scan and the marking happen under one lock acquisition, so
    /// concurrent callers always receive disjoint pairs. Only categories
    /// with no owner at all are eligible. On exhaustion nothing changes.
    pub fn reserve(&self, level: &str) -> Result<CategoryRange> {
        let mut levels = self.state();
        let universe = self.universe;
        let owners = levels
            .entry(level.to_string())
            .or_insert_with(|| Owners::new(universe));

        let free: Vec<u32> = (0..universe).filter(|&c| owners.is_free(c)).take(2).collect();
        if free.len() < 2 {
            drop(levels);
            CATEGORY_EXHAUSTED.with_label_values(&[level]).inc();
            warn!(level, universe, "category pool exhausted");
            return Err(LabelError::CategoryExhausted {
                level: level.to_string(),
            });
        }

        for &c in &free {
            owners.claim(c);
        }
        drop(levels);

        let range: CategoryRange = free.into_iter().collect();
        CATEGORIES_RESERVED.with_label_values(&[level]).add(2.0);
        debug!(level, categories = %range, "reserved categories");
        Ok(range)
    }

    /// Drop one owner from each category
    ///
    /// A category goes back to the pool when its last owner releases it.
    /// Already-free and out-of-universe categories are ignored.
    pub fn release(&self, level: &str, range: &CategoryRange) {
        let mut levels = self.state();
        let Some(owners) = levels.get_mut(level) else {
            return;
        };

        let cleared = range
            .iter()
            .filter(|&c| c < self.universe)
            .filter(|&c| owners.release(c))
            .count();
        drop(levels);

        if cleared > 0 {
            CATEGORIES_RESERVED.with_label_values(&[level]).sub(cleared as f64);
            debug!(level, categories = %range, "released categories");
        }
    }

    /// Record another owner for an already assigned range
    ///
    /// Owners are added whether or not the categories were free; this is
    /// bookkeeping for deliberately shared labels and never fails.
    pub fn duplicate(&self, level: &str, range: &CategoryRange) -> CategoryRange {
        let mut levels = self.state();
        let universe = self.universe;
        let owners = levels
            .entry(level.to_string())
            .or_insert_with(|| Owners::new(universe));

        let marked = range
            .iter()
            .filter(|&c| c < universe)
            .filter(|&c| owners.claim(c))
            .count();
        drop(levels);

        if marked > 0 {
            CATEGORIES_RESERVED.with_label_values(&[level]).add(marked as f64);
        }
        range.clone()
    }

    /// Mark the categories carried by a context as taken
    ///
    /// Only the low level of the range is tracked; contexts without
    /// categories there carry nothing to track.
    pub fn reserve_label(&self, context: &str) -> Result<()> {
        if let Some((level, range)) = Self::categories_of(context)? {
            self.duplicate(&level, &range);
        }
        Ok(())
    }

    /// Free the categories carried by a context
    pub fn release_label(&self, context: &str) -> Result<()> {
        if let Some((level, range)) = Self::categories_of(context)? {
            self.release(&level, &range);
        }
        Ok(())
    }

    fn categories_of(context: &str) -> Result<Option<(String, CategoryRange)>> {
        if context.is_empty() {
            return Ok(None);
        }
        let ctx: SecurityContext = context.parse()?;
        Ok(match ctx.mls_range() {
            Ok(Some(range)) if !range.low.categories.is_empty() => {
                Some((range.low.sensitivity, range.low.categories))
            }
            _ => None,
        })
    }

    /// Number of categories with at least one owner at `level`
    pub fn in_use(&self, level: &str) -> usize {
        self.state().get(level).map(Owners::held).unwrap_or(0)
    }
}

impl Default for CategoryAllocator {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_reserve_lowest_pair() {
        let alloc = CategoryAllocator::new();
        let first = alloc.reserve("s0").unwrap();
        let second = alloc.reserve("s0").unwrap();

        assert_eq!(first.iter().collect::<Vec<_>>(), vec![0, 1]);
        assert_eq!(second.iter().collect::<Vec<_>>(), vec![2, 3]);
        assert_eq!(alloc.in_use("s0"), 4);
    }

    #[test]
    fn test_levels_are_independent() {
        let alloc = CategoryAllocator::new();
        let a = alloc.reserve("s0").unwrap();
        let b = alloc.reserve("s1").unwrap();
        assert_eq!(a, b);
        assert_eq!(alloc.in_use("s0"), 2);
        assert_eq!(alloc.in_use("s1"), 2);
    }

    #[test]
    fn test_exhaustion_leaves_state_untouched() {
        let alloc = CategoryAllocator::with_universe(5);
        alloc.reserve("s0").unwrap();
        alloc.reserve("s0").unwrap();

        let err = alloc.reserve("s0").unwrap_err();
        assert!(matches!(err, LabelError::CategoryExhausted { ref level } if level == "s0"));
        assert_eq!(alloc.in_use("s0"), 4);
    }

    #[test]
    fn test_release_then_reserve_reuses() {
        let alloc = CategoryAllocator::new();
        let first = alloc.reserve("s0").unwrap();
        let _second = alloc.reserve("s0").unwrap();

        alloc.release("s0", &first);
        assert_eq!(alloc.reserve("s0").unwrap(), first);
    }

    #[test]
    fn test_release_is_idempotent_and_defensive() {
        let alloc = CategoryAllocator::with_universe(4);
        let range = alloc.reserve("s0").unwrap();

        alloc.release("s0", &range);
        alloc.release("s0", &range);
        alloc.release("s0", &[3000].into_iter().collect());
        alloc.release("s9", &range);
        assert_eq!(alloc.in_use("s0"), 0);
    }

    #[test]
    fn test_no_exhaustion_while_two_slots_free() {
        let alloc = CategoryAllocator::with_universe(6);
        let ranges: Vec<_> = (0..3).map(|_| alloc.reserve("s0").unwrap()).collect();
        assert!(alloc.reserve("s0").is_err());

        // Free one category from two different pairs: two slots, not adjacent.
        alloc.release("s0", &[1].into_iter().collect());
        alloc.release("s0", &[4].into_iter().collect());
        let reused = alloc.reserve("s0").unwrap();
        assert_eq!(reused.iter().collect::<Vec<_>>(), vec![1, 4]);
        assert_eq!(ranges.len(), 3);
    }

    #[test]
    fn test_duplicate_marks_without_failing() {
        let alloc = CategoryAllocator::new();
        let range: CategoryRange = [0, 1].into_iter().collect();

        assert_eq!(alloc.duplicate("s0", &range), range);
        assert_eq!(alloc.duplicate("s0", &range), range);
        assert_eq!(alloc.in_use("s0"), 2);

        // Reserve must skip the duplicated pair.
        let next = alloc.reserve("s0").unwrap();
        assert!(next.is_disjoint(&range));
    }

    #[test]
    fn test_shared_range_needs_every_owner_released() {
        let alloc = CategoryAllocator::new();
        let first = alloc.reserve("s0").unwrap();
        alloc.duplicate("s0", &first);

        alloc.release("s0", &first);
        assert_eq!(alloc.in_use("s0"), 2);
        let third = alloc.reserve("s0").unwrap();
        assert!(third.is_disjoint(&first));

        alloc.release("s0", &first);
        assert_eq!(alloc.in_use("s0"), 2);
        assert_eq!(alloc.reserve("s0").unwrap(), first);
    }

    #[test]
    fn test_low_level_of_span_is_tracked() {
        let alloc = CategoryAllocator::new();
        alloc.reserve_label("u:r:t:s0:c4,c5-s0:c0.c1023").unwrap();
        assert_eq!(alloc.in_use("s0"), 2);

        alloc.release_label("u:r:t:s0:c4,c5-s0:c0.c1023").unwrap();
        assert_eq!(alloc.in_use("s0"), 0);
    }

    #[test]
    fn test_reserve_and_release_label() {
        let alloc = CategoryAllocator::new();
        alloc
            .reserve_label("system_u:system_r:container_t:s0:c1,c15")
            .unwrap();
        assert_eq!(alloc.in_use("s0"), 2);

        alloc.reserve_label("system_u:system_r:container_t").unwrap();
        alloc.reserve_label("u:r:t:s0-s0:c0.c1023").unwrap();
        alloc.reserve_label("").unwrap();
        assert_eq!(alloc.in_use("s0"), 2);

        alloc
            .release_label("system_u:system_r:container_t:s0:c1,c15")
            .unwrap();
        assert_eq!(alloc.in_use("s0"), 0);

        assert!(alloc.reserve_label("garbage").is_err());
    }

    #[test]
    fn test_concurrent_reservations_are_disjoint() {
        let alloc = Arc::new(CategoryAllocator::new());

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                thread::spawn(move || {
                    (0..16)
                        .map(|_| alloc.reserve("s0").unwrap())
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let ranges: Vec<CategoryRange> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();

        assert_eq!(ranges.len(), 256);
        for (i, a) in ranges.iter().enumerate() {
            assert_eq!(a.len(), 2);
            for b in &ranges[i + 1..] {
                assert!(a.is_disjoint(b), "{} overlaps {}", a, b);
            }
        }
        assert_eq!(alloc.in_use("s0"), 512);
    }

    #[test]
    fn test_global_is_shared() {
        assert!(Arc::ptr_eq(&CategoryAllocator::global(), &CategoryAllocator::global()));
    }
}
