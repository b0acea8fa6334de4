//! Dependency lists and the comparator used by effects and memos.
//!
//! A [`Deps`] is an immutable, shared sequence of type-erased values. Two
//! lists are equal when they have the same length and every element compares
//! equal with its own `PartialEq`; elements of different types never compare
//! equal, so there is no coercion between e.g. `1_i32` and `1_i64`.
//!
//! Comparisons are memoized per flush in a [`DepsCache`] keyed by the
//! allocation of the newer list. The cache holds a clone of every list it
//! has seen, which pins the allocation so an address can never be recycled
//! for another list while its entry is alive. The engine evicts the cache at
//! the start of every flush and when the outermost render pass ends.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::hash::IdMap;

/// Object-safe equality for dependency values.
///
/// Implemented for every `PartialEq + Debug + Send + Sync + 'static` type.
pub trait DepValue: Any + Send + Sync + fmt::Debug {
    /// Compare against another dependency value of any type.
    fn dyn_eq(&self, other: &dyn DepValue) -> bool;

    /// Upcast for downcasting in [`DepValue::dyn_eq`].
    fn as_any(&self) -> &dyn Any;
}

impl<T> DepValue for T
where
    T: PartialEq + Send + Sync + fmt::Debug + 'static,
{
    fn dyn_eq(&self, other: &dyn DepValue) -> bool {
        other
            .as_any()
            .downcast_ref::<T>()
            .is_some_and(|other| self == other)
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// A single entry of a dependency list.
pub struct Dep(Box<dyn DepValue>);

impl Dep {
    /// Wrap a value as a dependency.
    pub fn new<T>(value: T) -> Self
    where
        T: PartialEq + Send + Sync + fmt::Debug + 'static,
    {
        Self(Box::new(value))
    }
}

impl PartialEq for Dep {
    fn eq(&self, other: &Self) -> bool {
        self.0.dyn_eq(other.0.as_ref())
    }
}

impl fmt::Debug for Dep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Shared, immutable dependency list.
///
/// Cloning is cheap and keeps the same allocation, which is what the
/// identity fast path of [`deps_changed`] looks at. Build one with the
/// [`deps!`](crate::deps!) macro.
#[derive(Clone)]
pub struct Deps(Arc<[Dep]>);

impl Deps {
    /// Build a list from already wrapped values.
    pub fn new(values: Vec<Dep>) -> Self {
        Self(Arc::from(values))
    }

    /// A fresh empty list ("run once, at mount").
    ///
    /// Every call allocates, so two empty lists are equal by content but
    /// never identical.
    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True for the empty list.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterate over the entries.
    pub fn iter(&self) -> std::slice::Iter<'_, Dep> {
        self.0.iter()
    }

    /// True when both handles share one allocation.
    pub fn ptr_eq(&self, other: &Deps) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    fn addr(&self) -> usize {
        Arc::as_ptr(&self.0) as *const Dep as usize
    }
}

impl fmt::Debug for Deps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.0.iter()).finish()
    }
}

/// Build a [`Deps`] list from expressions.
///
/// ```ignore
/// let deps = deps![count, name.clone()];
/// let once = deps![];
/// ```
#[macro_export]
macro_rules! deps {
    () => {
        $crate::Deps::empty()
    };
    ($($value:expr),+ $(,)?) => {
        $crate::Deps::new(vec![$($crate::Dep::new($value)),+])
    };
}

/// Report whether `next` differs from `prev`.
///
/// - absent on either side: changed
/// - same allocation: unchanged
/// - differing lengths: changed
/// - otherwise the first unequal element decides
pub fn deps_changed(prev: Option<&Deps>, next: Option<&Deps>) -> bool {
    let (Some(prev), Some(next)) = (prev, next) else {
        return true;
    };
    if prev.ptr_eq(next) {
        cov_mark::hit!(deps_identical_allocation);
        return false;
    }
    if prev.len() != next.len() {
        cov_mark::hit!(deps_length_mismatch);
        return true;
    }
    prev.iter().zip(next.iter()).any(|(a, b)| a != b)
}

struct CachedComparison {
    // Held only to pin both allocations while the entry lives.
    _next: Deps,
    prev: Option<Deps>,
    changed: bool,
}

/// Per-flush memo of comparison results, keyed by the newer list.
///
/// Entries are valid for one render-pass token; [`DepsCache::evict`] drops
/// all of them and advances the token.
#[derive(Default)]
pub(crate) struct DepsCache {
    token: u64,
    entries: IdMap<usize, CachedComparison>,
}

impl DepsCache {
    /// Compare through the cache.
    ///
    /// A cached result is only reused when it was computed against the same
    /// previous list; otherwise it is recomputed and replaced.
    pub(crate) fn compare(&mut self, prev: Option<&Deps>, next: Option<&Deps>) -> bool {
        let Some(next) = next else {
            return true;
        };
        let key = next.addr();
        if let Some(entry) = self.entries.get(&key) {
            let same_prev = match (&entry.prev, prev) {
                (Some(cached), Some(prev)) => cached.ptr_eq(prev),
                (None, None) => true,
                _ => false,
            };
            if same_prev {
                cov_mark::hit!(deps_cache_hit);
                return entry.changed;
            }
        }
        let changed = deps_changed(prev, Some(next));
        self.entries.insert(
            key,
            CachedComparison {
                _next: next.clone(),
                prev: prev.cloned(),
                changed,
            },
        );
        changed
    }

    /// Drop every entry and start a new render-pass token.
    pub(crate) fn evict(&mut self) {
        self.entries.clear();
        self.token = self.token.wrapping_add(1);
    }

    /// The current render-pass token.
    pub(crate) fn token(&self) -> u64 {
        self.token
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_lists_always_change() {
        assert!(deps_changed(None, None));
        assert!(deps_changed(Some(&deps![1]), None));
        assert!(deps_changed(None, Some(&deps![1])));
    }

    #[test]
    fn equal_content_is_unchanged() {
        assert!(!deps_changed(Some(&deps![1, 2]), Some(&deps![1, 2])));
        assert!(deps_changed(Some(&deps![1, 2]), Some(&deps![1, 3])));
    }

    #[test]
    fn fresh_empty_lists_compare_by_content() {
        let first = deps![];
        let second = deps![];
        assert!(!first.ptr_eq(&second));
        assert!(!deps_changed(Some(&first), Some(&second)));
    }

    #[test]
    fn same_allocation_takes_fast_path() {
        cov_mark::check!(deps_identical_allocation);
        let deps = deps![String::from("a"), 2_u8];
        assert!(!deps_changed(Some(&deps), Some(&deps.clone())));
    }

    #[test]
    fn length_mismatch_is_a_change() {
        cov_mark::check!(deps_length_mismatch);
        assert!(deps_changed(Some(&deps![1]), Some(&deps![1, 1])));
    }

    #[test]
    fn values_of_different_types_are_never_equal() {
        assert!(deps_changed(Some(&deps![1_i32]), Some(&deps![1_i64])));
        assert!(deps_changed(Some(&deps!["1"]), Some(&deps![String::from("1")])));
    }

    #[test]
    fn nan_is_not_equal_to_itself() {
        assert!(deps_changed(Some(&deps![f64::NAN]), Some(&deps![f64::NAN])));
    }

    #[test]
    fn cache_reuses_result_for_same_pair() {
        let mut cache = DepsCache::default();
        let prev = deps![1];
        let next = deps![2];
        assert!(cache.compare(Some(&prev), Some(&next)));
        {
            cov_mark::check!(deps_cache_hit);
            assert!(cache.compare(Some(&prev), Some(&next)));
        }
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn cache_recomputes_against_a_different_previous_list() {
        let mut cache = DepsCache::default();
        let next = deps![2];
        assert!(cache.compare(Some(&deps![1]), Some(&next)));
        assert!(!cache.compare(Some(&deps![2]), Some(&next)));
    }

    #[test]
    fn evict_clears_entries_and_advances_token() {
        let mut cache = DepsCache::default();
        cache.compare(Some(&deps![1]), Some(&deps![1]));
        let token = cache.token();
        cache.evict();
        assert_eq!(cache.len(), 0);
        assert_eq!(cache.token(), token + 1);
    }
}
