//! Hashing for the store's id-keyed collections.
//!
//! Every key the engine hashes is something it minted itself: component ids,
//! scheduler jobs, the address of a dependency list. None of them come from
//! outside the process, so the tables use foldhash under a constant seed and
//! carry no hasher state of their own.

use std::collections::HashMap;
use std::hash::BuildHasher;

use foldhash::fast::{FixedState, FoldHasher};
use indexmap::IndexSet;

const SEED: u64 = 0x2d35_8dcc_aa6c_78a5;

/// Stateless `BuildHasher` shared by all engine tables.
#[derive(Clone, Copy, Debug, Default)]
pub(crate) struct IdHasher;

impl BuildHasher for IdHasher {
    type Hasher = FoldHasher<'static>;

    #[inline]
    fn build_hasher(&self) -> Self::Hasher {
        FixedState::with_seed(SEED).build_hasher()
    }
}

/// Map keyed by engine-minted ids.
pub(crate) type IdMap<K, V> = HashMap<K, V, IdHasher>;

/// Insertion-ordered set of engine-minted ids.
pub(crate) type IdSet<T> = IndexSet<T, IdHasher>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::ComponentId;
    use crate::scheduler::Job;

    #[test]
    fn tables_carry_no_hasher_state() {
        assert_eq!(std::mem::size_of::<IdHasher>(), 0);
        let empty: IdSet<Job> = IdSet::default();
        assert!(empty.is_empty());
    }

    #[test]
    fn jobs_for_one_component_stay_distinct() {
        let component = ComponentId::from_raw(7);
        let mut jobs: IdSet<Job> = IdSet::default();
        jobs.insert(Job::Render(component));
        jobs.insert(Job::Effect { component, slot: 0 });
        jobs.insert(Job::Apply { component, slot: 0 });
        jobs.insert(Job::Render(component));

        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs.first(), Some(&Job::Render(component)));
        assert_eq!(IdHasher.hash_one(component), IdHasher.hash_one(component));
    }
}
