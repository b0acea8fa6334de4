//! Introspection snapshots for debugging and dev tools.

use crate::engine::Engine;
use crate::registry::{ComponentId, ComponentInstance};

/// Point-in-time view of one component instance.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ComponentStats {
    /// Instance id.
    pub id: ComponentId,
    /// True once the first render pass has finished.
    pub mounted: bool,
    /// Set by an update request, cleared when the flush handles it.
    pub needs_update: bool,
    /// True while a render job for this instance is queued.
    pub update_scheduled: bool,
    /// True if an update callback is registered.
    pub has_update_callback: bool,
    /// Completed render passes.
    pub render_count: u64,
    /// Hook slots claimed by the last completed render.
    pub hook_count: usize,
    /// Filled state slots (state, reducer, transition, deferred value, id).
    pub state_slots: usize,
    /// Filled effect slots.
    pub effect_slots: usize,
    /// Effect slots owned by `use_layout_effect`.
    pub layout_effects: usize,
    /// Filled memo slots.
    pub memo_slots: usize,
    /// Filled ref slots.
    pub ref_slots: usize,
    /// Passive effects waiting for a flush.
    pub pending_effects: usize,
    /// Cleanups that will run on re-run or unmount.
    pub stored_cleanups: usize,
    /// Contexts the instance is subscribed to.
    pub context_subscriptions: usize,
}

fn filled<T>(cells: &[Option<T>]) -> usize {
    cells.iter().filter(|cell| cell.is_some()).count()
}

impl ComponentStats {
    fn collect(instance: &ComponentInstance, context_subscriptions: usize) -> Self {
        let records = instance.effects.iter().flatten();
        Self {
            id: instance.id,
            mounted: instance.mounted,
            needs_update: instance.needs_update,
            update_scheduled: instance.update_scheduled,
            has_update_callback: instance.callback.is_some(),
            render_count: instance.render_count,
            hook_count: instance.hook_count,
            state_slots: filled(&instance.states),
            effect_slots: filled(&instance.effects),
            layout_effects: records.clone().filter(|r| r.layout).count(),
            memo_slots: filled(&instance.memos),
            ref_slots: filled(&instance.refs),
            pending_effects: records.clone().filter(|r| r.pending.is_some()).count(),
            stored_cleanups: records.filter(|r| r.cleanup.is_some()).count(),
            context_subscriptions,
        }
    }
}

impl Engine {
    /// Snapshot of one instance, or None if `id` is not registered.
    pub fn stats(&self, id: ComponentId) -> Option<ComponentStats> {
        let store = self.store();
        let instance = store.registry.get(id)?;
        Some(ComponentStats::collect(
            instance,
            store.broadcast.subscriptions_of(id),
        ))
    }

    /// Snapshots of every instance, ordered by id.
    pub fn all_stats(&self) -> Vec<ComponentStats> {
        let store = self.store();
        let mut stats: Vec<_> = store
            .registry
            .iter()
            .map(|instance| {
                ComponentStats::collect(instance, store.broadcast.subscriptions_of(instance.id))
            })
            .collect();
        stats.sort_by_key(|stats| stats.id);
        stats
    }
}
