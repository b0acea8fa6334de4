// Component registry - per-instance hook slot storage
//
// Every mounted component owns one ComponentInstance. Slots of every hook
// kind are addressed by the same cursor, so each per-kind vector is sparse:
// a state hook at cursor 3 lives in `states[3]` while `effects[3]` stays
// None. Keeping the kinds apart lets unmount walk the effect records in
// slot order without touching anything else.
//
// Values are type-erased (`Box<dyn Any + Send>`) and downcast by the hook
// that owns the slot. The registry itself never runs user code.

use std::any::Any;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::deps::Deps;
use crate::hash::IdMap;

/// Opaque, stable identity of one component instance.
///
/// Ids from [`ComponentId::new`] come from a process-wide counter and are
/// never handed out twice. Hosts that keep their own numbering can use
/// [`ComponentId::from_raw`] and are then responsible for uniqueness.
#[repr(transparent)]
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug)]
pub struct ComponentId(u64);

impl ComponentId {
    /// Allocate a fresh, process-unique id.
    pub fn new() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Wrap a host-provided number.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// The underlying number.
    pub const fn as_raw(self) -> u64 {
        self.0
    }
}

impl Default for ComponentId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Callback the host registers to have a component re-rendered.
pub type UpdateCallback = Arc<dyn Fn() + Send + Sync>;

/// Cleanup returned by an effect.
pub type Cleanup = Box<dyn FnOnce() + Send>;

/// An effect body waiting for its flush.
pub(crate) type EffectFn = Box<dyn FnOnce() -> Option<Cleanup> + Send>;

/// A deferred write parked on a state slot; returns true if it changed the value.
pub(crate) type ParkedWrite = Box<dyn FnOnce(&mut Box<dyn Any + Send>) -> bool + Send>;

pub(crate) struct StateSlot {
    pub(crate) value: Box<dyn Any + Send>,
    /// Bumped on every committed write.
    pub(crate) version: u64,
    pub(crate) parked: Option<ParkedWrite>,
}

impl StateSlot {
    pub(crate) fn new(value: Box<dyn Any + Send>) -> Self {
        Self {
            value,
            version: 0,
            parked: None,
        }
    }
}

pub(crate) struct EffectRecord {
    pub(crate) deps: Option<Deps>,
    pub(crate) cleanup: Option<Cleanup>,
    pub(crate) pending: Option<EffectFn>,
    pub(crate) layout: bool,
}

pub(crate) struct MemoSlot {
    pub(crate) value: Box<dyn Any + Send>,
    pub(crate) deps: Option<Deps>,
}

/// Storage for one logical component occurrence.
pub(crate) struct ComponentInstance {
    pub(crate) id: ComponentId,
    pub(crate) states: Vec<Option<StateSlot>>,
    pub(crate) effects: Vec<Option<EffectRecord>>,
    pub(crate) memos: Vec<Option<MemoSlot>>,
    pub(crate) refs: Vec<Option<Box<dyn Any + Send>>>,
    pub(crate) callback: Option<UpdateCallback>,
    pub(crate) mounted: bool,
    pub(crate) needs_update: bool,
    pub(crate) update_scheduled: bool,
    pub(crate) render_count: u64,
    pub(crate) hook_count: usize,
}

impl ComponentInstance {
    fn new(id: ComponentId) -> Self {
        Self {
            id,
            states: Vec::new(),
            effects: Vec::new(),
            memos: Vec::new(),
            refs: Vec::new(),
            callback: None,
            mounted: false,
            needs_update: false,
            update_scheduled: false,
            render_count: 0,
            hook_count: 0,
        }
    }

    /// Take every stored cleanup, in slot order.
    pub(crate) fn take_cleanups(&mut self) -> Vec<(usize, Cleanup)> {
        self.effects
            .iter_mut()
            .enumerate()
            .filter_map(|(slot, record)| {
                let cleanup = record.as_mut()?.cleanup.take()?;
                Some((slot, cleanup))
            })
            .collect()
    }
}

/// Get the cell for `index`, growing the vector with empty cells if needed.
pub(crate) fn slot_cell<T>(cells: &mut Vec<Option<T>>, index: usize) -> &mut Option<T> {
    if cells.len() <= index {
        cells.resize_with(index + 1, || None);
    }
    &mut cells[index]
}

/// Mapping from component id to its hook storage.
#[derive(Default)]
pub(crate) struct Registry {
    instances: IdMap<ComponentId, ComponentInstance>,
}

impl Registry {
    pub(crate) fn get(&self, id: ComponentId) -> Option<&ComponentInstance> {
        self.instances.get(&id)
    }

    pub(crate) fn get_mut(&mut self, id: ComponentId) -> Option<&mut ComponentInstance> {
        self.instances.get_mut(&id)
    }

    /// Reuse the instance for `id` or create it. Returns true if it was created.
    pub(crate) fn get_or_create(&mut self, id: ComponentId) -> (&mut ComponentInstance, bool) {
        let mut created = false;
        let instance = self.instances.entry(id).or_insert_with(|| {
            created = true;
            ComponentInstance::new(id)
        });
        (instance, created)
    }

    pub(crate) fn remove(&mut self, id: ComponentId) -> Option<ComponentInstance> {
        self.instances.remove(&id)
    }

    pub(crate) fn contains(&self, id: ComponentId) -> bool {
        self.instances.contains_key(&id)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &ComponentInstance> {
        self.instances.values()
    }

    pub(crate) fn len(&self) -> usize {
        self.instances.len()
    }

    pub(crate) fn take(&mut self) -> IdMap<ComponentId, ComponentInstance> {
        std::mem::take(&mut self.instances)
    }
}
