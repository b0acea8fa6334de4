//! Context broadcast: values that reach subscribers regardless of tree shape.
//!
//! A context is created once and identified by a typed [`ContextToken`].
//! Components subscribe by reading it with
//! [`use_context`](crate::Engine::use_context) during a render; a provider
//! that changes the value schedules exactly the subscribed components.
//! Nothing else is notified.
//!
//! Subscriptions are tied to the component instance and are revoked when it
//! unmounts.

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use slab::Slab;

use crate::engine::Engine;
use crate::error::{HookError, Result};
use crate::hash::IdSet;
use crate::registry::ComponentId;

/// Typed handle to one context value in one engine.
///
/// Tokens remember the engine that created them; any other engine rejects
/// them with [`HookError::UnknownContext`].
pub struct ContextToken<T> {
    engine: u64,
    key: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T> ContextToken<T> {
    /// Raw slot key, for diagnostics.
    pub fn key(&self) -> usize {
        self.key
    }
}

impl<T> Clone for ContextToken<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextToken<T> {}

impl<T> fmt::Debug for ContextToken<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextToken")
            .field("engine", &self.engine)
            .field("key", &self.key)
            .finish()
    }
}

struct ContextEntry {
    value: Box<dyn Any + Send>,
    subscribers: IdSet<ComponentId>,
}

#[derive(Default)]
pub(crate) struct Broadcast {
    entries: Slab<ContextEntry>,
}

impl Broadcast {
    fn insert(&mut self, value: Box<dyn Any + Send>) -> usize {
        self.entries.insert(ContextEntry {
            value,
            subscribers: IdSet::default(),
        })
    }

    fn entry_mut(&mut self, key: usize) -> Result<&mut ContextEntry> {
        self.entries
            .get_mut(key)
            .ok_or(HookError::UnknownContext(key))
    }

    /// Remove `id` from every subscriber set. Returns how many sets it was in.
    pub(crate) fn unsubscribe_all(&mut self, id: ComponentId) -> usize {
        self.entries
            .iter_mut()
            .map(|(_, entry)| entry.subscribers.shift_remove(&id))
            .filter(|&removed| removed)
            .count()
    }

    /// Number of contexts `id` is subscribed to.
    pub(crate) fn subscriptions_of(&self, id: ComponentId) -> usize {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.subscribers.contains(&id))
            .count()
    }

    pub(crate) fn clear_subscribers(&mut self) {
        for (_, entry) in self.entries.iter_mut() {
            entry.subscribers.clear();
        }
    }
}

fn read_value<T: Clone + 'static>(entry: &ContextEntry, key: usize) -> Result<T> {
    entry
        .value
        .downcast_ref::<T>()
        .cloned()
        .ok_or(HookError::UnknownContext(key))
}

impl Engine {
    /// Create a context holding `default`.
    pub fn create_context<T: Send + 'static>(&self, default: T) -> ContextToken<T> {
        let key = self.store().broadcast.insert(Box::new(default));
        ContextToken {
            engine: self.inner.id,
            key,
            _marker: PhantomData,
        }
    }

    fn own_token<T>(&self, token: &ContextToken<T>) -> Result<usize> {
        if token.engine != self.inner.id {
            cov_mark::hit!(foreign_context_token);
            return Err(HookError::UnknownContext(token.key));
        }
        Ok(token.key)
    }

    /// Read the context value and subscribe the rendering component to it.
    ///
    /// Subscribing twice is a no-op. Does not consume a hook slot.
    pub fn use_context<T: Clone + Send + 'static>(&self, token: &ContextToken<T>) -> Result<T> {
        let key = self.own_token(token)?;
        let id = self.require_component("use_context")?;
        let mut store = self.store();
        let entry = store.broadcast.entry_mut(key)?;
        entry.subscribers.insert(id);
        read_value(entry, key)
    }

    /// Read the context value without subscribing.
    pub fn context_value<T: Clone + Send + 'static>(&self, token: &ContextToken<T>) -> Result<T> {
        let key = self.own_token(token)?;
        let mut store = self.store();
        let entry = store.broadcast.entry_mut(key)?;
        read_value(entry, key)
    }

    /// Provide a new value.
    ///
    /// If it differs from the current one, every subscriber is scheduled at
    /// the update priority before this returns, and the new value is what
    /// they and any component rendered afterwards read. Returns the number
    /// of components scheduled.
    pub fn provide<T>(&self, token: &ContextToken<T>, value: T) -> Result<usize>
    where
        T: Clone + PartialEq + Send + 'static,
    {
        let previous: T = self.context_value(token)?;
        if previous == value {
            return Ok(0);
        }
        let subscribers: Vec<ComponentId> = {
            let mut store = self.store();
            let entry = store.broadcast.entry_mut(self.own_token(token)?)?;
            entry.value = Box::new(value);
            entry.subscribers.iter().copied().collect()
        };
        let priority = self.update_priority();
        let notified = subscribers
            .into_iter()
            .filter(|&id| self.schedule_update(id, priority))
            .count();
        tracing::trace!(context = token.key, notified, "context value changed");
        Ok(notified)
    }

    /// Number of components subscribed to `token`.
    pub fn subscriber_count<T>(&self, token: &ContextToken<T>) -> Result<usize> {
        let key = self.own_token(token)?;
        let mut store = self.store();
        Ok(store.broadcast.entry_mut(key)?.subscribers.len())
    }
}
