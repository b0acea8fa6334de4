#![deny(missing_docs)]

//! Stateful hooks and prioritized update scheduling for component trees.
//!
//! A host (a UI renderer, a TUI, a simulation) calls plain component
//! functions. This crate gives those functions persistent per-instance
//! state, effects with cleanup, memoization, refs, reducers and context
//! subscriptions, and batches the re-renders they request by priority.
//!
//! # Quick Start
//!
//! ```ignore
//! use slotted::{ComponentId, Engine, ManualExecutor, deps};
//!
//! let executor = ManualExecutor::new();
//! let engine = Engine::new(executor.clone());
//! let counter = ComponentId::new();
//!
//! let render = |engine: &Engine| {
//!     engine.render(counter, rerender_counter, || {
//!         let (count, set_count) = engine.use_state(|| 0)?;
//!         engine.use_effect(Some(deps![count]), move || {
//!             println!("count is {count}");
//!         })?;
//!         Ok::<_, slotted::HookError>((count, set_count))
//!     })
//! };
//!
//! let (_, set_count) = render(&engine)?;
//! set_count.update(|c| c + 1);  // schedules one re-render at Normal priority
//! set_count.update(|c| c + 1);  // collapses into the same one
//! executor.run_until_idle();    // rerender_counter runs once
//! ```
//!
//! # Core Types
//!
//! - [`Engine`] - Registry, context stack and scheduler behind one handle.
//! - [`ComponentId`] - Stable identity of a component instance.
//! - [`Priority`] - Update ranks, from `Immediate` to `Idle`.
//! - [`Executor`] - Where the engine arms its flushes. [`ManualExecutor`]
//!   is the host-driven implementation.
//! - [`Deps`] - Dependency list for effects and memos, built with [`deps!`].
//!
//! # Render passes
//!
//! ```ignore
//! engine.enter(id, callback);   // make `id` the active component
//! engine.use_state(|| 0)?;      // hooks address the active component's slots
//! engine.exit();                // resume the component that was rendering before
//!
//! engine.render(id, callback, || { ... });  // same, panic safe
//! ```
//!
//! Nested renders are allowed: entering a child suspends the parent with its
//! hook cursor, and exiting the child resumes it.
//!
//! # Hooks
//!
//! ```ignore
//! let (value, set) = engine.use_state(|| 0)?;
//! engine.use_effect(Some(deps![value]), || Some(|| cleanup()))?;
//! engine.use_layout_effect(None, || measure())?;
//! let doubled = engine.use_memo(|| value * 2, Some(deps![value]))?;
//! let on_click = engine.use_callback(move || set.set(1), Some(deps![]))?;
//! let timer = engine.use_ref(|| None::<u64>)?;
//! let (state, dispatch) = engine.use_reducer(reducer, State::default())?;
//! let theme = engine.use_context(&theme_token)?;
//! let (pending, start) = engine.use_transition()?;
//! let query = engine.use_deferred_value(input)?;
//! let label_id = engine.use_id()?;
//! ```
//!
//! # Scheduling
//!
//! ```ignore
//! engine.schedule_update(id, Priority::High);
//! engine.start_transition(|| set_results.set(results));  // lands at Low
//! engine.flush();             // drain every rank now, highest first
//! engine.force_update_all();  // re-render every mounted instance
//! ```

// Internal modules
mod broadcast;
mod context_stack;
mod deps;
mod engine;
mod error;
mod executor;
mod hash;
mod hooks;
mod registry;
mod scheduler;
mod stats;

// Core types
pub use engine::{Engine, EngineBuilder, EngineConfig, RenderGuard};
pub use registry::{Cleanup, ComponentId, UpdateCallback};
pub use scheduler::Priority;

// Hooks
pub use broadcast::ContextToken;
pub use context_stack::ContextFrame;
pub use deps::{Dep, DepValue, Deps, deps_changed};
pub use hooks::{Dispatch, IntoCleanup, Ref, StartTransition, StateSetter};

// Errors and introspection
pub use error::{HookError, Result};
pub use stats::ComponentStats;

// Executor integration (for custom event loops)
pub use executor::{Executor, ManualExecutor, PendingTasks, Task};

#[cfg(test)]
mod tests;
