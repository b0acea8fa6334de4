//! The hook API.
//!
//! Every hook is a method on [`Engine`](crate::Engine) and must be called
//! while a render pass is active, in the same order on every render of a
//! component. Each call claims the next slot of the active component; a
//! hook that finds a slot of another kind or type reports
//! [`HookError::SlotTypeMismatch`](crate::HookError::SlotTypeMismatch)
//! instead of misreading it.
//!
//! [`use_context`](crate::Engine::use_context) lives with the context
//! broadcast registry and claims no slot.

mod effect;
mod id;
mod memo;
mod reducer;
mod reference;
pub(crate) mod state;
mod transition;

pub use effect::IntoCleanup;
pub use reducer::Dispatch;
pub use reference::Ref;
pub use state::StateSetter;
pub use transition::StartTransition;
