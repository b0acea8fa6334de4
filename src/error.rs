//! Error type for hook calls and render bookkeeping.
//!
//! Only programmer-misuse conditions are values. Failures inside effects,
//! cleanups and update callbacks are caught at their boundary and reported
//! through `tracing`, so they never show up here.

use std::any::Any;

use crate::registry::ComponentId;

/// Result alias used by every hook entry point.
pub type Result<T, E = HookError> = std::result::Result<T, E>;

/// Conditions surfaced synchronously at the call site.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HookError {
    /// A hook was called while no component render was active.
    #[error("`{hook}` called outside of a component render")]
    OutsideContext {
        /// Name of the hook entry point that was called.
        hook: &'static str,
    },

    /// The active component has no instance in the registry.
    ///
    /// Only reachable when the registry is mutated behind a running render,
    /// e.g. `Engine::reset` or `Engine::unmount` from inside the component.
    #[error("component {0} has no registered instance")]
    ComponentDataMissing(ComponentId),

    /// A slot holds a value of a different type than the hook expects.
    ///
    /// This is what a changed hook call order looks like from the inside.
    #[error("slot {slot} of component {component} does not hold a `{expected}`")]
    SlotTypeMismatch {
        /// Component owning the slot.
        component: ComponentId,
        /// Slot index (hook cursor position).
        slot: usize,
        /// Type name the hook asked for.
        expected: &'static str,
    },

    /// A context token that was not created by this engine.
    #[error("unknown context token {0}")]
    UnknownContext(usize),
}

/// Extract a printable message from a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "<non-string panic payload>"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outside_context_names_the_hook() {
        let err = HookError::OutsideContext { hook: "use_state" };
        assert_eq!(
            err.to_string(),
            "`use_state` called outside of a component render"
        );
    }

    #[test]
    fn panic_message_handles_both_payload_kinds() {
        let payload = std::panic::catch_unwind(|| panic!("static message")).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload = std::panic::catch_unwind(|| panic!("formatted {}", 42)).unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "formatted 42");
    }
}
