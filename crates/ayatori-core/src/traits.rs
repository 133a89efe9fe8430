//! Optional per-state behaviour: guards and error handlers.

use crate::context::Context;
use crate::error::NodeFailure;

/// Predicate deciding whether a state's node runs.
///
/// A state without a guard always runs. Closures taking `&Context` and
/// returning `bool` implement this trait.
///
/// # Examples
///
/// ```
/// use ayatori_core::{Context, Guard};
///
/// struct HasOrder;
///
/// impl Guard for HasOrder {
///     fn check(&self, ctx: &Context) -> bool {
///         ctx.contains_key("order")
///     }
/// }
///
/// let ctx = Context::new().with("order", 7u32);
/// assert!(HasOrder.check(&ctx));
/// ```
pub trait Guard: Send + Sync {
    /// Returns `true` to run the state, `false` to bypass it.
    fn check(&self, ctx: &Context) -> bool;
}

impl<F> Guard for F
where
    F: Fn(&Context) -> bool + Send + Sync,
{
    fn check(&self, ctx: &Context) -> bool {
        self(ctx)
    }
}

/// Handler invoked when a state's node fails for good.
///
/// Runs once per state execution, after the retry policy is exhausted (or
/// straight away when the state has no retry policy).
pub trait ErrorHandler: Send + Sync {
    /// Reacts to the failure. The context is read-only.
    fn on_error(&self, ctx: &Context, failure: &NodeFailure);
}

impl<F> ErrorHandler for F
where
    F: Fn(&Context, &NodeFailure) + Send + Sync,
{
    fn on_error(&self, ctx: &Context, failure: &NodeFailure) {
        self(ctx, failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::Phase;
    use crate::phase::StateName;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn check_with(guard: &dyn Guard, ctx: &Context) -> bool {
        guard.check(ctx)
    }

    #[test]
    fn test_closure_guard() {
        let guard = |ctx: &Context| ctx.get::<bool>("enabled").copied().unwrap_or(false);

        assert!(!check_with(&guard, &Context::new()));
        assert!(check_with(&guard, &Context::new().with("enabled", true)));
    }

    #[test]
    fn test_closure_error_handler() {
        let calls = AtomicU32::new(0);
        let handler = |_ctx: &Context, failure: &NodeFailure| {
            assert_eq!(failure.attempts, 2);
            calls.fetch_add(1, Ordering::SeqCst);
        };

        let failure = NodeFailure {
            state: StateName::new("Fetch"),
            attempts: 2,
            errors: vec![(Phase::Action, "down".to_string())],
        };
        handler.on_error(&Context::new(), &failure);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
