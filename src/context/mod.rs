/*!
 * Causal Context
 * The "currently active logical operation", captured and restored around
 * deferred continuations
 *
 * The engine never inspects a context beyond identity; consumers may walk
 * `parent()` for span parenting. Exactly one context is ambient at any
 * synchronous point per thread of control, managed with explicit
 * save/restore guards rather than implicit capture.
 */

use std::cell::RefCell;
use std::sync::Arc;
use uuid::Uuid;

thread_local! {
    static ACTIVE: RefCell<Option<Context>> = const { RefCell::new(None) };
}

/// Opaque, cheaply cloneable handle to a logical operation
#[derive(Debug, Clone)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug)]
struct ContextInner {
    id: Uuid,
    parent: Option<Context>,
}

impl Context {
    /// Create a root context with no parent
    pub fn new() -> Self {
        Self::child_of(None)
    }

    /// Create a context with an explicit parent
    pub fn child_of(parent: Option<Context>) -> Self {
        Self {
            inner: Arc::new(ContextInner {
                id: Uuid::new_v4(),
                parent,
            }),
        }
    }

    /// Create a fresh child of the ambient context (one per operation instance)
    pub fn begin() -> Self {
        Self::child_of(Self::current())
    }

    /// Unique identity of this context
    #[inline]
    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    /// The context this one was created under, if any
    pub fn parent(&self) -> Option<&Context> {
        self.inner.parent.as_ref()
    }

    /// The context ambient on this thread right now
    pub fn current() -> Option<Context> {
        ACTIVE.with(|active| active.borrow().clone())
    }

    /// Make this context ambient; the previous one is restored on guard drop
    #[must_use = "dropping the guard immediately restores the previous context"]
    pub fn enter(&self) -> ContextGuard {
        let prev = ACTIVE.with(|active| active.replace(Some(self.clone())));
        ContextGuard { prev }
    }

    /// Clear the ambient context, restoring it on guard drop
    #[must_use = "dropping the guard immediately restores the previous context"]
    pub fn suspend() -> ContextGuard {
        let prev = ACTIVE.with(|active| active.replace(None));
        ContextGuard { prev }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Context {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Context {}

/// Restores the previously ambient context when dropped
#[derive(Debug)]
pub struct ContextGuard {
    prev: Option<Context>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        let prev = self.prev.take();
        ACTIVE.with(|active| active.replace(prev));
    }
}

/// Re-enter a previously captured ambient state (including "no context")
#[must_use = "dropping the guard immediately restores the previous context"]
pub fn restore(captured: Option<&Context>) -> ContextGuard {
    match captured {
        Some(cx) => cx.enter(),
        None => Context::suspend(),
    }
}

/// Bind a continuation to the context ambient right now
///
/// When the returned closure eventually runs, it executes inside the
/// captured context no matter what is ambient at call time, and restores
/// the caller's ambient context afterward. A panic from `f` propagates
/// after restoration.
pub fn bind<F, R>(f: F) -> impl FnOnce() -> R
where
    F: FnOnce() -> R,
{
    let captured = Context::current();
    move || {
        let _scope = restore(captured.as_ref());
        f()
    }
}

/// Like [`bind`], for continuations taking one argument
pub fn bind_with<A, F, R>(f: F) -> impl FnOnce(A) -> R
where
    F: FnOnce(A) -> R,
{
    let captured = Context::current();
    move |arg| {
        let _scope = restore(captured.as_ref());
        f(arg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_ambient_context_by_default() {
        assert!(Context::current().is_none());
    }

    #[test]
    fn test_enter_restores_previous_on_drop() {
        let outer = Context::new();
        let _outer_guard = outer.enter();
        assert_eq!(Context::current(), Some(outer.clone()));

        {
            let inner = Context::begin();
            let _inner_guard = inner.enter();
            assert_eq!(Context::current(), Some(inner.clone()));
            assert_eq!(inner.parent(), Some(&outer));
        }

        assert_eq!(Context::current(), Some(outer));
    }

    #[test]
    fn test_suspend_clears_and_restores() {
        let cx = Context::new();
        let _guard = cx.enter();

        {
            let _cleared = Context::suspend();
            assert!(Context::current().is_none());
        }

        assert_eq!(Context::current(), Some(cx));
    }

    #[test]
    fn test_bind_observes_bind_time_context() {
        let bound_in = Context::new();
        let observed = {
            let _guard = bound_in.enter();
            bind(Context::current)
        };

        // A different operation is ambient when the continuation fires.
        let other = Context::new();
        let _other_guard = other.enter();
        assert_eq!(observed(), Some(bound_in));
        assert_eq!(Context::current(), Some(other));
    }

    #[test]
    fn test_bind_with_no_context_suspends_ambient() {
        let observed = bind(Context::current);

        let other = Context::new();
        let _guard = other.enter();
        assert_eq!(observed(), None);
    }

    #[test]
    fn test_bind_with_passes_argument_through() {
        let cx = Context::new();
        let f = {
            let _guard = cx.enter();
            bind_with(|n: u32| (n * 2, Context::current()))
        };

        let (doubled, seen) = f(21);
        assert_eq!(doubled, 42);
        assert_eq!(seen, Some(cx));
    }
}
