//! Active-context tracking for trace-parent resolution.
//!
//! [`Context`] is an immutable, linked set of key/value entries; deriving a
//! child context never mutates the parent. [`StackContextManager`] tracks the
//! currently-active context per thread of execution: pushes and pops are
//! paired by a drop guard, so the previous context is restored on every exit
//! path, including unwinding. Rust hosts run callers in parallel, so the
//! stack lives in a thread-local rather than a single process-wide cell; the
//! push/pop discipline for one logical operation never interleaves with
//! another thread's.

use crate::span::SpanContext;
use std::any::Any;
use std::cell::RefCell;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// A typed key into a [`Context`]. Keys compare by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContextKey {
    name: &'static str,
}

impl ContextKey {
    pub const fn new(name: &'static str) -> Self {
        Self { name }
    }
}

/// Key under which the active span's [`SpanContext`] is stored.
pub const ACTIVE_SPAN_KEY: ContextKey = ContextKey::new("minotel.active-span");

struct Entry {
    key: ContextKey,
    value: Arc<dyn Any + Send + Sync>,
    next: Option<Arc<Entry>>,
}

/// An immutable set of key/value entries representing a tracing context.
///
/// The default value is the root (empty) context.
#[derive(Clone, Default)]
pub struct Context {
    head: Option<Arc<Entry>>,
}

impl Context {
    /// The root context, carrying no entries.
    pub fn root() -> Self {
        Self::default()
    }

    /// Derives a child context with `key` bound to `value`. The receiver is
    /// left untouched; the newest binding for a key shadows older ones.
    pub fn with_value<T: Any + Send + Sync>(&self, key: ContextKey, value: T) -> Self {
        Self {
            head: Some(Arc::new(Entry {
                key,
                value: Arc::new(value),
                next: self.head.clone(),
            })),
        }
    }

    /// Looks up the newest binding for `key`.
    pub fn get<T: Any + Send + Sync>(&self, key: ContextKey) -> Option<&T> {
        let mut current = self.head.as_deref();
        while let Some(entry) = current {
            if entry.key == key {
                return entry.value.downcast_ref::<T>();
            }
            current = entry.next.as_deref();
        }
        None
    }

    /// Derives a child context carrying `span_context` as the active span.
    pub fn with_span_context(&self, span_context: SpanContext) -> Self {
        self.with_value(ACTIVE_SPAN_KEY, span_context)
    }

    /// The active span context, if one is set.
    pub fn span_context(&self) -> Option<&SpanContext> {
        self.get(ACTIVE_SPAN_KEY)
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("span_context", &self.span_context())
            .finish_non_exhaustive()
    }
}

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Context>> = const { RefCell::new(Vec::new()) };
}

/// Tracks the currently-active [`Context`] via a per-thread stack.
///
/// Cheap to clone; clones share the enabled flag. While disabled,
/// [`StackContextManager::run_with`] and [`StackContextManager::bind`] are
/// identity pass-throughs, so context propagation can be switched off
/// without special-casing call sites.
#[derive(Clone)]
pub struct StackContextManager {
    enabled: Arc<AtomicBool>,
}

impl StackContextManager {
    /// Creates a manager in the disabled state.
    pub fn new() -> Self {
        Self {
            enabled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn enable(&self) -> &Self {
        self.enabled.store(true, Ordering::Release);
        self
    }

    /// Disables the manager and clears the calling thread's stack.
    pub fn disable(&self) -> &Self {
        self.enabled.store(false, Ordering::Release);
        CONTEXT_STACK.with(|stack| stack.borrow_mut().clear());
        self
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Acquire)
    }

    /// The active context: top of the calling thread's stack, or the root
    /// context when the stack is empty.
    pub fn active(&self) -> Context {
        CONTEXT_STACK.with(|stack| stack.borrow().last().cloned().unwrap_or_default())
    }

    /// Runs `f` with `context` active, restoring the previous context on
    /// every exit path, normal return or unwind.
    pub fn run_with<T>(&self, context: Context, f: impl FnOnce() -> T) -> T {
        if !self.is_enabled() {
            return f();
        }

        CONTEXT_STACK.with(|stack| stack.borrow_mut().push(context));
        let _guard = PopGuard;
        f()
    }

    /// Wraps `f` so that each later invocation (possibly far from the
    /// current call stack) re-establishes `context` for exactly that
    /// invocation.
    pub fn bind<T, F>(&self, context: Context, mut f: F) -> impl FnMut() -> T
    where
        F: FnMut() -> T,
    {
        let manager = self.clone();
        move || manager.run_with(context.clone(), &mut f)
    }
}

impl Default for StackContextManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Pops the thread's context stack when dropped, unwinding included.
struct PopGuard;

impl Drop for PopGuard {
    fn drop(&mut self) {
        CONTEXT_STACK.with(|stack| {
            stack.borrow_mut().pop();
        });
    }
}
