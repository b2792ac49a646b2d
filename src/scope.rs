//! Scope strategies: caching policies wrapped around binding providers.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::injector::InjectionContext;
use crate::key::Key;
use crate::provider::{is_absent, AnyArc, ProviderFn};

/// Callback invoked with a cached instance just before its scope ends.
pub type ShutdownHook = Arc<dyn Fn(&AnyArc) + Send + Sync>;

/// A caching policy for one binding's provider.
///
/// Scope objects are shared across many bindings; `scope` is called once
/// per binding and returns the provider actually stored on it.
pub trait Scope: Send + Sync + 'static {
    /// Wraps a provider with this scope's caching behavior.
    fn scope(&self, key: &Key, provider: ProviderFn) -> ProviderFn;

    /// Like [`scope`](Scope::scope), additionally attaching a shutdown
    /// listener for instances constructed under this scope. Scopes without
    /// a lifecycle ignore the hook.
    fn scope_with_listener(
        &self,
        key: &Key,
        provider: ProviderFn,
        hook: Option<ShutdownHook>,
    ) -> ProviderFn {
        let _ = hook;
        self.scope(key, provider)
    }
}

struct SingletonCell {
    key: Key,
    slot: Mutex<Option<AnyArc>>,
    hook: Option<ShutdownHook>,
}

/// Singleton scope: each wrapped binding caches exactly one instance.
///
/// The first caller constructs and publishes the instance while holding the
/// cell's lock; concurrent callers block on the lock and reuse the
/// published value, so duplicate construction is never observable.
///
/// [`shutdown`](SingletonScope::shutdown) broadcasts a before-scope-end
/// event once to every cached instance whose binding registered a listener,
/// then clears every cell so subsequent requests construct anew.
pub struct SingletonScope {
    cells: Mutex<Vec<Arc<SingletonCell>>>,
}

impl SingletonScope {
    pub(crate) fn new() -> Self {
        Self {
            cells: Mutex::new(Vec::new()),
        }
    }

    /// Broadcasts the before-scope-end event and clears all cached
    /// instances.
    pub(crate) fn shutdown(&self) {
        let cells: Vec<Arc<SingletonCell>> = self.cells.lock().iter().cloned().collect();
        for cell in cells {
            // Taking the value makes the broadcast exactly-once per
            // instance even if shutdown is called twice.
            let taken = cell.slot.lock().take();
            if let (Some(value), Some(hook)) = (taken.as_ref(), cell.hook.as_ref()) {
                if !is_absent(value) {
                    debug!(key = %cell.key, "notifying scope-end listener");
                    hook(value);
                }
            }
        }
    }
}

impl Scope for SingletonScope {
    fn scope(&self, key: &Key, provider: ProviderFn) -> ProviderFn {
        self.scope_with_listener(key, provider, None)
    }

    fn scope_with_listener(
        &self,
        key: &Key,
        provider: ProviderFn,
        hook: Option<ShutdownHook>,
    ) -> ProviderFn {
        let cell = Arc::new(SingletonCell {
            key: key.clone(),
            slot: Mutex::new(None),
            hook,
        });
        self.cells.lock().push(cell.clone());

        Arc::new(move |ctx: &InjectionContext<'_>| {
            let mut slot = cell.slot.lock();
            if let Some(value) = slot.as_ref() {
                return Ok(value.clone());
            }
            let value = provider(ctx)?;
            *slot = Some(value.clone());
            Ok(value)
        })
    }
}

/// No-scope: the identity wrap. Every request re-invokes the underlying
/// provider.
pub struct NoScope;

impl Scope for NoScope {
    fn scope(&self, _key: &Key, provider: ProviderFn) -> ProviderFn {
        provider
    }
}

/// Capability trait for services interested in the singleton scope's
/// before-scope-end event.
///
/// Implementing the trait alone is not enough; the binding must opt in with
/// `on_shutdown`, which keeps the broadcast capability-based rather than a
/// blanket sweep over every cached instance.
pub trait ScopeEventListener: Send + Sync {
    fn before_scope_end(&self);
}
