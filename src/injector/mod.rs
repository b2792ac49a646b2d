//! The injector: binding storage, resolution, and lifecycle orchestration.

use std::any::TypeId;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use tracing::debug;

use crate::binder::{Binder, BinderModule};
use crate::binding::Binding;
use crate::descriptors::{inject_fields, inject_methods, Injectable};
use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::provider::{downcast_value, is_absent, ProviderFn, ProviderRef};
use crate::scope::{NoScope, Scope, SingletonScope};

mod context;
pub use context::InjectionContext;
pub(crate) use context::Site;

/// Hook wrapping every registered provider, for cross-cutting
/// instrumentation (timing, logging, counting).
pub type ProviderHook = Arc<dyn Fn(&Key, ProviderFn) -> ProviderFn + Send + Sync>;

/// Policy flags frozen into the injector at build time.
#[derive(Clone, Default)]
pub(crate) struct InjectorOptions {
    pub(crate) dynamic_bindings: bool,
    pub(crate) declared_overrides_only: bool,
    pub(crate) singleton_default: bool,
    pub(crate) method_injection: bool,
    pub(crate) capture_trace: bool,
    pub(crate) provider_hook: Option<ProviderHook>,
}

/// A type registered for dynamic binding synthesis.
#[derive(Clone)]
pub(crate) struct DynamicEntry {
    pub(crate) provider: ProviderFn,
    pub(crate) prefers_singleton: bool,
}

type ModuleFn = Box<dyn FnOnce(&mut Binder) -> DiResult<()>>;

/// Two-phase injector construction: collects modules and policy flags,
/// runs every module's bindings, then applies all decorations in one pass
/// and freezes the result.
///
/// # Examples
///
/// ```rust
/// use bindery::{Binder, InjectorBuilder};
/// use std::sync::Arc;
///
/// let injector = InjectorBuilder::new()
///     .module(|binder: &mut Binder| {
///         binder.bind::<String>().to_instance(Arc::new("hi".to_string()));
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(*injector.get_instance::<String>().unwrap(), "hi");
/// ```
pub struct InjectorBuilder {
    options: InjectorOptions,
    modules: Vec<ModuleFn>,
}

impl Default for InjectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl InjectorBuilder {
    pub fn new() -> Self {
        Self {
            options: InjectorOptions::default(),
            modules: Vec::new(),
        }
    }

    /// Adds a configuration module; modules run in registration order.
    pub fn module<M: BinderModule + 'static>(mut self, module: M) -> Self {
        self.modules
            .push(Box::new(move |binder: &mut Binder| module.configure(binder)));
        self
    }

    /// Registers `I` for dynamic binding synthesis without binding it.
    pub fn injectable<I: Injectable>(mut self) -> Self {
        self.modules.push(Box::new(|binder: &mut Binder| {
            binder.register_injectable::<I>();
            Ok(())
        }));
        self
    }

    /// Allows unbound keys to be synthesized from registered injectable
    /// types, using the key's own type as the implementation.
    pub fn enable_dynamic_bindings(mut self) -> Self {
        self.options.dynamic_bindings = true;
        self
    }

    /// Forbids silently re-binding an existing non-optional key; only
    /// `override_bind` may replace it.
    pub fn declared_overrides_only(mut self) -> Self {
        self.options.declared_overrides_only = true;
        self
    }

    /// Bindings without an explicit scope selector default to singleton
    /// scope instead of no-scope.
    pub fn singleton_by_default(mut self) -> Self {
        self.options.singleton_default = true;
        self
    }

    /// Enables the method-injection stage of descriptors (off by default).
    pub fn enable_method_injection(mut self) -> Self {
        self.options.method_injection = true;
        self
    }

    /// Captures a human-readable injection trace on failing resolutions.
    pub fn capture_trace(mut self) -> Self {
        self.options.capture_trace = true;
        self
    }

    /// Installs a hook wrapping every registered provider.
    pub fn wrap_providers(mut self, hook: ProviderHook) -> Self {
        self.options.provider_hook = Some(hook);
        self
    }

    /// Runs all modules, applies collected decorations, and freezes the
    /// injector. The first configuration error recorded by any module
    /// aborts the build.
    pub fn build(self) -> DiResult<Injector> {
        let singleton_scope = Arc::new(SingletonScope::new());
        let no_scope = Arc::new(NoScope);
        let mut binder = Binder::new(
            self.options.clone(),
            singleton_scope.clone(),
            no_scope.clone(),
        );

        for module in self.modules {
            module(&mut binder)?;
        }

        let Binder {
            mut bindings,
            decorations,
            collections: _,
            dynamic_entries,
            errors,
            ..
        } = binder;

        // Phase two: fold decoration chains into their targets, each
        // exactly once. A decoration whose target never materialized is
        // inert.
        for (key, decoration) in &decorations {
            if let Some(binding) = bindings.get_mut(key) {
                debug!(key = %key, "applying decoration chain");
                binding.decorate(key, decoration);
            }
        }

        if let Some(error) = errors.into_iter().next() {
            return Err(error);
        }

        Ok(Injector {
            inner: Arc::new(InjectorInner {
                bindings,
                dynamic: RwLock::new(AHashMap::new()),
                dynamic_entries,
                options: self.options,
                singleton_scope,
            }),
        })
    }
}

struct InjectorInner {
    bindings: AHashMap<Key, Binding>,
    /// Bindings synthesized after startup for unbound keys. The main map
    /// stays frozen; only this side map takes post-startup writes.
    dynamic: RwLock<AHashMap<Key, Binding>>,
    dynamic_entries: AHashMap<TypeId, DynamicEntry>,
    options: InjectorOptions,
    singleton_scope: Arc<SingletonScope>,
}

/// The frozen registry and resolution engine. Cheap to clone; all clones
/// share the same bindings and singleton scope.
///
/// After startup, resolution is safe under unbounded concurrent callers.
/// The only blocking operation is first construction of a singleton, a
/// short critical section guarding cache population.
pub struct Injector {
    inner: Arc<InjectorInner>,
}

impl Clone for Injector {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl Injector {
    /// Resolves the unqualified binding of `T`.
    pub fn get_instance<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.resolve_typed::<T>(&Key::of::<T>())
    }

    /// Resolves a qualified binding of `T`.
    pub fn get_qualified_instance<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &'static str,
    ) -> DiResult<Arc<T>> {
        self.resolve_typed::<T>(&Key::qualified::<T>(qualifier))
    }

    /// Resolves `T` by explicit key.
    pub fn get_instance_key<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &Key,
    ) -> DiResult<Arc<T>> {
        self.resolve_typed::<T>(key)
    }

    /// Resolves `T` if a binding exists and supplies a value. An optional
    /// binding that was never completed, or a missing binding, yields
    /// `Ok(None)`.
    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        let ctx = InjectionContext::new(self);
        match ctx.resolve_if_bound(&Key::of::<T>(), Site::Requested) {
            Ok(Some(value)) => downcast_value::<T>(value).map(Some),
            Ok(None) => Ok(None),
            Err(error) => Err(error.with_trace(ctx.take_trace())),
        }
    }

    /// Returns a deferred handle to the binding of `T` without resolving
    /// it. Fails immediately when the key is neither bound nor dynamically
    /// synthesizable.
    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<ProviderRef<T>> {
        self.provider_ref::<T>(Key::of::<T>())
    }

    /// Deferred handle for a qualified binding of `T`.
    pub fn get_qualified_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &'static str,
    ) -> DiResult<ProviderRef<T>> {
        self.provider_ref::<T>(Key::qualified::<T>(qualifier))
    }

    /// Whether `T`'s unqualified key can be resolved.
    pub fn has_provider<T: ?Sized + Send + Sync + 'static>(&self) -> bool {
        self.has_provider_key(&Key::of::<T>())
    }

    /// Whether `key` can be resolved: bound, already synthesized, or
    /// synthesizable through dynamic bindings.
    pub fn has_provider_key(&self, key: &Key) -> bool {
        self.inner.bindings.contains_key(key)
            || self.inner.dynamic.read().contains_key(key)
            || (self.inner.options.dynamic_bindings
                && self.inner.dynamic_entries.contains_key(&key.type_id()))
    }

    /// Every key bound for the type `T`, across all qualifiers.
    pub fn get_keys_by_type<T: ?Sized + 'static>(&self) -> Vec<Key> {
        let type_id = TypeId::of::<T>();
        let mut keys: Vec<Key> = self
            .inner
            .bindings
            .keys()
            .filter(|k| k.type_id() == type_id)
            .cloned()
            .collect();
        keys.extend(
            self.inner
                .dynamic
                .read()
                .keys()
                .filter(|k| k.type_id() == type_id)
                .cloned(),
        );
        keys
    }

    /// Performs field (and, when enabled, method) injection on an
    /// externally constructed object. Constructor injection never runs
    /// here.
    pub fn inject_members<T: Injectable>(&self, target: &mut T) -> DiResult<()> {
        let descriptor = T::descriptor();
        let ctx = InjectionContext::new(self);
        let result = inject_fields(&descriptor, &ctx, target, None).and_then(|_| {
            if self.inner.options.method_injection {
                inject_methods(&descriptor, &ctx, target, None)
            } else {
                Ok(())
            }
        });
        result.map_err(|error| error.with_trace(ctx.take_trace()))
    }

    /// Broadcasts the before-scope-end event to interested singleton
    /// instances and clears the singleton caches; subsequent requests
    /// construct fresh instances.
    pub fn shutdown(&self) {
        debug!("shutting down singleton scope");
        self.inner.singleton_scope.shutdown();
    }

    // ----- crate-internal resolution plumbing -----

    pub(crate) fn resolve_typed<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: &Key,
    ) -> DiResult<Arc<T>> {
        let ctx = InjectionContext::new(self);
        let result = ctx.resolve(key, Site::Requested).and_then(|value| {
            if is_absent(&value) {
                Err(DiError::Absent(format!("{}", key)))
            } else {
                downcast_value::<T>(value)
            }
        });
        result.map_err(|error| error.with_trace(ctx.take_trace()))
    }

    pub(crate) fn provider_ref<T: ?Sized + Send + Sync + 'static>(
        &self,
        key: Key,
    ) -> DiResult<ProviderRef<T>> {
        if !self.has_provider_key(&key) {
            return Err(DiError::NotFound(format!("{}", key)));
        }
        Ok(ProviderRef::bound(self.clone(), key))
    }

    /// The scoped provider for `key`, synthesizing a dynamic binding when
    /// allowed.
    pub(crate) fn provider_for(&self, key: &Key) -> DiResult<ProviderFn> {
        if let Some(binding) = self.inner.bindings.get(key) {
            return Ok(binding.scoped());
        }
        if let Some(binding) = self.inner.dynamic.read().get(key) {
            return Ok(binding.scoped());
        }
        if !self.inner.options.dynamic_bindings {
            return Err(DiError::NotFound(format!("{}", key)));
        }
        let entry = self
            .inner
            .dynamic_entries
            .get(&key.type_id())
            .ok_or_else(|| DiError::NotFound(format!("{}", key)))?;

        let mut dynamic = self.inner.dynamic.write();
        if let Some(binding) = dynamic.get(key) {
            return Ok(binding.scoped());
        }
        let provider = match &self.inner.options.provider_hook {
            Some(hook) => hook(key, entry.provider.clone()),
            None => entry.provider.clone(),
        };
        let scope: Arc<dyn Scope> =
            if entry.prefers_singleton || self.inner.options.singleton_default {
                self.inner.singleton_scope.clone()
            } else {
                Arc::new(NoScope)
            };
        debug!(key = %key, "synthesized dynamic binding");
        let binding = Binding::new(key, provider, scope, false);
        let scoped = binding.scoped();
        dynamic.insert(key.clone(), binding);
        Ok(scoped)
    }

    pub(crate) fn capture_trace(&self) -> bool {
        self.inner.options.capture_trace
    }

    pub(crate) fn method_injection_enabled(&self) -> bool {
        self.inner.options.method_injection
    }
}
