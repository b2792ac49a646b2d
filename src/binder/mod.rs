//! Fluent configuration front-end used inside modules.

use std::any::TypeId;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashMap;
use tracing::debug;

use crate::binding::Binding;
use crate::collection::{
    list_provider, map_provider, new_list_state, new_map_state, new_set_state, set_provider,
    CollectionSlot, ListBinder, MapBinder, SetBinder,
};
use crate::decoration::{decorator_spec, Decoration};
use crate::descriptors::{
    descriptor_provider, provider_factory_provider, provider_instance_provider, Injectable,
    InjectableInto,
};
use crate::error::{DiError, DiResult};
use crate::injector::{DynamicEntry, InjectionContext, InjectorOptions};
use crate::key::Key;
use crate::provider::{
    absent_provider, downcast_value, erase, instance_provider, AnyArc, ProviderFn, TypeProvider,
};
use crate::scope::{NoScope, Scope, ScopeEventListener, ShutdownHook, SingletonScope};

mod module;
pub use module::BinderModule;

#[derive(Clone, Copy, PartialEq)]
enum BindMode {
    Normal,
    Override,
    Optional,
}

/// Registration surface handed to each module during the first startup
/// phase.
///
/// Bindings take effect immediately; decorations are only collected here
/// and folded into their targets in a single pass after every module has
/// run, so a decoration can never race against a still-incoming binding.
/// Configuration errors (forbidden overrides, overrides without a target)
/// are recorded and surface when the injector is built.
pub struct Binder {
    pub(crate) bindings: AHashMap<Key, Binding>,
    pub(crate) decorations: AHashMap<Key, Decoration>,
    pub(crate) collections: AHashMap<Key, CollectionSlot>,
    pub(crate) dynamic_entries: AHashMap<TypeId, DynamicEntry>,
    pub(crate) errors: Vec<DiError>,
    pub(crate) options: InjectorOptions,
    pub(crate) singleton_scope: Arc<SingletonScope>,
    pub(crate) no_scope: Arc<NoScope>,
}

impl Binder {
    pub(crate) fn new(
        options: InjectorOptions,
        singleton_scope: Arc<SingletonScope>,
        no_scope: Arc<NoScope>,
    ) -> Self {
        Self {
            bindings: AHashMap::new(),
            decorations: AHashMap::new(),
            collections: AHashMap::new(),
            dynamic_entries: AHashMap::new(),
            errors: Vec::new(),
            options,
            singleton_scope,
            no_scope,
        }
    }

    /// Starts a binding for the unqualified key of `T`.
    pub fn bind<T: ?Sized + Send + Sync + 'static>(&mut self) -> BindingBuilder<'_, T> {
        BindingBuilder {
            binder: self,
            key: Key::of::<T>(),
            mode: BindMode::Normal,
            _marker: PhantomData,
        }
    }

    /// Starts a binding for a qualified key of `T`.
    pub fn bind_qualified<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        qualifier: &'static str,
    ) -> BindingBuilder<'_, T> {
        BindingBuilder {
            binder: self,
            key: Key::qualified::<T>(qualifier),
            mode: BindMode::Normal,
            _marker: PhantomData,
        }
    }

    /// Starts an override of an existing binding. Fails at build time when
    /// no prior binding exists for the key.
    pub fn override_bind<T: ?Sized + Send + Sync + 'static>(&mut self) -> BindingBuilder<'_, T> {
        self.override_key::<T>(Key::of::<T>())
    }

    /// Starts an override of an existing qualified binding.
    pub fn override_qualified<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        qualifier: &'static str,
    ) -> BindingBuilder<'_, T> {
        self.override_key::<T>(Key::qualified::<T>(qualifier))
    }

    fn override_key<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        key: Key,
    ) -> BindingBuilder<'_, T> {
        BindingBuilder {
            binder: self,
            key,
            mode: BindMode::Override,
            _marker: PhantomData,
        }
    }

    /// Declares an optional binding of `T`: it resolves to "absent" until a
    /// later module supplies an implementation, and re-registering it is
    /// always permitted.
    pub fn bind_optional<T: ?Sized + Send + Sync + 'static>(&mut self) -> BindingBuilder<'_, T> {
        self.bind_optional_key::<T>(Key::of::<T>())
    }

    /// Declares a qualified optional binding of `T`.
    pub fn bind_optional_qualified<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        qualifier: &'static str,
    ) -> BindingBuilder<'_, T> {
        self.bind_optional_key::<T>(Key::qualified::<T>(qualifier))
    }

    fn bind_optional_key<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        key: Key,
    ) -> BindingBuilder<'_, T> {
        if !self.bindings.contains_key(&key) {
            let binding = Binding::new(&key, absent_provider(), self.no_scope.clone(), true);
            debug!(key = %key, "registered optional placeholder binding");
            self.bindings.insert(key.clone(), binding);
        }
        BindingBuilder {
            binder: self,
            key,
            mode: BindMode::Optional,
            _marker: PhantomData,
        }
    }

    /// Opens (or continues) the list binding whose elements are `T`.
    pub fn bind_list<T: ?Sized + Send + Sync + 'static>(&mut self) -> ListBinder<T> {
        let key = Key::list_of::<T>();
        if let Some(CollectionSlot::List(state)) = self.collections.get(&key) {
            return ListBinder::new(state.clone());
        }
        let state = new_list_state();
        self.install_collection(key, list_provider::<T>(state.clone()));
        self.collections
            .insert(Key::list_of::<T>(), CollectionSlot::List(state.clone()));
        ListBinder::new(state)
    }

    /// Opens (or continues) the set binding whose elements are `T`.
    pub fn bind_set<T>(&mut self) -> SetBinder<T>
    where
        T: ?Sized + Send + Sync + PartialEq + fmt::Debug + 'static,
    {
        let key = Key::set_of::<T>();
        if let Some(CollectionSlot::Set(state)) = self.collections.get(&key) {
            return SetBinder::new(state.clone());
        }
        let state = new_set_state();
        self.install_collection(key, set_provider::<T>(state.clone()));
        self.collections
            .insert(Key::set_of::<T>(), CollectionSlot::Set(state.clone()));
        SetBinder::new(state)
    }

    /// Opens (or continues) the map binding with keys `K` and values `V`.
    pub fn bind_map<K, V>(&mut self) -> MapBinder<K, V>
    where
        K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
        V: ?Sized + Send + Sync + 'static,
    {
        let key = Key::map_of::<K, V>();
        if let Some(CollectionSlot::Map(state)) = self.collections.get(&key) {
            return MapBinder::new(state.clone());
        }
        let state = new_map_state();
        self.install_collection(key, map_provider::<K, V>(state.clone()));
        self.collections
            .insert(Key::map_of::<K, V>(), CollectionSlot::Map(state.clone()));
        MapBinder::new(state)
    }

    /// Starts a decoration of the binding of `T`. The target binding does
    /// not have to exist yet; the chain is folded in after all modules ran.
    pub fn decorate<T: ?Sized + Send + Sync + 'static>(&mut self) -> DecorateBuilder<'_, T> {
        DecorateBuilder {
            binder: self,
            key: Key::of::<T>(),
            _marker: PhantomData,
        }
    }

    /// Starts a decoration of a qualified binding of `T`.
    pub fn decorate_qualified<T: ?Sized + Send + Sync + 'static>(
        &mut self,
        qualifier: &'static str,
    ) -> DecorateBuilder<'_, T> {
        DecorateBuilder {
            binder: self,
            key: Key::qualified::<T>(qualifier),
            _marker: PhantomData,
        }
    }

    /// Registers `I` for dynamic binding synthesis: an unbound key of type
    /// `I` can then be resolved as if `bind::<I>().to::<I>()` had been
    /// declared, provided the injector enables dynamic bindings.
    pub fn register_injectable<I: Injectable>(&mut self) -> &mut Self {
        let prefers_singleton = I::descriptor().prefers_singleton();
        self.dynamic_entries.insert(
            TypeId::of::<I>(),
            DynamicEntry {
                provider: descriptor_provider::<I, I>(),
                prefers_singleton,
            },
        );
        self
    }

    fn install_collection(&mut self, key: Key, provider: ProviderFn) {
        if self.bindings.contains_key(&key) {
            self.errors.push(DiError::Configuration(format!(
                "{} is already bound and cannot become a collection binding",
                key
            )));
            return;
        }
        let provider = self.apply_hook(&key, provider);
        // Collection bindings are never scope-cached: the ordering graph is
        // re-read on every resolution so late edges take effect.
        let binding = Binding::new(&key, provider, self.no_scope.clone(), false);
        debug!(key = %key, "registered collection binding");
        self.bindings.insert(key, binding);
    }

    fn apply_hook(&self, key: &Key, provider: ProviderFn) -> ProviderFn {
        match &self.options.provider_hook {
            Some(hook) => hook(key, provider),
            None => provider,
        }
    }

    fn default_scope(&self, prefers_singleton: bool) -> Arc<dyn Scope> {
        if prefers_singleton || self.options.singleton_default {
            self.singleton_scope.clone()
        } else {
            self.no_scope.clone()
        }
    }

    fn set_binding(
        &mut self,
        key: &Key,
        provider: ProviderFn,
        mode: BindMode,
        prefers_singleton: bool,
    ) -> bool {
        let provider = self.apply_hook(key, provider);
        let (exists, existing_optional) = match self.bindings.get(key) {
            Some(binding) => (true, binding.is_optional()),
            None => (false, false),
        };

        match (exists, mode) {
            (true, BindMode::Normal)
                if !existing_optional && self.options.declared_overrides_only =>
            {
                self.errors.push(DiError::Configuration(format!(
                    "{} is already bound; overrides are restricted to declared override bindings",
                    key
                )));
                return false;
            }
            (false, BindMode::Override) => {
                self.errors.push(DiError::Configuration(format!(
                    "override declared for {} but no prior binding exists",
                    key
                )));
                return false;
            }
            _ => {}
        }

        let optional = existing_optional || mode == BindMode::Optional;
        let scope = self.default_scope(prefers_singleton);
        let binding = Binding::new(key, provider, scope, optional);
        debug!(key = %key, optional, "registered binding");
        self.bindings.insert(key.clone(), binding);
        true
    }
}

/// Builder returned by [`Binder::bind`] and friends: picks what the key
/// resolves to.
pub struct BindingBuilder<'b, T: ?Sized + Send + Sync + 'static> {
    binder: &'b mut Binder,
    key: Key,
    mode: BindMode,
    _marker: PhantomData<fn() -> T>,
}

impl<'b, T: ?Sized + Send + Sync + 'static> BindingBuilder<'b, T> {
    /// Binds to an injectable implementation, constructed through its
    /// descriptor on demand.
    pub fn to<Impl: InjectableInto<T>>(self) -> BoundBuilder<'b, T> {
        let prefers_singleton = Impl::descriptor().prefers_singleton();
        self.binder.register_injectable::<Impl>();
        self.finish(descriptor_provider::<T, Impl>(), prefers_singleton)
    }

    /// Binds to a fixed, pre-built instance.
    pub fn to_instance(self, value: Arc<T>) -> BoundBuilder<'b, T> {
        self.finish(instance_provider(value), false)
    }

    /// Binds to a factory closure invoked through the resolution context.
    pub fn to_factory<F>(self, factory: F) -> BoundBuilder<'b, T>
    where
        F: Fn(&InjectionContext<'_>) -> DiResult<Arc<T>> + Send + Sync + 'static,
    {
        let provider: ProviderFn =
            Arc::new(move |ctx: &InjectionContext<'_>| Ok(erase(factory(ctx)?)));
        self.finish(provider, false)
    }

    /// Binds to a provider type: the factory object is itself injected,
    /// then asked for a value on every request. Scoping the factory's own
    /// binding caches the factory, never its product.
    pub fn to_provider<P>(self) -> BoundBuilder<'b, T>
    where
        P: TypeProvider<Out = T> + Injectable,
    {
        self.binder.register_injectable::<P>();
        self.finish(provider_factory_provider::<T, P>(), false)
    }

    /// Binds to a caller-supplied provider instance, invoked on every
    /// request.
    pub fn to_provider_instance<P>(self, factory: Arc<P>) -> BoundBuilder<'b, T>
    where
        P: TypeProvider<Out = T>,
    {
        self.finish(provider_instance_provider::<T, P>(factory), false)
    }

    fn finish(self, provider: ProviderFn, prefers_singleton: bool) -> BoundBuilder<'b, T> {
        let active = self
            .binder
            .set_binding(&self.key, provider, self.mode, prefers_singleton);
        BoundBuilder {
            binder: self.binder,
            key: self.key,
            active,
            _marker: PhantomData,
        }
    }
}

/// Builder stage after the target is chosen: scope selection and lifecycle
/// opt-in.
pub struct BoundBuilder<'b, T: ?Sized + Send + Sync + 'static> {
    binder: &'b mut Binder,
    key: Key,
    active: bool,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized + Send + Sync + 'static> BoundBuilder<'_, T> {
    /// Caches one instance for the lifetime of the injector (until
    /// shutdown).
    pub fn in_singleton_scope(self) -> Self {
        let scope = self.binder.singleton_scope.clone();
        self.change_scope(scope)
    }

    /// Re-invokes the provider on every request.
    pub fn without_scope(self) -> Self {
        let scope = self.binder.no_scope.clone();
        self.change_scope(scope)
    }

    /// Wraps the binding's provider with a custom scope strategy.
    pub fn in_scope(self, scope: Arc<dyn Scope>) -> Self {
        self.change_scope(scope)
    }

    /// Opts the binding into the singleton scope's before-scope-end
    /// broadcast. Only instances actually constructed and cached receive
    /// the event, exactly once per instance.
    pub fn on_shutdown(self) -> Self
    where
        T: ScopeEventListener,
    {
        if self.active {
            let hook: ShutdownHook = Arc::new(|value: &AnyArc| {
                if let Ok(instance) = downcast_value::<T>(value.clone()) {
                    instance.before_scope_end();
                }
            });
            if let Some(binding) = self.binder.bindings.get_mut(&self.key) {
                binding.set_shutdown_hook(&self.key, hook);
            }
        }
        self
    }

    fn change_scope(self, scope: Arc<dyn Scope>) -> Self {
        if self.active {
            if let Some(binding) = self.binder.bindings.get_mut(&self.key) {
                binding.change_scope(&self.key, scope);
            }
        }
        self
    }
}

/// Builder for the decoration chain of one key.
pub struct DecorateBuilder<'b, T: ?Sized + Send + Sync + 'static> {
    binder: &'b mut Binder,
    key: Key,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized + Send + Sync + 'static> DecorateBuilder<'_, T> {
    /// Adds a decorator on the caller side of the chain. Before decorators
    /// apply in declaration order, first-declared outermost.
    pub fn before<D: InjectableInto<T>>(&mut self) -> &mut Self {
        self.binder
            .decorations
            .entry(self.key.clone())
            .or_default()
            .push_before(decorator_spec::<T, D>());
        self
    }

    /// Adds a decorator wrapped outside the before chain.
    pub fn after<D: InjectableInto<T>>(&mut self) -> &mut Self {
        self.binder
            .decorations
            .entry(self.key.clone())
            .or_default()
            .push_after(decorator_spec::<T, D>());
        self
    }
}
