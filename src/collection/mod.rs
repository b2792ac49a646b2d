//! Collection bindings: graph-ordered lists, deduplicated sets, merged maps.
//!
//! Each collection key owns a shared contribution state. The first
//! `bind_list`/`bind_set`/`bind_map` for a key registers the binding (so an
//! empty collection still resolves) and creates the state; later builders
//! for the same key continue the same state, which is how several modules
//! contribute elements and ordering constraints incrementally.
//!
//! Assembly happens on every resolution: contribution states are read under
//! a short lock, the lock is dropped, and element providers run through the
//! normal resolution path.

use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::Mutex;

use crate::descriptors::{descriptor_provider, InjectableInto};
use crate::error::{DiError, DiResult};
use crate::injector::{InjectionContext, Site};
use crate::key::{DiMap, DiSet, Key};
use crate::provider::{downcast_value, erase, is_absent, AnyArc, ProviderFn};

mod graph;
use graph::OrderingGraph;

/// Shared contribution state for one list binding.
pub(crate) struct ListState {
    inner: Mutex<ListInner>,
}

struct ListInner {
    providers: AHashMap<Key, ProviderFn>,
    graph: OrderingGraph,
    anon: usize,
}

impl ListState {
    fn new() -> Self {
        Self {
            inner: Mutex::new(ListInner {
                providers: AHashMap::new(),
                graph: OrderingGraph::new(),
                anon: 0,
            }),
        }
    }
}

/// Shared contribution state for one set binding.
pub(crate) struct SetState {
    inner: Mutex<SetInner>,
}

struct SetInner {
    elements: Vec<(Key, ProviderFn)>,
    anon: usize,
}

impl SetState {
    fn new() -> Self {
        Self {
            inner: Mutex::new(SetInner {
                elements: Vec::new(),
                anon: 0,
            }),
        }
    }
}

/// Shared contribution state for one map binding. Entries keep contribution
/// order; assembly into a map makes the last write win for equal keys.
pub(crate) struct MapState {
    entries: Mutex<Vec<(AnyArc, ProviderFn)>>,
}

impl MapState {
    fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

/// Contribution state held by the binder, so a later `bind_*` call for the
/// same key continues where the previous module left off.
pub(crate) enum CollectionSlot {
    List(Arc<ListState>),
    Set(Arc<SetState>),
    Map(Arc<MapState>),
}

// ----- Assembly providers -----

pub(crate) fn list_provider<T: ?Sized + Send + Sync + 'static>(
    state: Arc<ListState>,
) -> ProviderFn {
    Arc::new(move |ctx: &InjectionContext<'_>| {
        let ordered: Vec<(Key, ProviderFn)> = {
            let inner = state.inner.lock();
            let order = inner.graph.sorted().map_err(|unresolved| {
                DiError::OrderingCycle(
                    unresolved.iter().map(|k| format!("{}", k)).collect(),
                )
            })?;
            let mut out = Vec::with_capacity(order.len());
            for key in order {
                let provider = inner.providers.get(&key).cloned().ok_or_else(|| {
                    DiError::Configuration(format!(
                        "list element {} appears in ordering constraints but was never contributed",
                        key
                    ))
                })?;
                out.push((key, provider));
            }
            out
        };

        let mut items: Vec<Arc<T>> = Vec::with_capacity(ordered.len());
        for (key, provider) in ordered {
            let value = invoke_element(ctx, &key, &provider)?;
            items.push(downcast_value::<T>(value)?);
        }
        Ok(erase(Arc::new(items)))
    })
}

pub(crate) fn set_provider<T>(state: Arc<SetState>) -> ProviderFn
where
    T: ?Sized + Send + Sync + PartialEq + fmt::Debug + 'static,
{
    Arc::new(move |ctx: &InjectionContext<'_>| {
        let elements: Vec<(Key, ProviderFn)> = state.inner.lock().elements.clone();

        let mut items: Vec<Arc<T>> = Vec::with_capacity(elements.len());
        for (key, provider) in elements {
            let value = invoke_element(ctx, &key, &provider)?;
            let item = downcast_value::<T>(value)?;
            if items.iter().any(|existing| **existing == *item) {
                return Err(DiError::DuplicateElement(format!("{:?}", item)));
            }
            items.push(item);
        }
        Ok(erase(Arc::new(DiSet::from_items(items))))
    })
}

pub(crate) fn map_provider<K, V>(state: Arc<MapState>) -> ProviderFn
where
    K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
    V: ?Sized + Send + Sync + 'static,
{
    let collection = Key::map_of::<K, V>().display_name();
    Arc::new(move |ctx: &InjectionContext<'_>| {
        let entries: Vec<(AnyArc, ProviderFn)> = state.entries.lock().clone();

        let mut map: DiMap<K, V> = DiMap::with_capacity(entries.len());
        for (erased_key, provider) in entries {
            let map_key = erased_key
                .downcast::<K>()
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<K>()))?;
            let value = provider(ctx)?;
            if is_absent(&value) {
                return Err(DiError::Absent(collection.to_string()));
            }
            map.insert((*map_key).clone(), downcast_value::<V>(value)?);
        }
        Ok(erase(Arc::new(map)))
    })
}

fn invoke_element(
    ctx: &InjectionContext<'_>,
    key: &Key,
    provider: &ProviderFn,
) -> DiResult<AnyArc> {
    let value = provider(ctx)?;
    if is_absent(&value) {
        return Err(DiError::Absent(format!("{}", key)));
    }
    Ok(value)
}

// ----- Typed contribution builders -----

/// Contributor handle for a list binding of `T`.
///
/// Elements are identified by keys: a type contributed with [`add`] is
/// keyed by its own type, instances get synthesized keys (or explicit ones
/// via [`add_named_instance`]), and ordering constraints reference those
/// keys. Constraints are monotonic; they accumulate across modules and are
/// never removed.
///
/// [`add`]: ListBinder::add
/// [`add_named_instance`]: ListBinder::add_named_instance
pub struct ListBinder<T: ?Sized> {
    state: Arc<ListState>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized + Send + Sync + 'static> ListBinder<T> {
    pub(crate) fn new(state: Arc<ListState>) -> Self {
        Self {
            state,
            _marker: PhantomData,
        }
    }

    /// Contributes an injectable element keyed by its implementation type.
    pub fn add<E: InjectableInto<T>>(&mut self) -> &mut Self {
        self.put(Key::of::<E>(), descriptor_provider::<T, E>());
        self
    }

    /// Contributes a pre-built element under a synthesized key.
    pub fn add_instance(&mut self, value: Arc<T>) -> &mut Self {
        let key = self.anon_key();
        self.put(key, crate::provider::instance_provider(value));
        self
    }

    /// Contributes a pre-built element under an explicit name, so ordering
    /// constraints can reference it via `Key::qualified::<T>(name)`.
    pub fn add_named_instance(
        &mut self,
        name: &'static str,
        value: Arc<T>,
    ) -> &mut Self {
        self.put(
            Key::qualified::<T>(name),
            crate::provider::instance_provider(value),
        );
        self
    }

    /// Contributes an element resolved through an existing binding of `T`.
    pub fn add_key(&mut self, key: Key) -> &mut Self {
        let target = key.clone();
        let collection = Key::list_of::<T>().display_name();
        let provider: ProviderFn = Arc::new(move |ctx: &InjectionContext<'_>| {
            ctx.resolve(&target, Site::Element { collection })
        });
        self.put(key, provider);
        self
    }

    /// Contributes several pre-built elements.
    pub fn add_all(&mut self, values: impl IntoIterator<Item = Arc<T>>) -> &mut Self {
        for value in values {
            self.add_instance(value);
        }
        self
    }

    /// Contributes several pre-built elements, each constrained to appear
    /// after the element identified by `anchor`.
    pub fn add_all_after(
        &mut self,
        values: impl IntoIterator<Item = Arc<T>>,
        anchor: &Key,
    ) -> &mut Self {
        for value in values {
            self.add_instance_after(value, anchor);
        }
        self
    }

    /// Contributes several pre-built elements, each constrained to appear
    /// before the element identified by `anchor`.
    pub fn insert_all_before(
        &mut self,
        values: impl IntoIterator<Item = Arc<T>>,
        anchor: &Key,
    ) -> &mut Self {
        for value in values {
            self.insert_instance_before(value, anchor);
        }
        self
    }

    /// Contributes `E` constrained to appear after `Anchor`.
    pub fn add_after<E, Anchor>(&mut self) -> &mut Self
    where
        E: InjectableInto<T>,
        Anchor: ?Sized + 'static,
    {
        self.add::<E>();
        self.order(Key::of::<Anchor>(), Key::of::<E>())
    }

    /// Contributes `E` constrained to appear before `Anchor`.
    pub fn insert_before<E, Anchor>(&mut self) -> &mut Self
    where
        E: InjectableInto<T>,
        Anchor: ?Sized + 'static,
    {
        self.add::<E>();
        self.order(Key::of::<E>(), Key::of::<Anchor>())
    }

    /// Contributes a pre-built element constrained to appear after the
    /// element identified by `anchor`.
    pub fn add_instance_after(&mut self, value: Arc<T>, anchor: &Key) -> &mut Self {
        let key = self.anon_key();
        self.put(key.clone(), crate::provider::instance_provider(value));
        self.order(anchor.clone(), key)
    }

    /// Contributes a pre-built element constrained to appear before the
    /// element identified by `anchor`.
    pub fn insert_instance_before(&mut self, value: Arc<T>, anchor: &Key) -> &mut Self {
        let key = self.anon_key();
        self.put(key.clone(), crate::provider::instance_provider(value));
        self.order(key, anchor.clone())
    }

    /// Declares a raw ordering edge: the element keyed `before` must appear
    /// before the element keyed `after`. Both sides must be contributed by
    /// the time the list resolves.
    pub fn order(&mut self, before: Key, after: Key) -> &mut Self {
        self.state.inner.lock().graph.add_edge(before, after);
        self
    }

    fn put(&mut self, key: Key, provider: ProviderFn) {
        let mut inner = self.state.inner.lock();
        inner.graph.add_node(key.clone());
        inner.providers.insert(key, provider);
    }

    fn anon_key(&mut self) -> Key {
        let mut inner = self.state.inner.lock();
        inner.anon += 1;
        Key::qualified::<T>(format!("element#{}", inner.anon))
    }
}

/// Contributor handle for a set binding of `T`.
pub struct SetBinder<T: ?Sized> {
    state: Arc<SetState>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> SetBinder<T>
where
    T: ?Sized + Send + Sync + PartialEq + fmt::Debug + 'static,
{
    pub(crate) fn new(state: Arc<SetState>) -> Self {
        Self {
            state,
            _marker: PhantomData,
        }
    }

    /// Contributes an injectable element.
    pub fn add<E: InjectableInto<T>>(&mut self) -> &mut Self {
        let provider = descriptor_provider::<T, E>();
        self.state
            .inner
            .lock()
            .elements
            .push((Key::of::<E>(), provider));
        self
    }

    /// Contributes a pre-built element.
    pub fn add_instance(&mut self, value: Arc<T>) -> &mut Self {
        let mut inner = self.state.inner.lock();
        inner.anon += 1;
        let key = Key::qualified::<T>(format!("element#{}", inner.anon));
        inner
            .elements
            .push((key, crate::provider::instance_provider(value)));
        drop(inner);
        self
    }

    /// Contributes several pre-built elements.
    pub fn add_all(&mut self, values: impl IntoIterator<Item = Arc<T>>) -> &mut Self {
        for value in values {
            self.add_instance(value);
        }
        self
    }

    /// Contributes an element resolved through an existing binding of `T`.
    pub fn add_key(&mut self, key: Key) -> &mut Self {
        let target = key.clone();
        let collection = Key::set_of::<T>().display_name();
        let provider: ProviderFn = Arc::new(move |ctx: &InjectionContext<'_>| {
            ctx.resolve(&target, Site::Element { collection })
        });
        self.state.inner.lock().elements.push((key, provider));
        self
    }
}

/// Contributor handle for a map binding with keys `K` and values `V`.
pub struct MapBinder<K, V: ?Sized> {
    state: Arc<MapState>,
    _marker: PhantomData<fn() -> (K, Arc<V>)>,
}

impl<K, V> MapBinder<K, V>
where
    K: Eq + std::hash::Hash + Clone + Send + Sync + 'static,
    V: ?Sized + Send + Sync + 'static,
{
    pub(crate) fn new(state: Arc<MapState>) -> Self {
        Self {
            state,
            _marker: PhantomData,
        }
    }

    /// Contributes a pre-built value under `key`. A later put with an equal
    /// key overwrites: the materialized map keeps the last write.
    pub fn put(&mut self, key: K, value: Arc<V>) -> &mut Self {
        self.state
            .entries
            .lock()
            .push((Arc::new(key) as AnyArc, crate::provider::instance_provider(value)));
        self
    }

    /// Contributes an injectable value under `key`.
    pub fn put_injectable<E: InjectableInto<V>>(&mut self, key: K) -> &mut Self {
        self.state
            .entries
            .lock()
            .push((Arc::new(key) as AnyArc, descriptor_provider::<V, E>()));
        self
    }
}

pub(crate) fn new_list_state() -> Arc<ListState> {
    Arc::new(ListState::new())
}

pub(crate) fn new_set_state() -> Arc<SetState> {
    Arc::new(SetState::new())
}

pub(crate) fn new_map_state() -> Arc<MapState> {
    Arc::new(MapState::new())
}
