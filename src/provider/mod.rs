//! Type-erased provider plumbing shared by every binding.
//!
//! A provider is a function from an [`InjectionContext`] to an erased
//! service value. Every binding stores its provider chain in this form;
//! typed front-ends erase on the way in and downcast on the way out.

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::{DiError, DiResult};
use crate::injector::{InjectionContext, Injector};
use crate::key::Key;

/// Erased service value. Always holds an `Arc<T>` for the service type `T`
/// of the owning binding, so sized services and `dyn Trait` services share
/// one storage convention.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

/// Erased provider function: produce one service value on demand.
pub type ProviderFn = Arc<dyn Fn(&InjectionContext<'_>) -> DiResult<AnyArc> + Send + Sync>;

/// Wraps a typed service value into the erased storage form.
pub(crate) fn erase<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> AnyArc {
    Arc::new(value)
}

/// Unwraps an erased service value back to its typed form.
pub(crate) fn downcast_value<T: ?Sized + Send + Sync + 'static>(value: AnyArc) -> DiResult<Arc<T>> {
    value
        .downcast::<Arc<T>>()
        .map(|outer| (*outer).clone())
        .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>()))
}

// Sentinel produced by the placeholder provider of an optional binding that
// no module ever completed.
pub(crate) struct Absent;

pub(crate) fn absent_provider() -> ProviderFn {
    Arc::new(|_: &InjectionContext<'_>| Ok(Arc::new(Absent) as AnyArc))
}

pub(crate) fn is_absent(value: &AnyArc) -> bool {
    (**value).is::<Absent>()
}

/// Provider returning a fixed, pre-built instance.
pub(crate) fn instance_provider<T: ?Sized + Send + Sync + 'static>(value: Arc<T>) -> ProviderFn {
    let erased = erase(value);
    Arc::new(move |_: &InjectionContext<'_>| Ok(erased.clone()))
}

/// A factory object bound with `to_provider`: resolved through normal
/// injection, then asked for a value on every request. If the factory's own
/// binding is scoped, the factory is cached rather than its product.
pub trait TypeProvider: Send + Sync + 'static {
    type Out: ?Sized + Send + Sync + 'static;

    fn provide(&self) -> DiResult<Arc<Self::Out>>;
}

pub(crate) enum RefSource {
    /// Resolve through the registry by key.
    Bound { injector: Injector, key: Key },
    /// Invoke a fixed provider chain, used when a decorator requests a lazy
    /// reference to the stage it wraps.
    Chain {
        injector: Injector,
        provider: ProviderFn,
    },
}

impl Clone for RefSource {
    fn clone(&self) -> Self {
        match self {
            RefSource::Bound { injector, key } => RefSource::Bound {
                injector: injector.clone(),
                key: key.clone(),
            },
            RefSource::Chain { injector, provider } => RefSource::Chain {
                injector: injector.clone(),
                provider: provider.clone(),
            },
        }
    }
}

/// Deferred handle to a binding: resolution happens only when [`get`] is
/// called, through a fresh resolution context.
///
/// Injection points declared as `ProviderRef<T>` are not pushed onto the
/// cycle-detection stack, which makes this the sanctioned mechanism for
/// breaking dependency cycles: the referenced binding is only resolved once
/// the object graph is already wired.
///
/// [`get`]: ProviderRef::get
///
/// # Examples
///
/// ```rust
/// use bindery::{InjectorBuilder, ProviderRef};
///
/// let injector = InjectorBuilder::new()
///     .module(|binder: &mut bindery::Binder| {
///         binder.bind::<u32>().to_instance(7u32.into());
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// let handle: ProviderRef<u32> = injector.get_provider::<u32>().unwrap();
/// assert_eq!(*handle.get().unwrap(), 7);
/// ```
pub struct ProviderRef<T: ?Sized> {
    source: RefSource,
    _marker: PhantomData<fn() -> T>,
}

impl<T: ?Sized + Send + Sync + 'static> ProviderRef<T> {
    pub(crate) fn bound(injector: Injector, key: Key) -> Self {
        Self {
            source: RefSource::Bound { injector, key },
            _marker: PhantomData,
        }
    }

    pub(crate) fn from_source(source: RefSource) -> Self {
        Self {
            source,
            _marker: PhantomData,
        }
    }

    /// Resolves the referenced binding now.
    pub fn get(&self) -> DiResult<Arc<T>> {
        match &self.source {
            RefSource::Bound { injector, key } => injector.resolve_typed::<T>(key),
            RefSource::Chain { injector, provider } => {
                let ctx = InjectionContext::new(injector);
                let value = provider(&ctx)?;
                if is_absent(&value) {
                    return Err(DiError::Absent(std::any::type_name::<T>().to_string()));
                }
                downcast_value::<T>(value)
            }
        }
    }
}

impl<T: ?Sized> Clone for ProviderRef<T> {
    fn clone(&self) -> Self {
        Self {
            source: self.source.clone(),
            _marker: PhantomData,
        }
    }
}
