//! Per-call resolution context: cycle detection and trace capture.
//!
//! A fresh context is created for every top-level injector call and threaded
//! explicitly through the provider chain, so the resolution stack and the
//! diagnostic trace can never bleed between independent calls. The context
//! lives on the calling thread's stack, which makes cycle detection
//! per-thread by construction; a cycle spanning two threads calling into
//! each other is not detected and will deadlock. That is a documented
//! limitation of this design, not a bug.

use std::cell::RefCell;
use std::sync::Arc;

use smallvec::SmallVec;
use tracing::trace;

use crate::error::{DiError, DiResult};
use crate::key::Key;
use crate::provider::{downcast_value, is_absent, AnyArc, ProviderRef};

use super::Injector;

/// Why a key is being resolved; rendered into the injection trace.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Site {
    /// Requested directly through the injector or a factory closure.
    Requested,
    /// Constructor parameter of an injectable type.
    Param { owner: &'static str, index: usize },
    /// Injected field of an injectable type.
    Field { owner: &'static str },
    /// Parameter of an injected method.
    MethodParam {
        owner: &'static str,
        method: &'static str,
        index: usize,
    },
    /// Element of a collection binding.
    Element { collection: &'static str },
}

fn render_site(key: &Key, site: Site) -> String {
    match site {
        Site::Requested => format!("{}", key),
        Site::Param { owner, index } => {
            format!("{} (constructor parameter #{} of {})", key, index, owner)
        }
        Site::Field { owner } => format!("{} (field of {})", key, owner),
        Site::MethodParam {
            owner,
            method,
            index,
        } => format!(
            "{} (parameter #{} of method {:?} on {})",
            key, index, method, owner
        ),
        Site::Element { collection } => format!("{} (element of {})", key, collection),
    }
}

/// Resolution state for a single top-level injection call.
///
/// Factory closures registered with `to_factory` receive a reference to the
/// active context and use its typed accessors to pull their dependencies:
///
/// ```rust
/// use bindery::{Binder, InjectionContext, InjectorBuilder};
/// use std::sync::Arc;
///
/// struct Config { port: u16 }
/// struct Server { port: u16 }
///
/// let injector = InjectorBuilder::new()
///     .module(|binder: &mut Binder| {
///         binder.bind::<Config>().to_instance(Arc::new(Config { port: 8080 }));
///         binder.bind::<Server>().to_factory(|ctx: &InjectionContext<'_>| {
///             let config = ctx.get::<Config>()?;
///             Ok(Arc::new(Server { port: config.port }))
///         });
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(injector.get_instance::<Server>().unwrap().port, 8080);
/// ```
pub struct InjectionContext<'i> {
    injector: &'i Injector,
    stack: RefCell<SmallVec<[Key; 8]>>,
    trace: RefCell<Vec<String>>,
}

impl<'i> InjectionContext<'i> {
    pub(crate) fn new(injector: &'i Injector) -> Self {
        Self {
            injector,
            stack: RefCell::new(SmallVec::new()),
            trace: RefCell::new(Vec::new()),
        }
    }

    /// The injector this context resolves against.
    pub fn injector(&self) -> &Injector {
        self.injector
    }

    /// Core erased resolution: cycle-guarded lookup and invocation of the
    /// key's scoped provider.
    pub(crate) fn resolve(&self, key: &Key, site: Site) -> DiResult<AnyArc> {
        {
            let stack = self.stack.borrow();
            if stack.iter().any(|k| k == key) {
                let mut chain: Vec<String> =
                    stack.iter().map(|k| format!("{}", k)).collect();
                chain.push(format!("{}", key));
                return Err(DiError::Circular(chain));
            }
        }
        trace!(key = %key, "resolving");

        self.stack.borrow_mut().push(key.clone());
        let result = self
            .injector
            .provider_for(key)
            .and_then(|provider| provider(self));
        self.stack.borrow_mut().pop();

        if result.is_err() && self.injector.capture_trace() {
            self.trace.borrow_mut().push(render_site(key, site));
        }
        result
    }

    /// Like [`resolve`](Self::resolve), but a missing binding or an absent
    /// value yields `Ok(None)`. A failure inside a bound provider still
    /// propagates; only the key's own absence is forgiven.
    pub(crate) fn resolve_if_bound(&self, key: &Key, site: Site) -> DiResult<Option<AnyArc>> {
        if !self.injector.has_provider_key(key) {
            return Ok(None);
        }
        match self.resolve(key, site) {
            Ok(value) if is_absent(&value) => Ok(None),
            Ok(value) => Ok(Some(value)),
            Err(e) => Err(e),
        }
    }

    pub(crate) fn take_trace(&self) -> Vec<String> {
        std::mem::take(&mut *self.trace.borrow_mut())
    }

    // ----- Typed accessors for factories and descriptors -----

    /// Resolves an unqualified binding of `T`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Arc<T>> {
        self.get_key::<T>(&Key::of::<T>())
    }

    /// Resolves a qualified binding of `T`.
    pub fn get_qualified<T: ?Sized + Send + Sync + 'static>(
        &self,
        qualifier: &'static str,
    ) -> DiResult<Arc<T>> {
        self.get_key::<T>(&Key::qualified::<T>(qualifier))
    }

    /// Resolves `T` by explicit key.
    pub fn get_key<T: ?Sized + Send + Sync + 'static>(&self, key: &Key) -> DiResult<Arc<T>> {
        let value = self.resolve(key, Site::Requested)?;
        if is_absent(&value) {
            return Err(DiError::Absent(format!("{}", key)));
        }
        downcast_value::<T>(value)
    }

    /// Resolves `T` if a binding exists and supplies a value, `None`
    /// otherwise.
    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<Option<Arc<T>>> {
        match self.resolve_if_bound(&Key::of::<T>(), Site::Requested)? {
            Some(value) => downcast_value::<T>(value).map(Some),
            None => Ok(None),
        }
    }

    /// Returns a deferred handle to the binding of `T` without resolving it.
    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(&self) -> DiResult<ProviderRef<T>> {
        self.injector.provider_ref::<T>(Key::of::<T>())
    }
}
