//! Decoration chains: before/after wrapping of a binding's provider.
//!
//! Decorations are collected from any number of modules while configuration
//! runs and folded into their target bindings exactly once, after every
//! module has finished. A decorator is built like any other injectable
//! implementation, with one special rule: an injection point requesting the
//! decorated type itself (eagerly or as a `ProviderRef`) receives the
//! previous stage of the chain instead of re-entering the binding.

use std::sync::Arc;

use crate::descriptors::{build_injectable, DelegateFrame, InjectableInto};
use crate::injector::InjectionContext;
use crate::key::Key;
use crate::provider::{erase, ProviderFn};

type WrapFn = Arc<dyn Fn(&Key, ProviderFn) -> ProviderFn + Send + Sync>;

/// One registered decorator implementation, already type-erased.
pub(crate) struct DecoratorSpec {
    wrap: WrapFn,
}

/// All decorators registered against one key, split into the before prefix
/// and after suffix relative to the undecorated provider.
#[derive(Default)]
pub(crate) struct Decoration {
    before: Vec<DecoratorSpec>,
    after: Vec<DecoratorSpec>,
}

impl Decoration {
    pub(crate) fn push_before(&mut self, spec: DecoratorSpec) {
        self.before.push(spec);
    }

    pub(crate) fn push_after(&mut self, spec: DecoratorSpec) {
        self.after.push(spec);
    }

    /// Folds the chain around `original`. Before decorators wrap in
    /// declaration order nearest the caller; after decorators wrap outside:
    /// before `[B1, B2]` and after `[A1]` produce `A1(B1(B2(original)))`.
    pub(crate) fn compose(&self, key: &Key, original: ProviderFn) -> ProviderFn {
        let mut chain = original;
        for spec in self.before.iter().rev() {
            chain = (spec.wrap)(key, chain);
        }
        for spec in &self.after {
            chain = (spec.wrap)(key, chain);
        }
        chain
    }
}

/// Builds the erased wrapper for decorator `D` applied to a binding of `T`.
pub(crate) fn decorator_spec<T, D>() -> DecoratorSpec
where
    T: ?Sized + Send + Sync + 'static,
    D: InjectableInto<T>,
{
    let desc = Arc::new(D::descriptor());
    let wrap: WrapFn = Arc::new(move |key: &Key, inner: ProviderFn| {
        let desc = desc.clone();
        let key = key.clone();
        Arc::new(move |ctx: &InjectionContext<'_>| {
            let frame = DelegateFrame {
                key: key.clone(),
                provider: inner.clone(),
            };
            let built = build_injectable::<D>(&desc, ctx, Some(&frame))?;
            Ok(erase(D::upcast(Arc::new(built))))
        }) as ProviderFn
    });
    DecoratorSpec { wrap }
}
