//! The registered strategy for one key.

use std::sync::Arc;

use crate::decoration::Decoration;
use crate::key::Key;
use crate::provider::ProviderFn;
use crate::scope::{Scope, ShutdownHook};

/// One binding: the provider triple plus scope and lifecycle state.
///
/// `original` is the provider as registered, `decorated` is the original
/// wrapped by the decoration chain (identical until decorations are
/// applied), and `scoped` is the decorated provider wrapped by the scope
/// strategy. Resolution always goes through `scoped`.
///
/// Re-wrapping on a scope change creates a fresh scope cell; an instance
/// already cached by the previous wrapper is neither migrated nor
/// invalidated. Known sharp edge, kept as-is.
pub(crate) struct Binding {
    original: ProviderFn,
    decorated: ProviderFn,
    scoped: ProviderFn,
    scope: Arc<dyn Scope>,
    hook: Option<ShutdownHook>,
    optional: bool,
    decorated_once: bool,
}

impl Clone for Binding {
    fn clone(&self) -> Self {
        Self {
            original: self.original.clone(),
            decorated: self.decorated.clone(),
            scoped: self.scoped.clone(),
            scope: self.scope.clone(),
            hook: self.hook.clone(),
            optional: self.optional,
            decorated_once: self.decorated_once,
        }
    }
}

impl Binding {
    pub(crate) fn new(
        key: &Key,
        original: ProviderFn,
        scope: Arc<dyn Scope>,
        optional: bool,
    ) -> Self {
        let decorated = original.clone();
        let scoped = scope.scope_with_listener(key, decorated.clone(), None);
        Self {
            original,
            decorated,
            scoped,
            scope,
            hook: None,
            optional,
            decorated_once: false,
        }
    }

    pub(crate) fn scoped(&self) -> ProviderFn {
        self.scoped.clone()
    }

    pub(crate) fn is_optional(&self) -> bool {
        self.optional
    }

    pub(crate) fn change_scope(&mut self, key: &Key, scope: Arc<dyn Scope>) {
        self.scope = scope;
        self.rewrap(key);
    }

    pub(crate) fn set_shutdown_hook(&mut self, key: &Key, hook: ShutdownHook) {
        self.hook = Some(hook);
        self.rewrap(key);
    }

    /// Folds the collected decoration chain into this binding. Applied at
    /// most once; later calls are ignored.
    pub(crate) fn decorate(&mut self, key: &Key, decoration: &Decoration) {
        if self.decorated_once {
            return;
        }
        self.decorated = decoration.compose(key, self.original.clone());
        self.decorated_once = true;
        self.rewrap(key);
    }

    fn rewrap(&mut self, key: &Key) {
        self.scoped =
            self.scope
                .scope_with_listener(key, self.decorated.clone(), self.hook.clone());
    }
}
