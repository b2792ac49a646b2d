//! Module system for composable configuration.

use crate::error::DiResult;

use super::Binder;

/// A configuration source: one unit of bindings, decorations, and
/// collection contributions.
///
/// Modules run in registration order during the first startup phase; the
/// decoration pass follows once all of them have finished.
///
/// Closures implement the trait, so small configurations don't need a
/// named type:
///
/// ```rust
/// use bindery::{Binder, InjectorBuilder};
/// use std::sync::Arc;
///
/// struct Config { name: &'static str }
///
/// let injector = InjectorBuilder::new()
///     .module(|binder: &mut Binder| {
///         binder.bind::<Config>().to_instance(Arc::new(Config { name: "app" }));
///         Ok(())
///     })
///     .build()
///     .unwrap();
///
/// assert_eq!(injector.get_instance::<Config>().unwrap().name, "app");
/// ```
///
/// Larger configurations group registrations in a named module:
///
/// ```rust
/// use bindery::{Binder, BinderModule, DiResult, InjectorBuilder};
/// use std::sync::Arc;
///
/// struct Database { url: String }
///
/// struct StorageModule {
///     url: String,
/// }
///
/// impl BinderModule for StorageModule {
///     fn configure(self, binder: &mut Binder) -> DiResult<()> {
///         binder
///             .bind::<Database>()
///             .to_instance(Arc::new(Database { url: self.url }))
///             .in_singleton_scope();
///         Ok(())
///     }
/// }
///
/// let injector = InjectorBuilder::new()
///     .module(StorageModule { url: "postgres://localhost".into() })
///     .build()
///     .unwrap();
/// assert_eq!(injector.get_instance::<Database>().unwrap().url, "postgres://localhost");
/// ```
pub trait BinderModule {
    /// Registers this module's contributions.
    fn configure(self, binder: &mut Binder) -> DiResult<()>;
}

impl<F> BinderModule for F
where
    F: FnOnce(&mut Binder) -> DiResult<()>,
{
    fn configure(self, binder: &mut Binder) -> DiResult<()> {
        self(binder)
    }
}
