//! # bindery
//!
//! A declarative dependency-injection runtime for Rust: modules register
//! bindings (type → implementation/instance/factory), the injector builds
//! fully wired object graphs on demand, manages lifetimes through scopes,
//! rejects malformed graphs (cycles, forbidden overrides, collection
//! ordering conflicts), and aggregates ordered/keyed collections
//! contributed incrementally by several modules.
//!
//! ## Features
//!
//! - **Typed keys with qualifiers**: concrete types and `dyn Trait`
//!   services share one identity model
//! - **Descriptor-driven injection**: constructor, field, and method
//!   injection described as data, no reflection required
//! - **Scopes and lifecycle**: singleton memoization with a shutdown
//!   broadcast, no-scope, custom scope strategies
//! - **Decoration chains**: before/after wrapping collected across modules
//!   and applied in one pass
//! - **Collection bindings**: graph-ordered lists, value-deduplicated
//!   sets, last-write-wins maps
//! - **Cycle detection**: per-call resolution stack with an optional
//!   human-readable injection trace
//!
//! ## Quick start
//!
//! ```rust
//! use bindery::{
//!     Binder, ConstructorSpec, Injectable, InjectableInto, InjectorBuilder,
//!     InjectorDescriptor, Param,
//! };
//! use std::sync::Arc;
//!
//! trait Logger: Send + Sync {
//!     fn log(&self, message: &str) -> String;
//! }
//!
//! struct ConsoleLogger;
//!
//! impl Logger for ConsoleLogger {
//!     fn log(&self, message: &str) -> String {
//!         format!("[LOG] {}", message)
//!     }
//! }
//!
//! impl Injectable for ConsoleLogger {
//!     fn descriptor() -> InjectorDescriptor<Self> {
//!         InjectorDescriptor::new().constructor(ConstructorSpec::zero(|| Ok(ConsoleLogger)))
//!     }
//! }
//!
//! impl InjectableInto<dyn Logger> for ConsoleLogger {
//!     fn upcast(this: Arc<Self>) -> Arc<dyn Logger> {
//!         this
//!     }
//! }
//!
//! struct App {
//!     logger: Arc<dyn Logger>,
//! }
//!
//! impl Injectable for App {
//!     fn descriptor() -> InjectorDescriptor<Self> {
//!         InjectorDescriptor::new().constructor(ConstructorSpec::new(
//!             vec![Param::of::<dyn Logger>()],
//!             |args| Ok(App { logger: args.get::<dyn Logger>(0)? }),
//!         ))
//!     }
//! }
//!
//! let injector = InjectorBuilder::new()
//!     .module(|binder: &mut Binder| {
//!         binder.bind::<dyn Logger>().to::<ConsoleLogger>().in_singleton_scope();
//!         binder.bind::<App>().to::<App>();
//!         Ok(())
//!     })
//!     .build()
//!     .unwrap();
//!
//! let app = injector.get_instance::<App>().unwrap();
//! assert_eq!(app.logger.log("ready"), "[LOG] ready");
//! ```
//!
//! ## Concurrency
//!
//! Configuration runs single-threaded during startup; after `build()` the
//! injector is safe under unbounded concurrent callers. Cycle detection is
//! per-call (and therefore per-thread): a cycle spanning threads that call
//! into each other is not detected. Shutdown clears the singleton caches,
//! so a request after `shutdown()` constructs fresh instances.

pub mod binder;
pub mod collection;
pub mod descriptors;
pub mod error;
pub mod injector;
pub mod key;
pub mod provider;
pub mod scope;

mod binding;
mod decoration;

pub use binder::{Binder, BinderModule, BindingBuilder, BoundBuilder, DecorateBuilder};
pub use collection::{ListBinder, MapBinder, SetBinder};
pub use descriptors::{
    Args, ConstructorSpec, FieldSpec, Injectable, InjectableInto, InjectorDescriptor, MethodSpec,
    Param,
};
pub use error::{DiError, DiResult};
pub use injector::{InjectionContext, Injector, InjectorBuilder, ProviderHook};
pub use key::{DiList, DiMap, DiSet, Key};
pub use provider::{AnyArc, ProviderFn, ProviderRef, TypeProvider};
pub use scope::{NoScope, Scope, ScopeEventListener, ShutdownHook, SingletonScope};
