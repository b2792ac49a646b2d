use bindery::{
    Binder, BinderModule, ConstructorSpec, DiError, DiResult, Injectable, InjectorBuilder,
    InjectorDescriptor,
};
use std::sync::Arc;

struct Database {
    url: String,
}

struct StorageModule {
    url: &'static str,
}

impl BinderModule for StorageModule {
    fn configure(self, binder: &mut Binder) -> DiResult<()> {
        binder
            .bind::<Database>()
            .to_instance(Arc::new(Database {
                url: self.url.to_string(),
            }))
            .in_singleton_scope();
        Ok(())
    }
}

#[test]
fn named_modules_register_like_closures() {
    let injector = InjectorBuilder::new()
        .module(StorageModule {
            url: "postgres://localhost",
        })
        .build()
        .unwrap();

    assert_eq!(
        injector.get_instance::<Database>().unwrap().url,
        "postgres://localhost"
    );
}

#[test]
fn module_errors_abort_the_build() {
    let result = InjectorBuilder::new()
        .module(|_binder: &mut Binder| {
            Err(DiError::Configuration("bad module".to_string()))
        })
        .build();

    assert!(matches!(result, Err(DiError::Configuration(_))));
}

#[test]
fn restricted_overrides_reject_silent_rebinding() {
    let result = InjectorBuilder::new()
        .declared_overrides_only()
        .module(|binder: &mut Binder| {
            binder.bind::<usize>().to_instance(Arc::new(1usize));
            binder.bind::<usize>().to_instance(Arc::new(2usize));
            Ok(())
        })
        .build();

    match result {
        Err(DiError::Configuration(msg)) => assert!(msg.contains("already bound")),
        other => panic!("expected Configuration, got {:?}", other.err()),
    }
}

#[test]
fn declared_override_replaces_under_restriction() {
    let injector = InjectorBuilder::new()
        .declared_overrides_only()
        .module(|binder: &mut Binder| {
            binder.bind::<usize>().to_instance(Arc::new(1usize));
            Ok(())
        })
        .module(|binder: &mut Binder| {
            binder.override_bind::<usize>().to_instance(Arc::new(2usize));
            Ok(())
        })
        .build()
        .unwrap();

    assert_eq!(*injector.get_instance::<usize>().unwrap(), 2);
}

#[test]
fn override_without_prior_binding_fails() {
    let result = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.override_bind::<usize>().to_instance(Arc::new(2usize));
            Ok(())
        })
        .build();

    match result {
        Err(DiError::Configuration(msg)) => assert!(msg.contains("no prior binding")),
        other => panic!("expected Configuration, got {:?}", other.err()),
    }
}

#[test]
fn optional_binding_resolves_absent_until_completed() {
    struct Flag;

    let bare = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind_optional::<Flag>();
            Ok(())
        })
        .build()
        .unwrap();

    assert!(bare.get_optional::<Flag>().unwrap().is_none());
    assert!(matches!(
        bare.get_instance::<Flag>(),
        Err(DiError::Absent(_))
    ));

    let completed = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind_optional::<Flag>();
            Ok(())
        })
        .module(|binder: &mut Binder| {
            binder.bind::<Flag>().to_instance(Arc::new(Flag));
            Ok(())
        })
        .build()
        .unwrap();

    assert!(completed.get_optional::<Flag>().unwrap().is_some());
    assert!(completed.get_instance::<Flag>().is_ok());
}

#[test]
fn optional_bindings_are_exempt_from_override_restrictions() {
    struct Feature;

    let injector = InjectorBuilder::new()
        .declared_overrides_only()
        .module(|binder: &mut Binder| {
            binder.bind_optional::<Feature>();
            Ok(())
        })
        .module(|binder: &mut Binder| {
            // Completing an optional binding is not an override.
            binder.bind::<Feature>().to_instance(Arc::new(Feature));
            Ok(())
        })
        .build()
        .unwrap();

    assert!(injector.get_instance::<Feature>().is_ok());
}

#[test]
fn qualified_overrides_target_only_their_key() {
    let injector = InjectorBuilder::new()
        .declared_overrides_only()
        .module(|binder: &mut Binder| {
            binder.bind::<u32>().to_instance(Arc::new(1u32));
            binder.bind_qualified::<u32>("alt").to_instance(Arc::new(2u32));
            Ok(())
        })
        .module(|binder: &mut Binder| {
            binder
                .override_qualified::<u32>("alt")
                .to_instance(Arc::new(20u32));
            Ok(())
        })
        .build()
        .unwrap();

    assert_eq!(*injector.get_instance::<u32>().unwrap(), 1);
    assert_eq!(*injector.get_qualified_instance::<u32>("alt").unwrap(), 20);
}

#[test]
fn qualified_optional_bindings_resolve_independently() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind_optional_qualified::<String>("banner");
            binder
                .bind_qualified::<String>("motd")
                .to_instance(Arc::new("hi".to_string()));
            Ok(())
        })
        .build()
        .unwrap();

    assert!(matches!(
        injector.get_qualified_instance::<String>("banner"),
        Err(DiError::Absent(_))
    ));
    assert_eq!(*injector.get_qualified_instance::<String>("motd").unwrap(), "hi");
}

#[test]
fn unbound_optional_lookup_is_absent_not_an_error() {
    struct Never;

    let injector = InjectorBuilder::new().build().unwrap();
    assert!(injector.get_optional::<Never>().unwrap().is_none());
}

struct Standalone {
    marker: u8,
}

impl Injectable for Standalone {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new()
            .constructor(ConstructorSpec::zero(|| Ok(Standalone { marker: 5 })))
    }
}

#[test]
fn dynamic_bindings_synthesize_from_registered_descriptors() {
    let injector = InjectorBuilder::new()
        .enable_dynamic_bindings()
        .injectable::<Standalone>()
        .build()
        .unwrap();

    assert!(injector.has_provider::<Standalone>());
    assert_eq!(injector.get_instance::<Standalone>().unwrap().marker, 5);
}

#[test]
fn dynamic_bindings_default_to_disabled() {
    let injector = InjectorBuilder::new().injectable::<Standalone>().build().unwrap();

    assert!(!injector.has_provider::<Standalone>());
    assert!(matches!(
        injector.get_instance::<Standalone>(),
        Err(DiError::NotFound(_))
    ));
}

#[test]
fn dynamic_singleton_default_caches_synthesized_bindings() {
    let injector = InjectorBuilder::new()
        .enable_dynamic_bindings()
        .singleton_by_default()
        .injectable::<Standalone>()
        .build()
        .unwrap();

    let a = injector.get_instance::<Standalone>().unwrap();
    let b = injector.get_instance::<Standalone>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
}

#[test]
fn provider_hook_observes_every_registration() {
    use std::sync::atomic::{AtomicUsize, Ordering};

    let invocations = Arc::new(AtomicUsize::new(0));
    let counter = invocations.clone();

    let injector = InjectorBuilder::new()
        .wrap_providers(Arc::new(move |_key, provider| {
            let counter = counter.clone();
            let wrapped: bindery::ProviderFn =
                Arc::new(move |ctx: &bindery::InjectionContext<'_>| {
                    counter.fetch_add(1, Ordering::SeqCst);
                    provider(ctx)
                });
            wrapped
        }))
        .module(|binder: &mut Binder| {
            binder.bind::<u32>().to_instance(Arc::new(3u32));
            Ok(())
        })
        .build()
        .unwrap();

    let _ = injector.get_instance::<u32>().unwrap();
    let _ = injector.get_instance::<u32>().unwrap();
    assert_eq!(invocations.load(Ordering::SeqCst), 2);
}
