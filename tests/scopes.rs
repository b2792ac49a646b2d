use bindery::{
    Binder, ConstructorSpec, Injectable, InjectorBuilder, InjectorDescriptor, ScopeEventListener,
    TypeProvider,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Expensive {
    serial: usize,
}

static EXPENSIVE_BUILDS: AtomicUsize = AtomicUsize::new(0);

impl Injectable for Expensive {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::zero(|| {
            Ok(Expensive {
                serial: EXPENSIVE_BUILDS.fetch_add(1, Ordering::SeqCst),
            })
        }))
    }
}

#[test]
fn singleton_scope_caches_one_instance() {
    struct Widget;
    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    impl Injectable for Widget {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::zero(|| {
                BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Widget)
            }))
        }
    }

    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind::<Widget>().to::<Widget>().in_singleton_scope();
            Ok(())
        })
        .build()
        .unwrap();

    let a = injector.get_instance::<Widget>().unwrap();
    let b = injector.get_instance::<Widget>().unwrap();
    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(BUILDS.load(Ordering::SeqCst), 1);
}

#[test]
fn no_scope_reconstructs_every_time() {
    struct Gadget;
    static BUILDS: AtomicUsize = AtomicUsize::new(0);

    impl Injectable for Gadget {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::zero(|| {
                BUILDS.fetch_add(1, Ordering::SeqCst);
                Ok(Gadget)
            }))
        }
    }

    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind::<Gadget>().to::<Gadget>().without_scope();
            Ok(())
        })
        .build()
        .unwrap();

    let a = injector.get_instance::<Gadget>().unwrap();
    let b = injector.get_instance::<Gadget>().unwrap();
    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(BUILDS.load(Ordering::SeqCst), 2);
}

#[test]
fn concurrent_first_resolution_constructs_once() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder
                .bind::<Expensive>()
                .to::<Expensive>()
                .in_singleton_scope();
            Ok(())
        })
        .build()
        .unwrap();

    let before = EXPENSIVE_BUILDS.load(Ordering::SeqCst);
    let mut resolved: Vec<Arc<Expensive>> = Vec::new();

    crossbeam_utils::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let injector = injector.clone();
                scope.spawn(move |_| injector.get_instance::<Expensive>().unwrap())
            })
            .collect();
        for handle in handles {
            resolved.push(handle.join().unwrap());
        }
    })
    .unwrap();

    let after = EXPENSIVE_BUILDS.load(Ordering::SeqCst);
    assert_eq!(after - before, 1, "exactly one construction observable");
    for pair in resolved.windows(2) {
        assert!(Arc::ptr_eq(&pair[0], &pair[1]));
        assert_eq!(pair[0].serial, pair[1].serial);
    }
}

struct Cache {
    flushed: AtomicUsize,
}

impl Injectable for Cache {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::zero(|| {
            Ok(Cache {
                flushed: AtomicUsize::new(0),
            })
        }))
    }
}

impl ScopeEventListener for Cache {
    fn before_scope_end(&self) {
        self.flushed.fetch_add(1, Ordering::SeqCst);
    }
}

#[test]
fn shutdown_notifies_each_listener_once_and_resets_the_cache() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder
                .bind::<Cache>()
                .to::<Cache>()
                .in_singleton_scope()
                .on_shutdown();
            Ok(())
        })
        .build()
        .unwrap();

    let first = injector.get_instance::<Cache>().unwrap();
    injector.shutdown();
    assert_eq!(first.flushed.load(Ordering::SeqCst), 1);

    // Repeated shutdown without a new instance broadcasts nothing.
    injector.shutdown();
    assert_eq!(first.flushed.load(Ordering::SeqCst), 1);

    // The cache was cleared: a new request constructs a fresh instance,
    // which participates in the next broadcast.
    let second = injector.get_instance::<Cache>().unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    injector.shutdown();
    assert_eq!(first.flushed.load(Ordering::SeqCst), 1);
    assert_eq!(second.flushed.load(Ordering::SeqCst), 1);
}

#[test]
fn unconstructed_singletons_receive_no_events() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder
                .bind::<Cache>()
                .to::<Cache>()
                .in_singleton_scope()
                .on_shutdown();
            Ok(())
        })
        .build()
        .unwrap();

    // Never resolved; shutdown has nobody to notify and must not construct.
    injector.shutdown();
    let cache = injector.get_instance::<Cache>().unwrap();
    assert_eq!(cache.flushed.load(Ordering::SeqCst), 0);
}

struct Conn {
    serial: usize,
}

struct ConnFactory {
    made: AtomicUsize,
}

static FACTORY_BUILDS: AtomicUsize = AtomicUsize::new(0);

impl Injectable for ConnFactory {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::zero(|| {
            FACTORY_BUILDS.fetch_add(1, Ordering::SeqCst);
            Ok(ConnFactory {
                made: AtomicUsize::new(0),
            })
        }))
    }
}

impl TypeProvider for ConnFactory {
    type Out = Conn;

    fn provide(&self) -> bindery::DiResult<Arc<Conn>> {
        Ok(Arc::new(Conn {
            serial: self.made.fetch_add(1, Ordering::SeqCst),
        }))
    }
}

#[test]
fn scoped_provider_type_caches_the_factory_not_the_product() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder
                .bind::<ConnFactory>()
                .to::<ConnFactory>()
                .in_singleton_scope();
            binder.bind::<Conn>().to_provider::<ConnFactory>();
            Ok(())
        })
        .build()
        .unwrap();

    let before = FACTORY_BUILDS.load(Ordering::SeqCst);
    let a = injector.get_instance::<Conn>().unwrap();
    let b = injector.get_instance::<Conn>().unwrap();

    assert_eq!(FACTORY_BUILDS.load(Ordering::SeqCst) - before, 1);
    assert!(!Arc::ptr_eq(&a, &b));
    assert_ne!(a.serial, b.serial);
}
