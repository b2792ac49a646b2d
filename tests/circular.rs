use bindery::{
    Binder, ConstructorSpec, DiError, Injectable, InjectorBuilder, InjectorDescriptor, Param,
    ProviderRef,
};
use std::sync::Arc;

struct A {
    b: Arc<B>,
}

struct B {
    a: Arc<A>,
}

impl Injectable for A {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::new(
            vec![Param::of::<B>()],
            |args| Ok(A { b: args.get::<B>(0)? }),
        ))
    }
}

impl Injectable for B {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::new(
            vec![Param::of::<A>()],
            |args| Ok(B { a: args.get::<A>(0)? }),
        ))
    }
}

#[test]
fn two_level_cycle_is_detected_and_names_the_chain() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind::<A>().to::<A>();
            binder.bind::<B>().to::<B>();
            Ok(())
        })
        .build()
        .unwrap();

    match injector.get_instance::<A>() {
        Err(DiError::Circular(chain)) => {
            assert_eq!(chain.len(), 3);
            assert!(chain[0].contains("A"));
            assert!(chain[1].contains("B"));
            assert!(chain[2].contains("A"));
        }
        other => panic!("expected Circular, got {:?}", other.err()),
    }
}

#[test]
fn self_cycle_is_detected() {
    struct Selfish;

    impl Injectable for Selfish {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::new(
                vec![Param::of::<Selfish>()],
                |_args| Ok(Selfish),
            ))
        }
    }

    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind::<Selfish>().to::<Selfish>();
            Ok(())
        })
        .build()
        .unwrap();

    match injector.get_instance::<Selfish>() {
        Err(DiError::Circular(chain)) => assert_eq!(chain.len(), 2),
        other => panic!("expected Circular, got {:?}", other.err()),
    }
}

#[test]
fn three_level_cycle_reports_every_hop() {
    struct X {
        _y: Arc<Y>,
    }
    struct Y {
        _z: Arc<Z>,
    }
    struct Z {
        _x: Arc<X>,
    }

    impl Injectable for X {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::new(
                vec![Param::of::<Y>()],
                |args| Ok(X { _y: args.get::<Y>(0)? }),
            ))
        }
    }
    impl Injectable for Y {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::new(
                vec![Param::of::<Z>()],
                |args| Ok(Y { _z: args.get::<Z>(0)? }),
            ))
        }
    }
    impl Injectable for Z {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::new(
                vec![Param::of::<X>()],
                |args| Ok(Z { _x: args.get::<X>(0)? }),
            ))
        }
    }

    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind::<X>().to::<X>();
            binder.bind::<Y>().to::<Y>();
            binder.bind::<Z>().to::<Z>();
            Ok(())
        })
        .build()
        .unwrap();

    match injector.get_instance::<X>() {
        Err(DiError::Circular(chain)) => {
            assert_eq!(chain.len(), 4);
            assert!(chain[0].contains("X") && chain[3].contains("X"));
            assert!(chain[1].contains("Y"));
            assert!(chain[2].contains("Z"));
        }
        other => panic!("expected Circular, got {:?}", other.err()),
    }
}

// The same shape as the two-level cycle, but one side defers through a
// provider reference, which is exempt from cycle detection.
struct Chicken {
    egg: Arc<Egg>,
}

struct Egg {
    chicken: ProviderRef<Chicken>,
}

impl Injectable for Chicken {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::new(
            vec![Param::of::<Egg>()],
            |args| {
                Ok(Chicken {
                    egg: args.get::<Egg>(0)?,
                })
            },
        ))
    }
}

impl Injectable for Egg {
    fn descriptor() -> InjectorDescriptor<Self> {
        InjectorDescriptor::new().constructor(ConstructorSpec::new(
            vec![Param::provider_of::<Chicken>()],
            |args| {
                Ok(Egg {
                    chicken: args.get_provider::<Chicken>(0)?,
                })
            },
        ))
    }
}

#[test]
fn lazy_reference_breaks_the_cycle() {
    let injector = InjectorBuilder::new()
        .module(|binder: &mut Binder| {
            binder.bind::<Chicken>().to::<Chicken>().in_singleton_scope();
            binder.bind::<Egg>().to::<Egg>().in_singleton_scope();
            Ok(())
        })
        .build()
        .unwrap();

    let chicken = injector.get_instance::<Chicken>().unwrap();
    let via_egg = chicken.egg.chicken.get().unwrap();
    assert!(Arc::ptr_eq(&chicken, &via_egg));
}

#[test]
fn failing_resolution_carries_an_injection_trace() {
    #[derive(Debug)]
    struct NeedsMissing {
        _dep: Arc<String>,
    }

    impl Injectable for NeedsMissing {
        fn descriptor() -> InjectorDescriptor<Self> {
            InjectorDescriptor::new().constructor(ConstructorSpec::new(
                vec![Param::of::<String>()],
                |args| {
                    Ok(NeedsMissing {
                        _dep: args.get::<String>(0)?,
                    })
                },
            ))
        }
    }

    let injector = InjectorBuilder::new()
        .capture_trace()
        .module(|binder: &mut Binder| {
            binder.bind::<NeedsMissing>().to::<NeedsMissing>();
            Ok(())
        })
        .build()
        .unwrap();

    let error = injector.get_instance::<NeedsMissing>().unwrap_err();
    let rendered = format!("{}", error);
    assert!(rendered.contains("no binding for"), "got: {}", rendered);
    assert!(rendered.contains("injection trace"), "got: {}", rendered);
    assert!(rendered.contains("NeedsMissing"), "got: {}", rendered);
    assert!(
        rendered.contains("constructor parameter #0"),
        "got: {}",
        rendered
    );
}

#[test]
fn trace_is_not_captured_by_default() {
    let injector = InjectorBuilder::new().build().unwrap();
    let error = injector.get_instance::<String>().unwrap_err();
    assert!(!format!("{}", error).contains("injection trace"));
}
