//! Per-type injector descriptors.
//!
//! Without runtime reflection, member discovery is data: an
//! [`InjectorDescriptor`] enumerates a type's constructors, injectable
//! fields, and injectable methods, and the engine drives injection off that
//! description. Descriptors are usually written by hand next to the type
//! they describe; a build-time generator could emit them just as well.
//!
//! The stages run innermost first: the selected constructor produces the
//! value, then every field is injected (declaration order, root-most level
//! first), then -- only when method injection is enabled on the injector --
//! every method is invoked. All field injection completes before any method
//! injection begins; this ordering is part of the contract and is relied on
//! by downstream code.

use std::borrow::Cow;
use std::sync::Arc;

use smallvec::SmallVec;

use crate::error::{DiError, DiResult};
use crate::injector::{InjectionContext, Site};
use crate::key::Key;
use crate::provider::{
    downcast_value, erase, is_absent, AnyArc, ProviderFn, ProviderRef, RefSource, TypeProvider,
};

/// A type whose wiring is described by a descriptor.
///
/// # Examples
///
/// ```rust
/// use bindery::{ConstructorSpec, Injectable, InjectorDescriptor, Param};
/// use std::sync::Arc;
///
/// struct Engine { cylinders: u8 }
/// struct Car { engine: Arc<Engine> }
///
/// impl Injectable for Car {
///     fn descriptor() -> InjectorDescriptor<Self> {
///         InjectorDescriptor::new().constructor(ConstructorSpec::new(
///             vec![Param::of::<Engine>()],
///             |args| Ok(Car { engine: args.get::<Engine>(0)? }),
///         ))
///     }
/// }
/// ```
pub trait Injectable: Send + Sync + Sized + 'static {
    fn descriptor() -> InjectorDescriptor<Self>;
}

/// Upcast seam between an injectable implementation and the service type it
/// is bound to. The blanket impl covers self-bindings; binding a concrete
/// type to a `dyn Trait` key takes a one-line impl at the call site, where
/// the unsizing coercion is expressible:
///
/// ```rust
/// use bindery::{Injectable, InjectableInto, InjectorDescriptor, ConstructorSpec};
/// use std::sync::Arc;
///
/// trait Greeter: Send + Sync { fn hello(&self) -> String; }
///
/// struct EnglishGreeter;
/// impl Greeter for EnglishGreeter {
///     fn hello(&self) -> String { "hello".into() }
/// }
///
/// impl Injectable for EnglishGreeter {
///     fn descriptor() -> InjectorDescriptor<Self> {
///         InjectorDescriptor::new()
///             .constructor(ConstructorSpec::zero(|| Ok(EnglishGreeter)))
///     }
/// }
///
/// impl InjectableInto<dyn Greeter> for EnglishGreeter {
///     fn upcast(this: Arc<Self>) -> Arc<dyn Greeter> { this }
/// }
/// ```
pub trait InjectableInto<T: ?Sized + Send + Sync + 'static>: Injectable {
    fn upcast(this: Arc<Self>) -> Arc<T>;
}

impl<T: Injectable> InjectableInto<T> for T {
    fn upcast(this: Arc<Self>) -> Arc<T> {
        this
    }
}

type LazyMaker = Arc<dyn Fn(RefSource) -> AnyArc + Send + Sync>;

#[derive(Clone)]
enum ParamMode {
    Eager,
    Lazy(LazyMaker),
    Optional,
}

/// One injection point: a constructor or method parameter, or the value
/// side of a field.
///
/// Parameters resolve eagerly by default. `provider_of` parameters receive
/// a deferred [`ProviderRef`] instead and are exempt from cycle detection;
/// `optional_of` parameters receive `None` when nothing is bound.
#[derive(Clone)]
pub struct Param {
    base: Key,
    mode: ParamMode,
    qualifiers: SmallVec<[Cow<'static, str>; 2]>,
}

impl Param {
    /// Eagerly resolved parameter of type `Arc<T>`.
    pub fn of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            base: Key::of::<T>(),
            mode: ParamMode::Eager,
            qualifiers: SmallVec::new(),
        }
    }

    /// Deferred parameter of type [`ProviderRef<T>`]; the sanctioned cycle
    /// breaker.
    pub fn provider_of<T: ?Sized + Send + Sync + 'static>() -> Self {
        let maker: LazyMaker =
            Arc::new(|source| Arc::new(ProviderRef::<T>::from_source(source)) as AnyArc);
        Self {
            base: Key::of::<T>(),
            mode: ParamMode::Lazy(maker),
            qualifiers: SmallVec::new(),
        }
    }

    /// Parameter of type `Option<Arc<T>>`, absent when nothing is bound.
    pub fn optional_of<T: ?Sized + Send + Sync + 'static>() -> Self {
        Self {
            base: Key::of::<T>(),
            mode: ParamMode::Optional,
            qualifiers: SmallVec::new(),
        }
    }

    /// Adds a qualifier. Declaring more than one on a single parameter is a
    /// configuration error, reported when the descriptor is first used.
    pub fn qualified(mut self, qualifier: impl Into<Cow<'static, str>>) -> Self {
        self.qualifiers.push(qualifier.into());
        self
    }

    fn effective_key(&self) -> DiResult<Key> {
        match self.qualifiers.len() {
            0 => Ok(self.base.clone()),
            1 => Ok(self.base.clone().with_qualifier(self.qualifiers[0].clone())),
            _ => Err(DiError::Configuration(format!(
                "injection point for {} declares more than one qualifier: {:?}",
                self.base, self.qualifiers
            ))),
        }
    }
}

/// Resolved argument values for one constructor or method invocation,
/// positionally aligned with the declared parameter list.
pub struct Args {
    values: Vec<Option<AnyArc>>,
}

impl Args {
    /// The eagerly resolved value of parameter `index`.
    pub fn get<T: ?Sized + Send + Sync + 'static>(&self, index: usize) -> DiResult<Arc<T>> {
        match self.slot(index)? {
            Some(value) => downcast_value::<T>(value.clone()),
            None => Err(DiError::Absent(std::any::type_name::<T>().to_string())),
        }
    }

    /// The deferred handle of a `provider_of` parameter.
    pub fn get_provider<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> DiResult<ProviderRef<T>> {
        match self.slot(index)? {
            Some(value) => value
                .clone()
                .downcast::<ProviderRef<T>>()
                .map(|outer| (*outer).clone())
                .map_err(|_| DiError::TypeMismatch(std::any::type_name::<T>())),
            None => Err(DiError::Absent(std::any::type_name::<T>().to_string())),
        }
    }

    /// The value of an `optional_of` parameter.
    pub fn get_optional<T: ?Sized + Send + Sync + 'static>(
        &self,
        index: usize,
    ) -> DiResult<Option<Arc<T>>> {
        match self.slot(index)? {
            Some(value) => downcast_value::<T>(value.clone()).map(Some),
            None => Ok(None),
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    fn slot(&self, index: usize) -> DiResult<&Option<AnyArc>> {
        self.values.get(index).ok_or_else(|| {
            DiError::Configuration(format!("argument index {} out of range", index))
        })
    }
}

type BuildFn<T> = Arc<dyn Fn(&Args) -> DiResult<T> + Send + Sync>;
type ApplyFn<T> = Arc<dyn Fn(&mut T, Option<AnyArc>) -> DiResult<()> + Send + Sync>;
type InvokeFn<T> = Arc<dyn Fn(&mut T, &Args) -> DiResult<()> + Send + Sync>;

/// One constructor alternative of an injectable type.
pub struct ConstructorSpec<T> {
    injectable: bool,
    params: Vec<Param>,
    build: BuildFn<T>,
}

impl<T> ConstructorSpec<T> {
    /// An injectable constructor with the given parameter list.
    pub fn new(
        params: Vec<Param>,
        build: impl Fn(&Args) -> DiResult<T> + Send + Sync + 'static,
    ) -> Self {
        Self {
            injectable: true,
            params,
            build: Arc::new(build),
        }
    }

    /// A plain zero-argument constructor, used as the fallback when no
    /// constructor is marked injectable.
    pub fn zero(build: impl Fn() -> DiResult<T> + Send + Sync + 'static) -> Self {
        Self {
            injectable: false,
            params: Vec::new(),
            build: Arc::new(move |_| build()),
        }
    }
}

/// One injectable field of a type: a parameter plus a setter.
pub struct FieldSpec<T> {
    param: Param,
    apply: ApplyFn<T>,
}

impl<T: 'static> FieldSpec<T> {
    /// Field holding an eagerly resolved `Arc<F>`.
    pub fn assign<F: ?Sized + Send + Sync + 'static>(
        set: impl Fn(&mut T, Arc<F>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            param: Param::of::<F>(),
            apply: Arc::new(move |target, value| {
                let value = value
                    .ok_or_else(|| DiError::Absent(std::any::type_name::<F>().to_string()))?;
                set(target, downcast_value::<F>(value)?);
                Ok(())
            }),
        }
    }

    /// Field holding a deferred [`ProviderRef<F>`].
    pub fn assign_provider<F: ?Sized + Send + Sync + 'static>(
        set: impl Fn(&mut T, ProviderRef<F>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            param: Param::provider_of::<F>(),
            apply: Arc::new(move |target, value| {
                let value = value
                    .ok_or_else(|| DiError::Absent(std::any::type_name::<F>().to_string()))?;
                let handle = value
                    .downcast::<ProviderRef<F>>()
                    .map(|outer| (*outer).clone())
                    .map_err(|_| DiError::TypeMismatch(std::any::type_name::<F>()))?;
                set(target, handle);
                Ok(())
            }),
        }
    }

    /// Field holding an `Option<Arc<F>>`.
    pub fn assign_optional<F: ?Sized + Send + Sync + 'static>(
        set: impl Fn(&mut T, Option<Arc<F>>) + Send + Sync + 'static,
    ) -> Self {
        Self {
            param: Param::optional_of::<F>(),
            apply: Arc::new(move |target, value| {
                let resolved = match value {
                    Some(v) => Some(downcast_value::<F>(v)?),
                    None => None,
                };
                set(target, resolved);
                Ok(())
            }),
        }
    }

    /// Adds a qualifier to the field's injection point.
    pub fn qualified(mut self, qualifier: impl Into<Cow<'static, str>>) -> Self {
        self.param = self.param.qualified(qualifier);
        self
    }
}

/// One injectable method of a type, identified by a signature name.
///
/// Two specs with the same signature describe an override: only the
/// last-registered body runs, once, at the position where the signature
/// first appeared.
pub struct MethodSpec<T> {
    signature: &'static str,
    params: Vec<Param>,
    invoke: InvokeFn<T>,
}

impl<T> MethodSpec<T> {
    pub fn new(
        signature: &'static str,
        params: Vec<Param>,
        invoke: impl Fn(&mut T, &Args) -> DiResult<()> + Send + Sync + 'static,
    ) -> Self {
        Self {
            signature,
            params,
            invoke: Arc::new(invoke),
        }
    }
}

/// Complete wiring description of one type: constructor alternatives,
/// injectable fields, injectable methods, and a scope preference.
pub struct InjectorDescriptor<T> {
    constructors: Vec<ConstructorSpec<T>>,
    fields: Vec<FieldSpec<T>>,
    methods: Vec<MethodSpec<T>>,
    prefers_singleton: bool,
}

impl<T> Default for InjectorDescriptor<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> InjectorDescriptor<T> {
    pub fn new() -> Self {
        Self {
            constructors: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            prefers_singleton: false,
        }
    }

    pub fn constructor(mut self, spec: ConstructorSpec<T>) -> Self {
        self.constructors.push(spec);
        self
    }

    /// Declares an injectable field. Fields are injected in declaration
    /// order; list inherited-level fields first so the root-most level is
    /// injected first.
    pub fn field(mut self, spec: FieldSpec<T>) -> Self {
        self.fields.push(spec);
        self
    }

    /// Declares an injectable method. Methods only run when the injector
    /// enables method injection.
    pub fn method(mut self, spec: MethodSpec<T>) -> Self {
        self.methods.push(spec);
        self
    }

    /// Marks the described type as preferring singleton scope when bound
    /// without an explicit scope selector.
    pub fn singleton(mut self) -> Self {
        self.prefers_singleton = true;
        self
    }

    pub(crate) fn prefers_singleton(&self) -> bool {
        self.prefers_singleton
    }
}

/// The previous stage of a decoration chain, substituted for injection
/// points that request the decorated type itself.
pub(crate) struct DelegateFrame {
    pub(crate) key: Key,
    pub(crate) provider: ProviderFn,
}

fn resolve_param(
    ctx: &InjectionContext<'_>,
    param: &Param,
    delegate: Option<&DelegateFrame>,
    site: Site,
) -> DiResult<Option<AnyArc>> {
    let key = param.effective_key()?;

    // A decorator asking for the type it decorates gets the previous chain
    // stage instead of re-entering its own binding. An unqualified
    // injection point matches a qualified decorated key; a point qualified
    // for a different binding of the same type does not.
    if let Some(frame) = delegate {
        let takes_delegate = frame.key.type_id() == key.type_id()
            && (key.qualifier().is_none() || key.qualifier() == frame.key.qualifier());
        if takes_delegate {
            return match &param.mode {
                ParamMode::Eager | ParamMode::Optional => (frame.provider)(ctx).map(Some),
                ParamMode::Lazy(maker) => Ok(Some(maker(RefSource::Chain {
                    injector: ctx.injector().clone(),
                    provider: frame.provider.clone(),
                }))),
            };
        }
    }

    match &param.mode {
        ParamMode::Eager => {
            let value = ctx.resolve(&key, site)?;
            if is_absent(&value) {
                return Err(DiError::Absent(format!("{}", key)));
            }
            Ok(Some(value))
        }
        ParamMode::Lazy(maker) => Ok(Some(maker(RefSource::Bound {
            injector: ctx.injector().clone(),
            key,
        }))),
        ParamMode::Optional => ctx.resolve_if_bound(&key, site),
    }
}

fn select_constructor<T: 'static>(
    desc: &InjectorDescriptor<T>,
) -> DiResult<&ConstructorSpec<T>> {
    let mut best: Option<&ConstructorSpec<T>> = None;
    for spec in desc.constructors.iter().filter(|s| s.injectable) {
        let better = match best {
            Some(current) => spec.params.len() > current.params.len(),
            None => true,
        };
        if better {
            best = Some(spec);
        }
    }
    if let Some(spec) = best {
        return Ok(spec);
    }
    desc.constructors
        .iter()
        .find(|s| s.params.is_empty())
        .ok_or_else(|| {
            DiError::Configuration(format!(
                "no injectable constructor for {}",
                std::any::type_name::<T>()
            ))
        })
}

fn resolve_args(
    ctx: &InjectionContext<'_>,
    params: &[Param],
    delegate: Option<&DelegateFrame>,
    site_for: impl Fn(usize) -> Site,
) -> DiResult<Args> {
    let mut values = Vec::with_capacity(params.len());
    for (index, param) in params.iter().enumerate() {
        values.push(resolve_param(ctx, param, delegate, site_for(index))?);
    }
    Ok(Args { values })
}

/// Runs the full injection pipeline for `T`: constructor selection,
/// argument resolution, field injection, and (when enabled) method
/// injection.
pub(crate) fn build_injectable<T: Injectable>(
    desc: &InjectorDescriptor<T>,
    ctx: &InjectionContext<'_>,
    delegate: Option<&DelegateFrame>,
) -> DiResult<T> {
    let owner = std::any::type_name::<T>();
    let spec = select_constructor(desc)?;
    let args = resolve_args(ctx, &spec.params, delegate, |index| Site::Param {
        owner,
        index,
    })?;
    let mut value = (spec.build)(&args)?;
    inject_fields(desc, ctx, &mut value, delegate)?;
    if ctx.injector().method_injection_enabled() {
        inject_methods(desc, ctx, &mut value, delegate)?;
    }
    Ok(value)
}

pub(crate) fn inject_fields<T: Injectable>(
    desc: &InjectorDescriptor<T>,
    ctx: &InjectionContext<'_>,
    target: &mut T,
    delegate: Option<&DelegateFrame>,
) -> DiResult<()> {
    let owner = std::any::type_name::<T>();
    for field in &desc.fields {
        let value = resolve_param(ctx, &field.param, delegate, Site::Field { owner })?;
        (field.apply)(target, value)?;
    }
    Ok(())
}

pub(crate) fn inject_methods<T: Injectable>(
    desc: &InjectorDescriptor<T>,
    ctx: &InjectionContext<'_>,
    target: &mut T,
    delegate: Option<&DelegateFrame>,
) -> DiResult<()> {
    let owner = std::any::type_name::<T>();

    // Deduplicate by signature: an override keeps the position where the
    // signature first appeared but runs the last-registered body.
    let mut order: Vec<usize> = Vec::with_capacity(desc.methods.len());
    for (index, method) in desc.methods.iter().enumerate() {
        match order
            .iter()
            .position(|&seen| desc.methods[seen].signature == method.signature)
        {
            Some(at) => order[at] = index,
            None => order.push(index),
        }
    }

    for index in order {
        let method = &desc.methods[index];
        let args = resolve_args(ctx, &method.params, delegate, |i| Site::MethodParam {
            owner,
            method: method.signature,
            index: i,
        })?;
        (method.invoke)(target, &args)?;
    }
    Ok(())
}

/// Provider constructing `Impl` through its descriptor and upcasting to the
/// bound service type.
pub(crate) fn descriptor_provider<T, Impl>() -> ProviderFn
where
    T: ?Sized + Send + Sync + 'static,
    Impl: InjectableInto<T>,
{
    let desc = Arc::new(Impl::descriptor());
    Arc::new(move |ctx: &InjectionContext<'_>| {
        let built = build_injectable::<Impl>(&desc, ctx, None)?;
        Ok(erase(Impl::upcast(Arc::new(built))))
    })
}

/// Provider backing `to_provider`: resolves the factory type through its
/// own binding when one exists (so a scoped factory is cached, never its
/// product), then invokes the factory on every request.
pub(crate) fn provider_factory_provider<T, P>() -> ProviderFn
where
    T: ?Sized + Send + Sync + 'static,
    P: TypeProvider<Out = T> + Injectable,
{
    let desc = Arc::new(P::descriptor());
    Arc::new(move |ctx: &InjectionContext<'_>| {
        let factory: Arc<P> = if ctx.injector().has_provider_key(&Key::of::<P>()) {
            ctx.get::<P>()?
        } else {
            Arc::new(build_injectable::<P>(&desc, ctx, None)?)
        };
        Ok(erase(factory.provide()?))
    })
}

/// Provider backing `to_provider_instance`: a caller-supplied factory
/// object invoked on every request.
pub(crate) fn provider_instance_provider<T, P>(factory: Arc<P>) -> ProviderFn
where
    T: ?Sized + Send + Sync + 'static,
    P: TypeProvider<Out = T>,
{
    Arc::new(move |_: &InjectionContext<'_>| Ok(erase(factory.provide()?)))
}
