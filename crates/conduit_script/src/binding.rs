//! Callable bindings
//!
//! Host types opt into script exposure through [`HostClass`], an explicit
//! bindings manifest: every instance method goes into a [`Methods`] table and
//! every static function into a [`Statics`] table, each entry carrying its
//! member name, arity, return shape and an invoker. Nothing is discovered at
//! runtime.
//!
//! ```ignore
//! #[derive(Default, Serialize)]
//! struct SimpleClass {
//!     #[serde(rename = "Title")]
//!     title: String,
//! }
//!
//! impl SimpleClass {
//!     fn say_hi(&mut self) -> bool { true }
//!     fn shout(text: String) -> String { text.to_uppercase() }
//! }
//!
//! impl HostClass for SimpleClass {
//!     const NAME: &'static str = "SimpleClass";
//!
//!     fn methods(methods: &mut Methods<Self>) {
//!         bind_methods!(methods: say_hi as "SayHi");
//!     }
//!
//!     fn statics(statics: &mut Statics) {
//!         bind_statics!(statics: shout);
//!     }
//! }
//! ```

use crate::decode::FromScript;
use crate::encode::{instance_to_script, to_script};
use crate::error::{Result, ScriptError};
use crate::naming::{Member, Origin};
use crate::session::SessionLink;
use rquickjs::function::Rest;
use rquickjs::{Ctx, Function, Value};
use serde::Serialize;
use std::any::TypeId;
use std::cell::RefCell;
use std::marker::PhantomData;
use std::rc::Rc;

/// Most parameters a bound callable may declare.
pub const MAX_ARITY: usize = 6;

/// A host type that can be handed to scripts with callable members.
pub trait HostClass: Serialize + Sized + 'static {
    /// Type name used in diagnostics and constructor errors.
    const NAME: &'static str;

    /// Declare instance methods.
    fn methods(methods: &mut Methods<Self>) {
        let _ = methods;
    }

    /// Declare static functions.
    fn statics(statics: &mut Statics) {
        let _ = statics;
    }
}

// ============================================================================
// Callable shapes
// ============================================================================

/// An instance method `Fn(&mut T, A1, .., An) -> R`.
///
/// Implemented for every such function with up to [`MAX_ARITY`] parameters.
/// `Args` only disambiguates arities.
pub trait HostMethod<T, Args>: 'static {
    const ARITY: usize;

    /// False when the callable returns `()`.
    fn returns_value() -> bool;

    fn call_with<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        receiver: &mut T,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>>;
}

/// A static function `Fn(A1, .., An) -> R`.
pub trait StaticMethod<Args>: 'static {
    const ARITY: usize;

    fn returns_value() -> bool;

    fn call_with<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>>;
}

/// `()` is the "no value" shape and surfaces as `undefined`, not `null`.
fn produces_value<R: 'static>() -> bool {
    TypeId::of::<R>() != TypeId::of::<()>()
}

fn returned<'js, R: Serialize + 'static>(ctx: &Ctx<'js>, result: &R) -> Result<Value<'js>> {
    if produces_value::<R>() {
        to_script(ctx, result)
    } else {
        Ok(Value::new_undefined(ctx.clone()))
    }
}

macro_rules! impl_callables {
    ($($arg:ident),*) => {
        impl<T, F, R, $($arg,)*> HostMethod<T, ($($arg,)*)> for F
        where
            F: Fn(&mut T, $($arg),*) -> R + 'static,
            R: Serialize + 'static,
            $($arg: FromScript,)*
        {
            const ARITY: usize = count_args!($($arg)*);

            fn returns_value() -> bool {
                produces_value::<R>()
            }

            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn call_with<'js>(
                &self,
                ctx: &Ctx<'js>,
                link: &SessionLink,
                receiver: &mut T,
                args: Vec<Value<'js>>,
            ) -> Result<Value<'js>> {
                let mut args = args.into_iter();
                $(
                    let $arg = $arg::from_script(ctx, link, next_arg(ctx, &mut args))?;
                )*
                let result = self(receiver, $($arg),*);
                returned(ctx, &result)
            }
        }

        impl<F, R, $($arg,)*> StaticMethod<($($arg,)*)> for F
        where
            F: Fn($($arg),*) -> R + 'static,
            R: Serialize + 'static,
            $($arg: FromScript,)*
        {
            const ARITY: usize = count_args!($($arg)*);

            fn returns_value() -> bool {
                produces_value::<R>()
            }

            #[allow(non_snake_case, unused_variables, unused_mut)]
            fn call_with<'js>(
                &self,
                ctx: &Ctx<'js>,
                link: &SessionLink,
                args: Vec<Value<'js>>,
            ) -> Result<Value<'js>> {
                let mut args = args.into_iter();
                $(
                    let $arg = $arg::from_script(ctx, link, next_arg(ctx, &mut args))?;
                )*
                let result = self($($arg),*);
                returned(ctx, &result)
            }
        }
    };
}

impl_callables!();
impl_callables!(A1);
impl_callables!(A1, A2);
impl_callables!(A1, A2, A3);
impl_callables!(A1, A2, A3, A4);
impl_callables!(A1, A2, A3, A4, A5);
impl_callables!(A1, A2, A3, A4, A5, A6);

// Arity is checked before any conversion, so this never runs dry.
fn next_arg<'js>(ctx: &Ctx<'js>, args: &mut std::vec::IntoIter<Value<'js>>) -> Value<'js> {
    args.next().unwrap_or_else(|| Value::new_undefined(ctx.clone()))
}

fn check_arity(member: &Member, expected: usize, actual: usize) -> Result<()> {
    if expected == actual {
        Ok(())
    } else {
        Err(ScriptError::ArgumentCountMismatch {
            member: member.resolved().to_string(),
            expected,
            actual,
        })
    }
}

// ============================================================================
// Manifest tables
// ============================================================================

trait InvokeMethod<T> {
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        receiver: &mut T,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>>;
}

trait InvokeStatic {
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>>;
}

struct Erased<F, Args> {
    callable: F,
    _args: PhantomData<fn() -> Args>,
}

impl<T, Args, F: HostMethod<T, Args>> InvokeMethod<T> for Erased<F, Args> {
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        receiver: &mut T,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>> {
        self.callable.call_with(ctx, link, receiver, args)
    }
}

impl<Args, F: StaticMethod<Args>> InvokeStatic for Erased<F, Args> {
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>> {
        self.callable.call_with(ctx, link, args)
    }
}

/// One instance method entry.
pub struct MethodBinding<T> {
    member: Member,
    arity: usize,
    returns_value: bool,
    invoker: Box<dyn InvokeMethod<T>>,
}

impl<T> MethodBinding<T> {
    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    /// Arity is enforced before the receiver is touched, so a mismatched
    /// call never reaches the host method.
    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        receiver: &RefCell<T>,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>> {
        check_arity(&self.member, self.arity, args.len())?;
        let mut receiver = receiver
            .try_borrow_mut()
            .map_err(|_| ScriptError::Reentrant {
                member: self.member.resolved().to_string(),
            })?;
        self.invoker.invoke(ctx, link, &mut receiver, args)
    }
}

/// One static function entry.
pub struct StaticBinding {
    member: Member,
    arity: usize,
    returns_value: bool,
    invoker: Box<dyn InvokeStatic>,
}

impl StaticBinding {
    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn arity(&self) -> usize {
        self.arity
    }

    pub fn returns_value(&self) -> bool {
        self.returns_value
    }

    fn invoke<'js>(
        &self,
        ctx: &Ctx<'js>,
        link: &SessionLink,
        args: Vec<Value<'js>>,
    ) -> Result<Value<'js>> {
        check_arity(&self.member, self.arity, args.len())?;
        self.invoker.invoke(ctx, link, args)
    }
}

/// Instance method table of a [`HostClass`].
pub struct Methods<T> {
    bindings: Vec<Rc<MethodBinding<T>>>,
}

impl<T: 'static> Methods<T> {
    pub fn new() -> Self {
        Self {
            bindings: Vec::new(),
        }
    }

    /// Add `method` under `ident`, or under `exposed` when given.
    pub fn add<Args, F>(
        &mut self,
        ident: &'static str,
        exposed: Option<&'static str>,
        method: F,
    ) -> &mut Self
    where
        Args: 'static,
        F: HostMethod<T, Args>,
    {
        let mut member = Member::callable(ident, Origin::Instance);
        if let Some(name) = exposed {
            member = member.renamed(name);
        }
        self.bindings.push(Rc::new(MethodBinding {
            member,
            arity: F::ARITY,
            returns_value: F::returns_value(),
            invoker: Box::new(Erased {
                callable: method,
                _args: PhantomData,
            }),
        }));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<MethodBinding<T>>> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

impl<T: HostClass> Methods<T> {
    /// Build the table `T` declares.
    pub fn of() -> Self {
        let mut methods = Self::new();
        T::methods(&mut methods);
        methods
    }
}

impl<T: 'static> Default for Methods<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Static function table of a [`HostClass`].
#[derive(Default)]
pub struct Statics {
    bindings: Vec<Rc<StaticBinding>>,
}

impl Statics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn of<T: HostClass>() -> Self {
        let mut statics = Self::new();
        T::statics(&mut statics);
        statics
    }

    pub fn add<Args, F>(
        &mut self,
        ident: &'static str,
        exposed: Option<&'static str>,
        function: F,
    ) -> &mut Self
    where
        Args: 'static,
        F: StaticMethod<Args>,
    {
        let mut member = Member::callable(ident, Origin::Static);
        if let Some(name) = exposed {
            member = member.renamed(name);
        }
        self.bindings.push(Rc::new(StaticBinding {
            member,
            arity: F::ARITY,
            returns_value: F::returns_value(),
            invoker: Box::new(Erased {
                callable: function,
                _args: PhantomData,
            }),
        }));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Rc<StaticBinding>> {
        self.bindings.iter()
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}

/// Declare instance methods of `Self`: `bind_methods!(methods: a, b as "B")`.
#[macro_export]
macro_rules! bind_methods {
    ($methods:ident: $($method:ident $(as $name:literal)?),* $(,)?) => {
        $(
            $methods.add(
                stringify!($method),
                $crate::__exposed_name!($($name)?),
                Self::$method,
            );
        )*
    };
}

/// Declare static functions of `Self`: `bind_statics!(statics: a, b as "B")`.
#[macro_export]
macro_rules! bind_statics {
    ($statics:ident: $($function:ident $(as $name:literal)?),* $(,)?) => {
        $(
            $statics.add(
                stringify!($function),
                $crate::__exposed_name!($($name)?),
                Self::$function,
            );
        )*
    };
}

#[doc(hidden)]
#[macro_export]
macro_rules! __exposed_name {
    () => {
        ::core::option::Option::None
    };
    ($name:literal) => {
        ::core::option::Option::Some($name)
    };
}

// ============================================================================
// Native functions
// ============================================================================

/// Wrap an instance method as a native function closing over `receiver`.
pub(crate) fn bind_method<'js, T: HostClass>(
    ctx: &Ctx<'js>,
    link: &SessionLink,
    binding: Rc<MethodBinding<T>>,
    receiver: Rc<RefCell<T>>,
) -> Result<Function<'js>> {
    let link = link.clone();
    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let _scope = link.enter(&ctx);
            link.count("native_calls");
            tracing::trace!(
                host_type = T::NAME,
                member = binding.member().resolved(),
                args = args.0.len(),
                "native call"
            );
            binding
                .invoke(&ctx, &link, &receiver, args.0)
                .map_err(|err| err.throw(&ctx))
        },
    )?;
    Ok(function)
}

pub(crate) fn bind_static<'js>(
    ctx: &Ctx<'js>,
    link: &SessionLink,
    binding: Rc<StaticBinding>,
) -> Result<Function<'js>> {
    let link = link.clone();
    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let _scope = link.enter(&ctx);
            link.count("native_calls");
            tracing::trace!(
                member = binding.member().resolved(),
                args = args.0.len(),
                "native static call"
            );
            binding
                .invoke(&ctx, &link, args.0)
                .map_err(|err| err.throw(&ctx))
        },
    )?;
    Ok(function)
}

/// Parameterless constructor: `new T()` yields a freshly encoded
/// `T::default()` sharing the registration's method table.
pub(crate) fn bind_constructor<'js, T: HostClass + Default>(
    ctx: &Ctx<'js>,
    link: &SessionLink,
    methods: Rc<Methods<T>>,
) -> Result<Function<'js>> {
    let link = link.clone();
    let member = Member::callable(T::NAME, Origin::Static);
    let function = Function::new(
        ctx.clone(),
        move |ctx: Ctx<'js>, args: Rest<Value<'js>>| -> rquickjs::Result<Value<'js>> {
            let _scope = link.enter(&ctx);
            link.count("native_calls");
            tracing::trace!(host_type = T::NAME, "construct");
            check_arity(&member, 0, args.0.len())
                .and_then(|()| instance_to_script(&ctx, &link, T::default(), &methods))
                .map_err(|err| err.throw(&ctx))
        },
    )?
    .with_constructor(true);
    Ok(function)
}
