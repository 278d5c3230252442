//! Script functions as host delegates
//!
//! A script function passed to a host member (or evaluated by the host)
//! decodes into a [`ScriptFunction<A, R>`]: `A` is a tuple of serializable
//! arguments (up to six), `R` the decoded return shape.
//!
//! ```ignore
//! fn execute(&mut self, callback: ScriptFunction<(i32,), i32>) -> i32 {
//!     callback.call((50,)).unwrap_or_default()
//! }
//! ```

use crate::decode::FromScript;
use crate::encode::to_script;
use crate::error::{caught_message, Result, ScriptError};
use crate::session::SessionLink;
use crate::value::{ScriptKind, ScriptValue};
use rquickjs::{CatchResultExt, Ctx, Function, Value};
use serde::Serialize;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

/// Argument tuples a [`ScriptFunction`] can be called with.
pub trait ScriptArgs: 'static {
    const ARITY: usize;

    /// Encode the arguments and call `function` with an `undefined` receiver.
    fn apply<'js>(&self, ctx: &Ctx<'js>, function: &Function<'js>) -> Result<Value<'js>>;
}

macro_rules! impl_script_args {
    ($($ty:ident $arg:ident),*) => {
        impl<$($ty: Serialize + 'static,)*> ScriptArgs for ($($ty,)*) {
            const ARITY: usize = count_args!($($arg)*);

            fn apply<'js>(&self, ctx: &Ctx<'js>, function: &Function<'js>) -> Result<Value<'js>> {
                let ($($arg,)*) = self;
                function
                    .call::<_, Value>(($(to_script(ctx, $arg)?,)*))
                    .catch(ctx)
                    .map_err(|caught| ScriptError::execution(caught_message(caught)))
            }
        }
    };
}

impl_script_args!();
impl_script_args!(A1 a1);
impl_script_args!(A1 a1, A2 a2);
impl_script_args!(A1 a1, A2 a2, A3 a3);
impl_script_args!(A1 a1, A2 a2, A3 a3, A4 a4);
impl_script_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5);
impl_script_args!(A1 a1, A2 a2, A3 a3, A4 a4, A5 a5, A6 a6);

/// Owned, callable handle to a script function.
///
/// Keeps the function alive through the session's handle table for as long as
/// the delegate exists. Host objects may store one; once the session is
/// disposed, calls fail with [`ScriptError::Disposed`].
pub struct ScriptFunction<A, R> {
    handle: ScriptValue,
    _shape: PhantomData<fn(A) -> R>,
}

impl<A: ScriptArgs, R: FromScript> ScriptFunction<A, R> {
    /// Call the script function and decode its result.
    ///
    /// A throw surfaces as [`ScriptError::Execution`]. Called from plain host
    /// code, continuations the call schedules are drained before returning;
    /// called while a script is running, the enclosing execution drains them.
    pub fn call(&self, args: A) -> Result<R> {
        let shared = self.handle.link().upgrade()?;

        let result = shared.with_ctx(|ctx| {
            let function = self
                .handle
                .restore(ctx)?
                .into_function()
                .ok_or(ScriptError::Disposed)?;
            let value = args.apply(ctx, &function)?;
            R::from_script(ctx, self.handle.link(), value)
        });

        if !shared.is_nested() {
            shared.drain_tasks();
        }
        result
    }

    /// False once the owning session is gone.
    pub fn is_live(&self) -> bool {
        self.handle.is_live()
    }
}

impl<A: ScriptArgs, R: FromScript> FromScript for ScriptFunction<A, R> {
    fn from_script<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Result<Self> {
        let kind = ScriptKind::of(&value);
        if kind != ScriptKind::Function {
            return Err(ScriptError::conversion(
                type_name::<Self>(),
                format!("expected a function, got {kind}"),
            ));
        }

        Ok(Self {
            handle: ScriptValue::save(ctx, link, value),
            _shape: PhantomData,
        })
    }
}

/// Optional callback parameter: `null` and `undefined` decode to `None`.
impl<A: ScriptArgs, R: FromScript> FromScript for Option<ScriptFunction<A, R>> {
    fn from_script<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Result<Self> {
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        ScriptFunction::from_script(ctx, link, value).map(Some)
    }
}

impl<A, R> Clone for ScriptFunction<A, R> {
    fn clone(&self) -> Self {
        Self {
            handle: self.handle.clone(),
            _shape: PhantomData,
        }
    }
}

impl<A, R> fmt::Debug for ScriptFunction<A, R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptFunction")
            .field("signature", &type_name::<fn(A) -> R>())
            .field("live", &self.handle.is_live())
            .finish()
    }
}
