//! Script -> host value decoding
//!
//! Strategy by script kind:
//!
//! | kind                     | path                                     |
//! |--------------------------|------------------------------------------|
//! | undefined, null          | deserialize from JSON null, no round trip |
//! | boolean, string          | mapped directly                          |
//! | number, object, array    | `JSON.stringify` then `serde_json`       |
//! | function                 | only into [`ScriptFunction`]             |
//! | anything else            | warning, then as null                    |
//!
//! [`ScriptFunction`]: crate::ScriptFunction

use crate::error::{caught_message, Result, ScriptError};
use crate::session::SessionLink;
use crate::value::{ScriptKind, ScriptValue};
use rquickjs::{CatchResultExt, Ctx, Value};
use serde::de::DeserializeOwned;
use std::any::type_name;

/// Conversion from an engine value into a host value.
///
/// Every `DeserializeOwned` type gets this for free; [`ScriptValue`] and
/// [`ScriptFunction`](crate::ScriptFunction) keep their engine reference.
pub trait FromScript: Sized + 'static {
    fn from_script<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Result<Self>;
}

impl<T: DeserializeOwned + 'static> FromScript for T {
    fn from_script<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Result<Self> {
        let target = type_name::<T>();
        let document = match ScriptKind::of(&value) {
            ScriptKind::Undefined | ScriptKind::Null => serde_json::Value::Null,
            ScriptKind::Boolean => serde_json::Value::Bool(value.as_bool().unwrap_or_default()),
            ScriptKind::String => serde_json::Value::String(value.get::<String>()?),
            ScriptKind::Number | ScriptKind::Object | ScriptKind::Array => {
                return round_trip(ctx, link, value, target);
            }
            ScriptKind::Function => {
                return Err(ScriptError::conversion(
                    target,
                    "function values only decode into ScriptFunction",
                ));
            }
            ScriptKind::Other(kind) => {
                tracing::warn!(script_kind = %kind, target, "unsupported type, decoding as null");
                serde_json::Value::Null
            }
        };

        serde_json::from_value(document).map_err(|err| ScriptError::conversion(target, err.to_string()))
    }
}

fn round_trip<'js, T: DeserializeOwned>(
    ctx: &Ctx<'js>,
    link: &SessionLink,
    value: Value<'js>,
    target: &'static str,
) -> Result<T> {
    link.count("json_round_trips");

    let json = ctx
        .json_stringify(value)
        .catch(ctx)
        .map_err(|caught| ScriptError::conversion(target, caught_message(caught)))?;
    let json = match json {
        Some(json) => json.to_string()?,
        // Nothing JSON can express
        None => "null".to_string(),
    };

    serde_json::from_str(&json).map_err(|err| ScriptError::conversion(target, err.to_string()))
}

impl FromScript for ScriptValue {
    fn from_script<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Result<Self> {
        Ok(ScriptValue::save(ctx, link, value))
    }
}

/// `null` and `undefined` decode to `None` instead of a handle.
impl FromScript for Option<ScriptValue> {
    fn from_script<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Result<Self> {
        if value.is_null() || value.is_undefined() {
            return Ok(None);
        }
        Ok(Some(ScriptValue::save(ctx, link, value)))
    }
}
