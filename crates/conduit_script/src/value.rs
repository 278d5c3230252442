//! Script value handles
//!
//! Engine values are only usable inside an engine scope. [`ScriptValue`] keeps
//! one engine reference alive across scopes so host code can hold results,
//! pass parent objects back in, and decode later.

use crate::error::{Result, ScriptError};
use crate::handles::HandleId;
use crate::session::SessionLink;
use rquickjs::{Ctx, Persistent, Value};
use std::fmt;

/// Runtime kind of a script value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScriptKind {
    Undefined,
    Null,
    Boolean,
    Number,
    String,
    Object,
    Array,
    Function,
    /// Kinds the bridge does not model (symbols, big integers, ...).
    Other(String),
}

impl ScriptKind {
    /// Classify an engine value. Arrays and functions are objects to the
    /// engine, so they are checked first.
    pub fn of(value: &Value<'_>) -> Self {
        if value.is_undefined() {
            ScriptKind::Undefined
        } else if value.is_null() {
            ScriptKind::Null
        } else if value.is_bool() {
            ScriptKind::Boolean
        } else if value.is_int() || value.is_float() {
            ScriptKind::Number
        } else if value.is_string() {
            ScriptKind::String
        } else if value.is_array() {
            ScriptKind::Array
        } else if value.is_function() {
            ScriptKind::Function
        } else if value.is_object() {
            ScriptKind::Object
        } else {
            ScriptKind::Other(format!("{:?}", value.type_of()).to_lowercase())
        }
    }

    pub fn name(&self) -> &str {
        match self {
            ScriptKind::Undefined => "undefined",
            ScriptKind::Null => "null",
            ScriptKind::Boolean => "boolean",
            ScriptKind::Number => "number",
            ScriptKind::String => "string",
            ScriptKind::Object => "object",
            ScriptKind::Array => "array",
            ScriptKind::Function => "function",
            ScriptKind::Other(name) => name,
        }
    }
}

impl fmt::Display for ScriptKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Owned handle to a value living in a session's engine.
///
/// The engine reference itself lives in the session's handle table: taken on
/// creation, duplicated by `clone`, released on drop. Once the session is
/// disposed the handle is inert; restoring it fails with
/// [`ScriptError::Disposed`] and dropping it is a no-op.
pub struct ScriptValue {
    id: Option<HandleId>,
    kind: ScriptKind,
    link: SessionLink,
}

impl ScriptValue {
    pub(crate) fn save<'js>(ctx: &Ctx<'js>, link: &SessionLink, value: Value<'js>) -> Self {
        let kind = ScriptKind::of(&value);
        let id = link
            .upgrade()
            .ok()
            .map(|shared| shared.handles().insert(Persistent::save(ctx, value)));
        Self {
            id,
            kind,
            link: link.clone(),
        }
    }

    /// Bring the value back into an engine scope.
    pub(crate) fn restore<'js>(&self, ctx: &Ctx<'js>) -> Result<Value<'js>> {
        let shared = self.link.upgrade()?;
        let value = self
            .id
            .and_then(|id| shared.handles().get(id))
            .ok_or(ScriptError::Disposed)?;
        Ok(value.restore(ctx)?)
    }

    pub(crate) fn link(&self) -> &SessionLink {
        &self.link
    }

    pub fn kind(&self) -> &ScriptKind {
        &self.kind
    }

    pub fn is_undefined(&self) -> bool {
        self.kind == ScriptKind::Undefined
    }

    /// False once the owning session is gone.
    pub fn is_live(&self) -> bool {
        self.id.is_some() && self.link.is_alive()
    }
}

impl Clone for ScriptValue {
    fn clone(&self) -> Self {
        let id = match (self.id, self.link.upgrade()) {
            (Some(id), Ok(shared)) => {
                let handles = shared.handles();
                handles.get(id).map(|value| handles.insert(value))
            }
            _ => None,
        };
        Self {
            id,
            kind: self.kind.clone(),
            link: self.link.clone(),
        }
    }
}

impl Drop for ScriptValue {
    fn drop(&mut self) {
        let (Some(id), Ok(shared)) = (self.id.take(), self.link.upgrade()) else {
            return;
        };
        let released = shared.handles().remove(id);
        drop(released);
    }
}

impl fmt::Debug for ScriptValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScriptValue")
            .field("kind", &self.kind)
            .field("live", &self.is_live())
            .finish()
    }
}
