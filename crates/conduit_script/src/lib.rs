//! Conduit Scripting Bridge
//!
//! Embeds a QuickJS engine and moves values across the host/script boundary:
//! - Host data in, via `serde` (`Serialize` -> script value)
//! - Script values out, via `serde` (`DeserializeOwned` <- script value)
//! - Host types with callable members, via an explicit bindings manifest
//!   ([`HostClass`])
//! - Script functions out, as typed host delegates ([`ScriptFunction`])
//!
//! ## Architecture
//!
//! - **Session:** one runtime and context per [`Session`], single-threaded
//! - **Tasks:** continuations are drained to a fixpoint after every
//!   top-level `execute`
//! - **Handles:** [`ScriptValue`] and [`ScriptFunction`] index a
//!   session-owned table of engine references, released on drop or when the
//!   session goes
//!
//! ```ignore
//! let session = Session::new()?;
//! session.add_type::<SimpleClass>("SimpleClass")?;
//! let value = session.execute("var i = new SimpleClass(); i.Title = 'test1234'; i;")?;
//! let output: SimpleClass = session.decode(&value)?;
//! ```

macro_rules! count_args {
    () => { 0usize };
    ($head:ident $($tail:ident)*) => { 1usize + count_args!($($tail)*) };
}

pub mod binding;
pub mod callback;
pub mod config;
pub mod decode;
pub mod encode;
pub mod error;
mod handles;
pub mod naming;
pub mod session;
mod tasks;
pub mod value;

pub use binding::{HostClass, HostMethod, Methods, StaticMethod, Statics};
pub use callback::{ScriptArgs, ScriptFunction};
pub use config::{SessionOptions, DEFAULT_TASK_HOOK};
pub use decode::FromScript;
pub use error::{Result, ScriptError};
pub use naming::{Member, MemberMetadata};
pub use session::{Session, SessionLink};
pub use value::{ScriptKind, ScriptValue};

pub use rquickjs;

/// Bridge version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
