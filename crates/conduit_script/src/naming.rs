// naming.rs - Script-visible names for host members
//
// A member is exposed under its explicit name when one was declared,
// otherwise under its declared identifier. Nothing is normalized and
// collisions are not detected: the later property write wins.
//
// Data members are named by serde: `#[serde(rename = "...")]` is their
// explicit name, so the keys of a serialized composite are already resolved.

use std::borrow::Cow;

/// What a member carries across the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemberKind {
    Data,
    Callable,
}

/// Whether a member belongs to the type or to an instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Origin {
    Static,
    Instance,
}

/// Naming metadata for a host member.
pub trait MemberMetadata {
    /// Identifier the member was declared with on the host side.
    fn declared_name(&self) -> &str;

    /// Explicit exposed-name override, if one was declared.
    fn explicit_name(&self) -> Option<&str>;

    fn has_explicit_name(&self) -> bool {
        self.explicit_name().is_some()
    }
}

/// Resolve the name a member is exposed under.
pub fn resolve<M: MemberMetadata + ?Sized>(member: &M) -> &str {
    member.explicit_name().unwrap_or_else(|| member.declared_name())
}

/// A host member as declared in a bindings manifest.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Member {
    ident: Cow<'static, str>,
    explicit: Option<&'static str>,
    kind: MemberKind,
    origin: Origin,
}

impl Member {
    pub fn callable(ident: &'static str, origin: Origin) -> Self {
        Self {
            ident: Cow::Borrowed(ident),
            explicit: None,
            kind: MemberKind::Callable,
            origin,
        }
    }

    /// A data member keyed by its serialized field name.
    pub fn data(ident: impl Into<Cow<'static, str>>) -> Self {
        Self {
            ident: ident.into(),
            explicit: None,
            kind: MemberKind::Data,
            origin: Origin::Instance,
        }
    }

    /// Expose the member under `name` instead of its identifier.
    pub fn renamed(mut self, name: &'static str) -> Self {
        self.explicit = Some(name);
        self
    }

    pub fn kind(&self) -> MemberKind {
        self.kind
    }

    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Shorthand for [`resolve`].
    pub fn resolved(&self) -> &str {
        resolve(self)
    }
}

impl MemberMetadata for Member {
    fn declared_name(&self) -> &str {
        &self.ident
    }

    fn explicit_name(&self) -> Option<&str> {
        self.explicit
    }
}
