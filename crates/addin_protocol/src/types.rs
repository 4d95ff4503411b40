//! Core types for the Recalc add-in protocol.
//!
//! This module contains the data structures shared between the simulated
//! host and its add-ins:
//! - [`RegisterId`] - host-assigned numeric handle for a registration
//! - [`FunctionSpec`] - one row of the registration table (opaque metadata)
//! - [`CallingConvention`] - how a function hands off result storage
//! - [`Target`] - a dispatch target, by name or by cached identifier
//! - [`Registration`] - the full entry an add-in hands to the host

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::context::CallContext;
use crate::error::HostResult;
use crate::variant::Variant;

/// Host-assigned registration identifier, equivalent to the function name
/// for dispatch purposes and stable for the registration's lifetime.
///
/// Identifiers are assigned monotonically and never reused within a process
/// lifetime, even after the name is unregistered.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct RegisterId(pub u64);

impl std::fmt::Display for RegisterId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "id:{}", self.0)
    }
}

/// How a registered function hands off the storage backing its results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallingConvention {
    /// Results are tagged owned-by-callee; the receiver releases each one
    /// exactly once through the host.
    Managed,
    /// The function allocates and never tags or frees; nothing reclaims
    /// the storage, and live allocations grow with every call.
    Leaky,
}

impl CallingConvention {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Managed => "managed",
            Self::Leaky => "leaky",
        }
    }
}

/// One row of the registration table.
///
/// Everything here is opaque metadata passed through unchanged: the
/// type-signature string in particular (e.g. `"BBB$"`) declares
/// parameter/return kinds and the thread-safety flag in the host's own
/// notation and is never reinterpreted by the simulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub name: String,
    pub signature: String,
    #[serde(default)]
    pub arg_text: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub help_text: String,
}

impl FunctionSpec {
    pub fn new(name: impl Into<String>, signature: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            signature: signature.into(),
            arg_text: String::new(),
            category: String::new(),
            help_text: String::new(),
        }
    }

    #[must_use]
    pub fn with_args(mut self, arg_text: impl Into<String>) -> Self {
        self.arg_text = arg_text.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }

    #[must_use]
    pub fn with_help(mut self, help_text: impl Into<String>) -> Self {
        self.help_text = help_text.into();
        self
    }
}

/// A dispatch target: a function name, or the identifier captured when the
/// function was registered. Both must resolve to the identical callable.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Target {
    Name(String),
    Id(RegisterId),
}

impl From<&str> for Target {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<RegisterId> for Target {
    fn from(id: RegisterId) -> Self {
        Self::Id(id)
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Name(name) => write!(f, "'{name}'"),
            Self::Id(id) => write!(f, "{id}"),
        }
    }
}

/// The function body behind a registration.
///
/// Invoked synchronously on whichever worker thread dispatched the call;
/// the [`CallContext`] gives it re-entrant dispatch and allocator access
/// for the invocation's duration.
pub type Callable =
    Arc<dyn Fn(&CallContext<'_>, &[Variant]) -> HostResult<Variant> + Send + Sync>;

/// A complete registration entry an add-in hands to the host.
#[derive(Clone)]
pub struct Registration {
    pub spec: FunctionSpec,
    pub convention: CallingConvention,
    pub callable: Callable,
}

impl Registration {
    pub fn new<F>(spec: FunctionSpec, convention: CallingConvention, body: F) -> Self
    where
        F: Fn(&CallContext<'_>, &[Variant]) -> HostResult<Variant> + Send + Sync + 'static,
    {
        Self { spec, convention, callable: Arc::new(body) }
    }
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("spec", &self.spec)
            .field("convention", &self.convention)
            .finish_non_exhaustive()
    }
}

/// A dispatch outcome: the returned value plus the caller's release
/// obligation. When `must_release` is set the caller owns the value's
/// backing storage and must release it through the host exactly once;
/// otherwise it must not.
#[derive(Debug, Clone, PartialEq)]
pub struct Dispatched {
    pub value: Variant,
    pub must_release: bool,
}
