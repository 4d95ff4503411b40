//! Protocol definitions shared between the Recalc host simulator and its
//! add-in plugins.
//!
//! The crate defines the wire-level value type ([`Variant`] and its
//! ownership tag), the registration metadata ([`FunctionSpec`],
//! [`Registration`], [`RegisterId`]), the dispatch vocabulary ([`Target`],
//! [`Dispatched`], [`CallContext`]), and the two traits that tie host and
//! add-ins together ([`HostApi`], [`Addin`]). It contains no host logic:
//! the simulator lives in `recalc_core`.

pub mod context;
pub mod error;
pub mod traits;
pub mod types;
pub mod variant;

pub use context::{CallContext, ThreadCache};
pub use error::{HostError, HostResult};
pub use traits::{Addin, HostApi};
pub use types::{
    Callable, CallingConvention, Dispatched, FunctionSpec, RegisterId, Registration, Target,
};
pub use variant::{AllocId, AllocKind, ErrorCode, Variant, VariantData, WideString, MAX_TEXT_UNITS};
