//! Recalc Core Library
//!
//! This is the core library for the Recalc callback-dispatch simulator. It
//! provides the stand-in host the demonstration add-ins run against:
//! registration, re-entrant dispatch, allocation bookkeeping, and the
//! worker-thread harness that reproduces concurrent recalculation.
//!
//! ## Architecture
//!
//! The core library is organized into several modules:
//!
//! - [`host`] - the simulated host process and its callback surface
//! - [`registry`] - function registration table (name <-> identifier)
//! - [`dispatch`] - the re-entrant call path
//! - [`alloc`] - allocator discipline and leak/double-free bookkeeping
//! - [`thread_store`] - thread-keyed argument caches and the shared slot
//! - [`harness`] - worker-thread hammer harness
//! - [`configs`] - scenario file parsing for the hammer driver
//! - [`types`] - common error types and type aliases
//!
//! ## Usage
//!
//! ```rust
//! use recalc_addin_protocol::{HostApi, Target, Variant};
//! use recalc_core::Host;
//!
//! # fn example(addin: &dyn recalc_addin_protocol::Addin) -> recalc_core::types::HostResult<()> {
//! let host = Host::new();
//! host.load(addin)?;
//!
//! let result = host.dispatch(&Target::from("AddInner"), &[Variant::num(2.0), Variant::num(3.0)])?;
//! if result.must_release {
//!     host.free(&result.value);
//! }
//! # Ok(())
//! # }
//! ```

pub mod alloc;
pub mod configs;
pub mod dispatch;
pub mod harness;
pub mod host;
pub mod registry;
pub mod thread_store;
pub mod types;

// Re-export the main types for easier usage
pub use host::Host;
pub use types::{RecalcError, RecalcResult};
