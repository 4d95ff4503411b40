//! Demonstration add-ins for the Recalc dispatch simulator.
//!
//! Two add-ins probe correctness and crash scenarios under concurrent
//! recalculation:
//!
//! - [`MultithreadAddin`] - nested re-entrant calls by name and by cached
//!   identifier, private vs. deliberately shared argument storage, and the
//!   leaky vs. managed result-ownership conventions.
//! - [`ThreadSafeAddin`] - thread-identity payloads, owned text and array
//!   results, and nested thread-info calls.
//!
//! The function bodies are thin payloads; the point is what they carry
//! through the protocol, not the arithmetic.

pub mod multithread;
pub mod threadsafe;

pub use multithread::MultithreadAddin;
pub use threadsafe::ThreadSafeAddin;
