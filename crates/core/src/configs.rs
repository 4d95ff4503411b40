//! Configuration parsing for hammer scenarios.

pub mod scenario;
