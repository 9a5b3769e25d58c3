//! Control plane for a high-rate network traffic generator: remote script
//! execution over TCP, address parsing and deterministic field
//! randomization. The packet I/O core consumes this crate.

/// Textual IPv4/IPv6 and CIDR parsing
pub mod addr;
/// Control plane configuration
pub mod config;
/// Remote script execution over TCP
pub mod control;
/// Script interpretation against the generator state
pub mod engine;
/// Deterministic pseudo-random stream and random bitfields
pub mod rnd;

#[doc(hidden)]
/// Structures used throughout the library
pub mod structs;

#[doc(inline)]
pub use structs::*;
