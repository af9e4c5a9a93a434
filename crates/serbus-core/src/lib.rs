//! Modbus RTU protocol encoding and decoding in pure Rust.
//!
//! `serbus-core` provides zero-copy, `no_std`-compatible construction of
//! request PDUs, parsing of response PDUs, and RTU ADU framing with the
//! Modbus CRC-16 trailer.

#![cfg_attr(not(feature = "std"), no_std)]
#![forbid(unsafe_code)]

#[cfg(feature = "std")]
extern crate std;

pub mod encoding;
pub mod error;
pub mod frame;
pub mod pdu;

pub use error::{DecodeError, EncodeError};
