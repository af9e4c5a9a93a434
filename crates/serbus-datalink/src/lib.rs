//! Serial transport state machine for the serbus Modbus RTU client.

#![forbid(unsafe_code)]

use async_trait::async_trait;
use serbus_core::EncodeError;
use std::time::Duration;
use thiserror::Error;

mod buffer;
pub mod rtu;

pub use rtu::{RtuConfig, RtuTransport};
pub use tokio_serial::{DataBits, FlowControl, Parity, SerialStream, StopBits};

#[derive(Debug, Error)]
pub enum DataLinkError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid request frame: {0}")]
    Encode(#[from] EncodeError),
    #[error("request timed out")]
    Timeout,
    #[error("crc check failed")]
    Crc,
}

/// A single-transaction exchange capability: send one complete request frame,
/// return the first well-formed response frame that matches it.
///
/// One transaction is in flight per transport at any time; callers that share
/// a transport across tasks must serialize access themselves.
#[async_trait]
pub trait Transport: Send {
    async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, DataLinkError>;

    fn response_timeout(&self) -> Duration;

    fn set_response_timeout(&mut self, timeout: Duration);
}
