use crate::buffer::ReadBuffer;
use crate::{DataLinkError, Transport};
use async_trait::async_trait;
use serbus_core::frame::rtu::{crc16, MIN_FRAME_LEN};
use serbus_core::EncodeError;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::{timeout, Instant};
use tokio_serial::{DataBits, FlowControl, Parity, SerialPortBuilderExt, SerialStream, StopBits};
use tracing::trace;

const READ_CHUNK_LEN: usize = 256;
const EXCEPTION_FRAME_LEN: usize = 5;

/// How much of one response frame the buffered bytes account for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameLength {
    /// Too few bytes to classify the head yet.
    NeedMore,
    /// The head can never start a well-formed response frame.
    Unsupported,
    Known(usize),
}

/// Decide the total frame length from the function byte at offset 1 and, for
/// variable replies, the byte count that follows it.
fn response_frame_length(buf: &[u8]) -> FrameLength {
    if buf.len() < 2 {
        return FrameLength::NeedMore;
    }
    let function_byte = buf[1];
    if function_byte & 0x80 != 0 {
        return FrameLength::Known(EXCEPTION_FRAME_LEN);
    }
    match function_byte {
        0x05 | 0x06 | 0x0F | 0x10 => FrameLength::Known(8),
        0x16 => FrameLength::Known(10),
        0x01 | 0x02 | 0x03 | 0x04 | 0x14 | 0x15 | 0x17 => {
            if buf.len() < 3 {
                FrameLength::NeedMore
            } else {
                FrameLength::Known(3 + usize::from(buf[2]) + 2)
            }
        }
        0x18 => {
            if buf.len() < 4 {
                FrameLength::NeedMore
            } else {
                FrameLength::Known(4 + usize::from(u16::from_be_bytes([buf[2], buf[3]])) + 2)
            }
        }
        _ => FrameLength::Unsupported,
    }
}

#[derive(Debug, Clone)]
pub struct RtuConfig {
    pub response_timeout: Duration,
    pub parity: Parity,
    pub data_bits: DataBits,
    pub stop_bits: StopBits,
    pub flow_control: FlowControl,
}

impl Default for RtuConfig {
    fn default() -> Self {
        Self {
            response_timeout: Duration::from_millis(500),
            parity: Parity::None,
            data_bits: DataBits::Eight,
            stop_bits: StopBits::One,
            flow_control: FlowControl::None,
        }
    }
}

/// The RTU transport: one serial line, one receive buffer, one transaction at
/// a time. The buffer persists across transactions so a late or concatenated
/// frame is picked up by the next call.
#[derive(Debug)]
pub struct RtuTransport<T> {
    stream: T,
    buffer: ReadBuffer,
    response_timeout: Duration,
}

impl RtuTransport<SerialStream> {
    pub fn open(path: &str, baud_rate: u32, config: RtuConfig) -> Result<Self, DataLinkError> {
        let builder = tokio_serial::new(path, baud_rate)
            .parity(config.parity)
            .data_bits(config.data_bits)
            .stop_bits(config.stop_bits)
            .flow_control(config.flow_control);
        let stream = builder.open_native_async().map_err(|err| {
            DataLinkError::Io(std::io::Error::other(format!(
                "failed to open serial port '{path}': {err}"
            )))
        })?;
        Ok(Self::from_stream(stream, config))
    }
}

impl<T: AsyncRead + AsyncWrite + Unpin + Send> RtuTransport<T> {
    pub fn from_stream(stream: T, config: RtuConfig) -> Self {
        Self {
            stream,
            buffer: ReadBuffer::new(),
            response_timeout: config.response_timeout,
        }
    }

    pub fn response_timeout(&self) -> Duration {
        self.response_timeout
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.response_timeout = timeout;
    }

    /// Send a complete request ADU and return the first CRC-valid response
    /// frame whose unit id and function code match it.
    pub async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, DataLinkError> {
        if request.len() < MIN_FRAME_LEN {
            return Err(EncodeError::InvalidLength.into());
        }
        let expected_unit = request[0];
        let expected_function = request[1];

        self.stream.write_all(request).await?;
        self.stream.flush().await?;
        trace!(
            unit_id = expected_unit,
            function = expected_function,
            len = request.len(),
            "sent request frame"
        );

        let deadline = Instant::now() + self.response_timeout;
        loop {
            if let Some(frame) = self.extract_matching_frame(expected_unit, expected_function)? {
                return Ok(frame);
            }

            let Some(remaining) = deadline.checked_duration_since(Instant::now()) else {
                return Err(DataLinkError::Timeout);
            };
            let mut chunk = [0u8; READ_CHUNK_LEN];
            let count = match timeout(remaining, self.stream.read(&mut chunk)).await {
                Ok(Ok(count)) => count,
                Ok(Err(err)) => return Err(DataLinkError::Io(err)),
                Err(_) => return Err(DataLinkError::Timeout),
            };
            if count == 0 {
                // End of stream reads the same as a silent line.
                return Err(DataLinkError::Timeout);
            }
            self.buffer.extend(&chunk[..count]);
        }
    }

    fn extract_matching_frame(
        &mut self,
        expected_unit: u8,
        expected_function: u8,
    ) -> Result<Option<Vec<u8>>, DataLinkError> {
        loop {
            let len = match response_frame_length(self.buffer.as_slice()) {
                FrameLength::NeedMore => return Ok(None),
                FrameLength::Unsupported => {
                    self.buffer.consume(1);
                    continue;
                }
                FrameLength::Known(len) => len,
            };
            if self.buffer.len() < len {
                return Ok(None);
            }

            let frame = &self.buffer.as_slice()[..len];
            if crc16(frame) != 0 {
                if self.buffer.len() > len {
                    // A stray byte may have shifted the alignment; advance one
                    // byte and rescan rather than trusting the bad candidate.
                    trace!("crc mismatch, resynchronizing by one byte");
                    self.buffer.consume(1);
                    continue;
                }
                self.buffer.consume(len);
                return Err(DataLinkError::Crc);
            }

            let unit_id = frame[0];
            let function = frame[1] & 0x7F;
            if unit_id != expected_unit || function != expected_function & 0x7F {
                trace!(unit_id, function, "discarding frame for another transaction");
                self.buffer.consume(len);
                continue;
            }

            let frame = frame.to_vec();
            self.buffer.consume(len);
            trace!(unit_id, function, len, "received response frame");
            return Ok(Some(frame));
        }
    }
}

#[async_trait]
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Transport for RtuTransport<T> {
    async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, DataLinkError> {
        RtuTransport::transact(self, request).await
    }

    fn response_timeout(&self) -> Duration {
        RtuTransport::response_timeout(self)
    }

    fn set_response_timeout(&mut self, timeout: Duration) {
        RtuTransport::set_response_timeout(self, timeout);
    }
}
