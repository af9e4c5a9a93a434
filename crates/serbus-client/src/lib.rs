//! High-level Modbus RTU client for serial field devices.

#![forbid(unsafe_code)]

pub mod sync;

pub use sync::{SyncClientError, SyncRtuClient};

use serbus_core::encoding::{Reader, Writer};
use serbus_core::frame::rtu::{
    self as rtu_frame, MAX_FRAME_LEN, MAX_PDU_LEN, UNIT_ID_MAX, UNIT_ID_MIN,
};
use serbus_core::pdu::{
    FunctionCode, MaskWriteRegisterRequest, ReadCoilsRequest, ReadDiscreteInputsRequest,
    ReadFifoQueueRequest, ReadFileRecordRequest, ReadHoldingRegistersRequest,
    ReadInputRegistersRequest, ReadWriteMultipleRegistersRequest, Request, Response,
    WriteFileRecordRequest, WriteMultipleCoilsRequest, WriteMultipleRegistersRequest,
    WriteSingleCoilRequest, WriteSingleRegisterRequest,
};
use serbus_core::{DecodeError, EncodeError};
use serbus_datalink::DataLinkError;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

pub use serbus_core::pdu::ExceptionCode;
pub use serbus_datalink::{
    DataBits, FlowControl, Parity, RtuConfig, RtuTransport, SerialStream, StopBits, Transport,
};

const DEFAULT_UNIT_ID: u8 = 1;

/// The failure modes a transaction can surface.
#[derive(Debug, Error)]
pub enum Error {
    /// A request builder rejected its inputs before anything hit the wire.
    #[error("invalid argument: {0}")]
    InvalidArgument(EncodeError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("request timed out")]
    Timeout,
    #[error("crc check failed")]
    Crc,
    /// The device answered with `fc | 0x80`; the message lives on the code.
    #[error("device exception: {0}")]
    Exception(ExceptionCode),
    #[error("unexpected function code in response")]
    UnexpectedFunctionCode,
    #[error("malformed response: {0}")]
    Malformed(&'static str),
}

impl From<EncodeError> for Error {
    fn from(err: EncodeError) -> Self {
        Self::InvalidArgument(err)
    }
}

impl From<DecodeError> for Error {
    fn from(err: DecodeError) -> Self {
        match err {
            DecodeError::InvalidCrc => Self::Crc,
            DecodeError::UnexpectedFunctionCode => Self::UnexpectedFunctionCode,
            DecodeError::UnexpectedEof => Self::Malformed("response truncated"),
            DecodeError::InvalidLength => Self::Malformed("inconsistent length field"),
            DecodeError::InvalidValue => Self::Malformed("invalid field value"),
        }
    }
}

impl From<DataLinkError> for Error {
    fn from(err: DataLinkError) -> Self {
        match err {
            DataLinkError::Io(err) => Self::Io(err),
            DataLinkError::Encode(err) => Self::InvalidArgument(err),
            DataLinkError::Timeout => Self::Timeout,
            DataLinkError::Crc => Self::Crc,
        }
    }
}

/// Decoded bit payload plus the raw response frame it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BitValues {
    pub values: Vec<bool>,
    pub raw: Vec<u8>,
}

/// Decoded register payload plus the raw response frame it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WordValues {
    pub values: Vec<u16>,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoilWriteEcho {
    pub address: u16,
    pub value: bool,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegisterWriteEcho {
    pub address: u16,
    pub value: u16,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MultiWriteEcho {
    pub start_address: u16,
    pub quantity: u16,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaskWriteEcho {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
    pub raw: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileWriteEcho {
    pub file_number: u16,
    pub record_number: u16,
    pub record_length: u16,
    pub raw: Vec<u8>,
}

fn decode_response(expected: FunctionCode, raw: &[u8]) -> Result<Response<'_>, Error> {
    let (_, pdu) = rtu_frame::decode_frame(raw)?;
    let mut r = Reader::new(pdu);
    let response = Response::decode(expected, &mut r)?;
    if !r.is_empty() {
        return Err(Error::Malformed("trailing bytes in response frame"));
    }
    if let Response::Exception(ex) = response {
        return Err(Error::Exception(ex.exception_code));
    }
    Ok(response)
}

fn collect_bits(data: &serbus_core::pdu::BitsResponse<'_>, quantity: u16) -> Result<Vec<bool>, Error> {
    let count = usize::from(quantity);
    if data.data.len() * 8 < count {
        return Err(Error::Malformed("bit payload shorter than requested"));
    }
    Ok((0..count).filter_map(|index| data.bit(index)).collect())
}

fn collect_registers(
    data: &serbus_core::pdu::RegistersResponse<'_>,
    quantity: u16,
) -> Result<Vec<u16>, Error> {
    let count = usize::from(quantity);
    if data.register_count() < count {
        return Err(Error::Malformed("register payload shorter than requested"));
    }
    Ok((0..count).filter_map(|index| data.register(index)).collect())
}

/// A Modbus RTU client bound to one unit id and one transport.
///
/// Each operation is a single transaction: build the request, exchange it,
/// decode the matching reply. The client never retries; callers that want
/// retry wrap it.
pub struct RtuClient<T: Transport> {
    transport: T,
    unit_id: u8,
}

impl<T: Transport> RtuClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            unit_id: DEFAULT_UNIT_ID,
        }
    }

    pub fn unit_id(&self) -> u8 {
        self.unit_id
    }

    pub fn set_unit_id(&mut self, unit_id: u8) -> Result<(), Error> {
        if !(UNIT_ID_MIN..=UNIT_ID_MAX).contains(&unit_id) {
            return Err(Error::InvalidArgument(EncodeError::ValueOutOfRange));
        }
        self.unit_id = unit_id;
        Ok(())
    }

    pub fn response_timeout(&self) -> Duration {
        self.transport.response_timeout()
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.transport.set_response_timeout(timeout);
    }

    /// Consume the client and close the underlying transport.
    pub fn close(self) {}

    async fn transact(&mut self, request: &Request<'_>) -> Result<Vec<u8>, Error> {
        let mut pdu = [0u8; MAX_PDU_LEN];
        let mut w = Writer::new(&mut pdu);
        request.encode(&mut w)?;

        let mut adu = [0u8; MAX_FRAME_LEN];
        let mut fw = Writer::new(&mut adu);
        rtu_frame::encode_frame(&mut fw, self.unit_id, w.as_written())?;

        debug!(
            unit_id = self.unit_id,
            function = request.function_code().as_u8(),
            len = fw.as_written().len(),
            "dispatching request"
        );
        Ok(self.transport.transact(fw.as_written()).await?)
    }

    pub async fn read_coils(&mut self, address: u16, quantity: u16) -> Result<BitValues, Error> {
        let request = Request::ReadCoils(ReadCoilsRequest {
            start_address: address,
            quantity,
        });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadCoils, &raw)? {
            Response::Bits(data) => collect_bits(&data, quantity)?,
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(BitValues { values, raw })
    }

    pub async fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<BitValues, Error> {
        let request = Request::ReadDiscreteInputs(ReadDiscreteInputsRequest {
            start_address: address,
            quantity,
        });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadDiscreteInputs, &raw)? {
            Response::Bits(data) => collect_bits(&data, quantity)?,
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(BitValues { values, raw })
    }

    pub async fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<WordValues, Error> {
        let request = Request::ReadHoldingRegisters(ReadHoldingRegistersRequest {
            start_address: address,
            quantity,
        });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadHoldingRegisters, &raw)? {
            Response::Registers(data) => collect_registers(&data, quantity)?,
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(WordValues { values, raw })
    }

    pub async fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<WordValues, Error> {
        let request = Request::ReadInputRegisters(ReadInputRegistersRequest {
            start_address: address,
            quantity,
        });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadInputRegisters, &raw)? {
            Response::Registers(data) => collect_registers(&data, quantity)?,
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(WordValues { values, raw })
    }

    pub async fn write_coil(&mut self, address: u16, value: bool) -> Result<CoilWriteEcho, Error> {
        let request = Request::WriteSingleCoil(WriteSingleCoilRequest { address, value });
        let raw = self.transact(&request).await?;
        match decode_response(FunctionCode::WriteSingleCoil, &raw)? {
            Response::WriteSingleCoil(resp) if resp.address == address && resp.value == value => {
                Ok(CoilWriteEcho {
                    address,
                    value,
                    raw,
                })
            }
            Response::WriteSingleCoil(_) => Err(Error::Malformed("write coil echo mismatch")),
            _ => Err(Error::Malformed("unexpected response variant")),
        }
    }

    pub async fn write_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<RegisterWriteEcho, Error> {
        let request = Request::WriteSingleRegister(WriteSingleRegisterRequest { address, value });
        let raw = self.transact(&request).await?;
        match decode_response(FunctionCode::WriteSingleRegister, &raw)? {
            Response::WriteSingleRegister(resp)
                if resp.address == address && resp.value == value =>
            {
                Ok(RegisterWriteEcho {
                    address,
                    value,
                    raw,
                })
            }
            Response::WriteSingleRegister(_) => {
                Err(Error::Malformed("write register echo mismatch"))
            }
            _ => Err(Error::Malformed("unexpected response variant")),
        }
    }

    pub async fn write_coils(
        &mut self,
        address: u16,
        values: &[bool],
    ) -> Result<MultiWriteEcho, Error> {
        let body = WriteMultipleCoilsRequest {
            start_address: address,
            values,
        };
        let quantity = body.quantity()?;
        let request = Request::WriteMultipleCoils(body);
        let raw = self.transact(&request).await?;
        match decode_response(FunctionCode::WriteMultipleCoils, &raw)? {
            Response::WriteMultiple(resp)
                if resp.start_address == address && resp.quantity == quantity =>
            {
                Ok(MultiWriteEcho {
                    start_address: address,
                    quantity,
                    raw,
                })
            }
            Response::WriteMultiple(_) => Err(Error::Malformed("write coils echo mismatch")),
            _ => Err(Error::Malformed("unexpected response variant")),
        }
    }

    pub async fn write_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<MultiWriteEcho, Error> {
        let body = WriteMultipleRegistersRequest {
            start_address: address,
            values,
        };
        let quantity = body.quantity()?;
        let request = Request::WriteMultipleRegisters(body);
        let raw = self.transact(&request).await?;
        match decode_response(FunctionCode::WriteMultipleRegisters, &raw)? {
            Response::WriteMultiple(resp)
                if resp.start_address == address && resp.quantity == quantity =>
            {
                Ok(MultiWriteEcho {
                    start_address: address,
                    quantity,
                    raw,
                })
            }
            Response::WriteMultiple(_) => Err(Error::Malformed("write registers echo mismatch")),
            _ => Err(Error::Malformed("unexpected response variant")),
        }
    }

    pub async fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<MaskWriteEcho, Error> {
        let request = Request::MaskWriteRegister(MaskWriteRegisterRequest {
            address,
            and_mask,
            or_mask,
        });
        let raw = self.transact(&request).await?;
        match decode_response(FunctionCode::MaskWriteRegister, &raw)? {
            Response::MaskWriteRegister(resp)
                if resp.address == address
                    && resp.and_mask == and_mask
                    && resp.or_mask == or_mask =>
            {
                Ok(MaskWriteEcho {
                    address,
                    and_mask,
                    or_mask,
                    raw,
                })
            }
            Response::MaskWriteRegister(_) => {
                Err(Error::Malformed("mask write register echo mismatch"))
            }
            _ => Err(Error::Malformed("unexpected response variant")),
        }
    }

    pub async fn read_write_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: &[u16],
    ) -> Result<WordValues, Error> {
        let request = Request::ReadWriteMultipleRegisters(ReadWriteMultipleRegistersRequest {
            read_start_address: read_address,
            read_quantity,
            write_start_address: write_address,
            values,
        });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadWriteMultipleRegisters, &raw)? {
            Response::Registers(data) => collect_registers(&data, read_quantity)?,
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(WordValues { values, raw })
    }

    pub async fn read_file_record(
        &mut self,
        file_number: u16,
        record_number: u16,
        record_length: u16,
    ) -> Result<WordValues, Error> {
        let request = Request::ReadFileRecord(ReadFileRecordRequest {
            file_number,
            record_number,
            record_length,
        });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadFileRecord, &raw)? {
            Response::FileRecords(data) => {
                let count = usize::from(record_length);
                if data.register_count() < count {
                    return Err(Error::Malformed("file record payload shorter than requested"));
                }
                (0..count).filter_map(|index| data.register(index)).collect()
            }
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(WordValues { values, raw })
    }

    pub async fn write_file_record(
        &mut self,
        file_number: u16,
        record_number: u16,
        values: &[u16],
    ) -> Result<FileWriteEcho, Error> {
        let body = WriteFileRecordRequest {
            file_number,
            record_number,
            values,
        };
        let record_length = body.record_length()?;
        let request = Request::WriteFileRecord(body);
        let raw = self.transact(&request).await?;
        match decode_response(FunctionCode::WriteFileRecord, &raw)? {
            Response::WriteFileRecord(resp) => {
                let echo_matches = resp.file_number == file_number
                    && resp.record_number == record_number
                    && resp.record_length() == usize::from(record_length)
                    && values
                        .iter()
                        .enumerate()
                        .all(|(index, value)| resp.register(index) == Some(*value));
                if !echo_matches {
                    return Err(Error::Malformed("write file record echo mismatch"));
                }
                Ok(FileWriteEcho {
                    file_number,
                    record_number,
                    record_length,
                    raw,
                })
            }
            _ => Err(Error::Malformed("unexpected response variant")),
        }
    }

    pub async fn read_fifo_queue(&mut self, address: u16) -> Result<WordValues, Error> {
        let request = Request::ReadFifoQueue(ReadFifoQueueRequest { address });
        let raw = self.transact(&request).await?;
        let values = match decode_response(FunctionCode::ReadFifoQueue, &raw)? {
            Response::FifoQueue(data) => (0..data.register_count())
                .filter_map(|index| data.register(index))
                .collect(),
            _ => return Err(Error::Malformed("unexpected response variant")),
        };
        Ok(WordValues { values, raw })
    }
}

#[cfg(test)]
mod tests {
    use super::{Error, ExceptionCode, RtuClient, Transport};
    use async_trait::async_trait;
    use serbus_core::encoding::Writer;
    use serbus_core::frame::rtu as rtu_frame;
    use serbus_core::EncodeError;
    use serbus_datalink::DataLinkError;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn frame(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        rtu_frame::encode_frame(&mut w, unit_id, pdu).unwrap();
        w.as_written().to_vec()
    }

    struct MockTransport {
        responses: VecDeque<Result<Vec<u8>, DataLinkError>>,
        requests: Arc<Mutex<Vec<Vec<u8>>>>,
        timeout: Duration,
    }

    impl MockTransport {
        fn new(
            responses: Vec<Result<Vec<u8>, DataLinkError>>,
        ) -> (Self, Arc<Mutex<Vec<Vec<u8>>>>) {
            let requests = Arc::new(Mutex::new(Vec::new()));
            (
                Self {
                    responses: responses.into(),
                    requests: requests.clone(),
                    timeout: Duration::from_millis(500),
                },
                requests,
            )
        }
    }

    #[async_trait]
    impl Transport for MockTransport {
        async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, DataLinkError> {
            self.requests.lock().unwrap().push(request.to_vec());
            self.responses.pop_front().expect("no scripted response")
        }

        fn response_timeout(&self) -> Duration {
            self.timeout
        }

        fn set_response_timeout(&mut self, timeout: Duration) {
            self.timeout = timeout;
        }
    }

    /// A bank of holding registers behind a well-behaved FC 03 responder.
    struct RegisterBank {
        registers: Vec<u16>,
        timeout: Duration,
    }

    #[async_trait]
    impl Transport for RegisterBank {
        async fn transact(&mut self, request: &[u8]) -> Result<Vec<u8>, DataLinkError> {
            let (unit_id, pdu) = rtu_frame::decode_frame(request).unwrap();
            assert_eq!(pdu[0], 0x03);
            let start = usize::from(u16::from_be_bytes([pdu[1], pdu[2]]));
            let quantity = usize::from(u16::from_be_bytes([pdu[3], pdu[4]]));

            let mut body = vec![0x03, (quantity * 2) as u8];
            for value in &self.registers[start..start + quantity] {
                body.extend_from_slice(&value.to_be_bytes());
            }
            Ok(frame(unit_id, &body))
        }

        fn response_timeout(&self) -> Duration {
            self.timeout
        }

        fn set_response_timeout(&mut self, timeout: Duration) {
            self.timeout = timeout;
        }
    }

    fn client_with(
        responses: Vec<Result<Vec<u8>, DataLinkError>>,
    ) -> (RtuClient<MockTransport>, Arc<Mutex<Vec<Vec<u8>>>>) {
        let (transport, requests) = MockTransport::new(responses);
        (RtuClient::new(transport), requests)
    }

    #[tokio::test]
    async fn read_holding_registers_success() {
        let reply = frame(1, &[0x03, 0x04, 0x12, 0x34, 0xAB, 0xCD]);
        let (mut client, requests) = client_with(vec![Ok(reply.clone())]);

        let result = client.read_holding_registers(0, 2).await.unwrap();
        assert_eq!(result.values, vec![0x1234, 0xABCD]);
        assert_eq!(result.raw, reply);

        let sent = requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(&sent[0][..6], &[0x01, 0x03, 0x00, 0x00, 0x00, 0x02]);
    }

    #[tokio::test]
    async fn register_bank_serves_reads() {
        let bank = RegisterBank {
            registers: (0..64).collect(),
            timeout: Duration::from_millis(500),
        };
        let mut client = RtuClient::new(bank);

        let result = client.read_holding_registers(0, 2).await.unwrap();
        assert_eq!(result.values, vec![0x0000, 0x0001]);

        let result = client.read_holding_registers(60, 4).await.unwrap();
        assert_eq!(result.values, vec![60, 61, 62, 63]);
    }

    #[tokio::test]
    async fn exception_reply_is_mapped_with_message() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x83, 0x02]))]);

        let err = client.read_holding_registers(0, 1).await.unwrap_err();
        match err {
            Error::Exception(code) => {
                assert_eq!(code, ExceptionCode::IllegalDataAddress);
                assert_eq!(code.as_u8(), 0x02);
                assert_eq!(code.to_string(), "Illegal Data Address");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn read_coils_truncates_to_requested_quantity() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x01, 0x01, 0b0001_0101]))]);

        let result = client.read_coils(0, 3).await.unwrap();
        assert_eq!(result.values, vec![true, false, true]);
    }

    #[tokio::test]
    async fn read_discrete_inputs_rejects_short_payload() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x02, 0x01, 0b0000_1111]))]);

        let err = client.read_discrete_inputs(0, 9).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Malformed("bit payload shorter than requested")
        ));
    }

    #[tokio::test]
    async fn write_coil_round_trip() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x05, 0x00, 0x02, 0xFF, 0x00]))]);

        let result = client.write_coil(0x0002, true).await.unwrap();
        assert_eq!(result.address, 0x0002);
        assert!(result.value);
    }

    #[tokio::test]
    async fn write_register_echo_mismatch_is_rejected() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x06, 0x00, 0x01, 0x00, 0x2B]))]);

        let err = client.write_register(0x0001, 0x2A).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Malformed("write register echo mismatch")
        ));
    }

    #[tokio::test]
    async fn write_coils_verifies_quantity_echo() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x0F, 0x00, 0x10, 0x00, 0x03]))]);
        let result = client
            .write_coils(0x0010, &[true, false, true])
            .await
            .unwrap();
        assert_eq!(result.start_address, 0x0010);
        assert_eq!(result.quantity, 3);

        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x0F, 0x00, 0x10, 0x00, 0x02]))]);
        let err = client
            .write_coils(0x0010, &[true, false, true])
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Malformed("write coils echo mismatch")));
    }

    #[tokio::test]
    async fn write_registers_round_trip() {
        let (mut client, requests) = client_with(vec![Ok(frame(1, &[0x10, 0x00, 0x08, 0x00, 0x02]))]);

        let result = client.write_registers(0x0008, &[0x0102, 0x0304]).await.unwrap();
        assert_eq!(result.quantity, 2);

        let sent = requests.lock().unwrap();
        assert_eq!(
            &sent[0][..10],
            &[0x01, 0x10, 0x00, 0x08, 0x00, 0x02, 0x04, 0x01, 0x02, 0x03]
        );
    }

    #[tokio::test]
    async fn mask_write_register_round_trip() {
        let (mut client, _) =
            client_with(vec![Ok(frame(1, &[0x16, 0x00, 0x04, 0xFF, 0x00, 0x00, 0x12]))]);

        let result = client
            .mask_write_register(0x0004, 0xFF00, 0x0012)
            .await
            .unwrap();
        assert_eq!(result.and_mask, 0xFF00);
        assert_eq!(result.or_mask, 0x0012);
    }

    #[tokio::test]
    async fn read_write_registers_round_trip() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x17, 0x04, 0x12, 0x34, 0xAB, 0xCD]))]);

        let result = client
            .read_write_registers(0x0010, 2, 0x0020, &[0x0102, 0x0304])
            .await
            .unwrap();
        assert_eq!(result.values, vec![0x1234, 0xABCD]);
    }

    #[tokio::test]
    async fn read_file_record_round_trip() {
        let (mut client, _) =
            client_with(vec![Ok(frame(1, &[0x14, 0x06, 0x05, 0x06, 0x0D, 0xFE, 0x00, 0x20]))]);

        let result = client.read_file_record(4, 1, 2).await.unwrap();
        assert_eq!(result.values, vec![0x0DFE, 0x0020]);
    }

    #[tokio::test]
    async fn write_file_record_round_trip() {
        let echo = [
            0x15, 0x0D, 0x06, 0x00, 0x04, 0x00, 0x07, 0x00, 0x03, 0x06, 0xAF, 0x04, 0xBE, 0x10,
            0x0D,
        ];
        let (mut client, _) = client_with(vec![Ok(frame(1, &echo))]);

        let result = client
            .write_file_record(4, 7, &[0x06AF, 0x04BE, 0x100D])
            .await
            .unwrap();
        assert_eq!(result.file_number, 4);
        assert_eq!(result.record_number, 7);
        assert_eq!(result.record_length, 3);
    }

    #[tokio::test]
    async fn write_file_record_echo_mismatch_is_rejected() {
        let echo = [
            0x15, 0x0D, 0x06, 0x00, 0x04, 0x00, 0x07, 0x00, 0x03, 0x06, 0xAF, 0x04, 0xBE, 0x10,
            0x0E,
        ];
        let (mut client, _) = client_with(vec![Ok(frame(1, &echo))]);

        let err = client
            .write_file_record(4, 7, &[0x06AF, 0x04BE, 0x100D])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::Malformed("write file record echo mismatch")
        ));
    }

    #[tokio::test]
    async fn read_fifo_queue_round_trip() {
        let (mut client, _) = client_with(vec![Ok(frame(
            1,
            &[0x18, 0x00, 0x06, 0x00, 0x02, 0x01, 0xB8, 0x12, 0x84],
        ))]);

        let result = client.read_fifo_queue(0x04DE).await.unwrap();
        assert_eq!(result.values, vec![0x01B8, 0x1284]);
    }

    #[tokio::test]
    async fn invalid_quantity_never_reaches_the_wire() {
        let (mut client, requests) = client_with(vec![]);

        let err = client.read_holding_registers(0, 126).await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidArgument(EncodeError::ValueOutOfRange)
        ));
        assert!(requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unit_id_is_validated_and_applied() {
        let (mut client, requests) = client_with(vec![Ok(frame(9, &[0x03, 0x02, 0x00, 0x2A]))]);

        assert!(client.set_unit_id(0).is_err());
        assert!(client.set_unit_id(248).is_err());
        client.set_unit_id(9).unwrap();
        assert_eq!(client.unit_id(), 9);

        let result = client.read_holding_registers(0, 1).await.unwrap();
        assert_eq!(result.values, vec![0x2A]);
        assert_eq!(requests.lock().unwrap()[0][0], 9);
    }

    #[tokio::test]
    async fn transport_timeout_is_propagated() {
        let (mut client, _) = client_with(vec![Err(DataLinkError::Timeout)]);

        let err = client.read_holding_registers(0, 1).await.unwrap_err();
        assert!(matches!(err, Error::Timeout));
    }

    #[tokio::test]
    async fn stray_function_code_is_surfaced() {
        // The transport filter normally prevents this; parsing directly must
        // still classify it correctly.
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x03, 0x02, 0x00, 0x2A]))]);

        let err = client.write_register(0, 1).await.unwrap_err();
        assert!(matches!(err, Error::UnexpectedFunctionCode));
    }

    #[tokio::test]
    async fn trailing_bytes_are_rejected() {
        let (mut client, _) = client_with(vec![Ok(frame(1, &[0x06, 0x00, 0x01, 0x00, 0x2A, 0xFF]))]);

        let err = client.write_register(0x0001, 0x2A).await.unwrap_err();
        assert!(matches!(
            err,
            Error::Malformed("trailing bytes in response frame")
        ));
    }

    #[tokio::test]
    async fn response_timeout_is_forwarded() {
        let (mut client, _) = client_with(vec![]);
        client.set_response_timeout(Duration::from_millis(250));
        assert_eq!(client.response_timeout(), Duration::from_millis(250));
    }
}
