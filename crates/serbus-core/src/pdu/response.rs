use crate::encoding::Reader;
use crate::pdu::request::{
    FILE_REFERENCE_TYPE, MAX_FILE_RECORD_WORDS, MAX_READ_REGISTERS, MAX_WRITE_COILS,
    MAX_WRITE_REGISTERS,
};
use crate::pdu::{ExceptionResponse, FunctionCode};
use crate::DecodeError;

const MAX_FIFO_COUNT: u16 = 31;

fn validate_echo_quantity(quantity: u16, max: u16) -> Result<(), DecodeError> {
    if quantity == 0 || quantity > max {
        return Err(DecodeError::InvalidValue);
    }
    Ok(())
}

fn register_at(data: &[u8], index: usize) -> Option<u16> {
    let offset = index.checked_mul(2)?;
    let bytes = data.get(offset..offset + 2)?;
    Some(u16::from_be_bytes([bytes[0], bytes[1]]))
}

/// Packed bit payload shared by the Read Coils and Read Discrete Inputs replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BitsResponse<'a> {
    pub data: &'a [u8],
}

impl<'a> BitsResponse<'a> {
    fn decode_body(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let byte_count = usize::from(r.read_u8()?);
        if byte_count == 0 {
            return Err(DecodeError::InvalidLength);
        }
        let data = r.read_exact(byte_count)?;
        Ok(Self { data })
    }

    pub fn bit(&self, index: usize) -> Option<bool> {
        let byte = self.data.get(index / 8)?;
        Some((byte & (1u8 << (index % 8))) != 0)
    }
}

/// Register payload shared by the FC 03/04 replies and the FC 17 reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegistersResponse<'a> {
    pub data: &'a [u8],
}

impl<'a> RegistersResponse<'a> {
    fn decode_body(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let byte_count = usize::from(r.read_u8()?);
        if byte_count == 0 || (byte_count % 2) != 0 {
            return Err(DecodeError::InvalidLength);
        }
        if byte_count > usize::from(MAX_READ_REGISTERS) * 2 {
            return Err(DecodeError::InvalidLength);
        }
        let data = r.read_exact(byte_count)?;
        Ok(Self { data })
    }

    pub fn register_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        register_at(self.data, index)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleCoilResponse {
    pub address: u16,
    pub value: bool,
}

impl WriteSingleCoilResponse {
    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        let address = r.read_be_u16()?;
        let value = match r.read_be_u16()? {
            0xFF00 => true,
            0x0000 => false,
            _ => return Err(DecodeError::InvalidValue),
        };
        Ok(Self { address, value })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRegisterResponse {
    pub address: u16,
    pub value: u16,
}

impl WriteSingleRegisterResponse {
    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            address: r.read_be_u16()?,
            value: r.read_be_u16()?,
        })
    }
}

/// Start address and quantity echo shared by the FC 0F and FC 10 replies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleResponse {
    pub start_address: u16,
    pub quantity: u16,
}

impl WriteMultipleResponse {
    fn decode_body(r: &mut Reader<'_>, max_quantity: u16) -> Result<Self, DecodeError> {
        let start_address = r.read_be_u16()?;
        let quantity = r.read_be_u16()?;
        validate_echo_quantity(quantity, max_quantity)?;
        Ok(Self {
            start_address,
            quantity,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWriteRegisterResponse {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
}

impl MaskWriteRegisterResponse {
    fn decode_body(r: &mut Reader<'_>) -> Result<Self, DecodeError> {
        Ok(Self {
            address: r.read_be_u16()?,
            and_mask: r.read_be_u16()?,
            or_mask: r.read_be_u16()?,
        })
    }
}

/// Record data of a single-reference Read File Record reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileRecordsResponse<'a> {
    pub data: &'a [u8],
}

impl<'a> FileRecordsResponse<'a> {
    fn decode_body(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let total_len = usize::from(r.read_u8()?);
        let sub_len = usize::from(r.read_u8()?);
        // One sub-response: its length byte plus its contents account for everything.
        if total_len != sub_len + 1 {
            return Err(DecodeError::InvalidLength);
        }
        if sub_len < 3 || (sub_len - 1) % 2 != 0 {
            return Err(DecodeError::InvalidLength);
        }
        if (sub_len - 1) / 2 > usize::from(MAX_FILE_RECORD_WORDS) {
            return Err(DecodeError::InvalidLength);
        }
        if r.read_u8()? != FILE_REFERENCE_TYPE {
            return Err(DecodeError::InvalidValue);
        }
        let data = r.read_exact(sub_len - 1)?;
        Ok(Self { data })
    }

    pub fn register_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        register_at(self.data, index)
    }
}

/// Echo of a single-reference Write File Record request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteFileRecordResponse<'a> {
    pub file_number: u16,
    pub record_number: u16,
    pub data: &'a [u8],
}

impl<'a> WriteFileRecordResponse<'a> {
    fn decode_body(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let data_len = usize::from(r.read_u8()?);
        if r.read_u8()? != FILE_REFERENCE_TYPE {
            return Err(DecodeError::InvalidValue);
        }
        let file_number = r.read_be_u16()?;
        let record_number = r.read_be_u16()?;
        let record_length = r.read_be_u16()?;
        if record_length == 0 || record_length > MAX_FILE_RECORD_WORDS {
            return Err(DecodeError::InvalidValue);
        }
        if data_len != 7 + usize::from(record_length) * 2 {
            return Err(DecodeError::InvalidLength);
        }
        let data = r.read_exact(usize::from(record_length) * 2)?;
        Ok(Self {
            file_number,
            record_number,
            data,
        })
    }

    pub fn record_length(&self) -> usize {
        self.data.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        register_at(self.data, index)
    }
}

/// Read FIFO Queue reply: queued words, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FifoQueueResponse<'a> {
    pub data: &'a [u8],
}

impl<'a> FifoQueueResponse<'a> {
    fn decode_body(r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let byte_count = r.read_be_u16()?;
        let fifo_count = r.read_be_u16()?;
        if fifo_count > MAX_FIFO_COUNT {
            return Err(DecodeError::InvalidValue);
        }
        // The byte count covers the FIFO count field and the queued words.
        if usize::from(byte_count) != 2 + usize::from(fifo_count) * 2 {
            return Err(DecodeError::InvalidLength);
        }
        let data = r.read_exact(usize::from(fifo_count) * 2)?;
        Ok(Self { data })
    }

    pub fn register_count(&self) -> usize {
        self.data.len() / 2
    }

    pub fn register(&self, index: usize) -> Option<u16> {
        register_at(self.data, index)
    }
}

/// A response PDU decoded against the function code the request carried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Response<'a> {
    Bits(BitsResponse<'a>),
    Registers(RegistersResponse<'a>),
    WriteSingleCoil(WriteSingleCoilResponse),
    WriteSingleRegister(WriteSingleRegisterResponse),
    WriteMultiple(WriteMultipleResponse),
    MaskWriteRegister(MaskWriteRegisterResponse),
    FileRecords(FileRecordsResponse<'a>),
    WriteFileRecord(WriteFileRecordResponse<'a>),
    FifoQueue(FifoQueueResponse<'a>),
    Exception(ExceptionResponse),
}

impl<'a> Response<'a> {
    /// Decode a response PDU for the function code of an outstanding request.
    ///
    /// Exception replies decode regardless of the expected function code; any
    /// other function byte must equal `expected` exactly.
    pub fn decode(expected: FunctionCode, r: &mut Reader<'a>) -> Result<Self, DecodeError> {
        let function_byte = r.read_u8()?;
        if FunctionCode::is_exception(function_byte) {
            return Ok(Self::Exception(ExceptionResponse::decode(function_byte, r)?));
        }
        if function_byte != expected.as_u8() {
            return Err(DecodeError::UnexpectedFunctionCode);
        }

        match expected {
            FunctionCode::ReadCoils | FunctionCode::ReadDiscreteInputs => {
                Ok(Self::Bits(BitsResponse::decode_body(r)?))
            }
            FunctionCode::ReadHoldingRegisters
            | FunctionCode::ReadInputRegisters
            | FunctionCode::ReadWriteMultipleRegisters => {
                Ok(Self::Registers(RegistersResponse::decode_body(r)?))
            }
            FunctionCode::WriteSingleCoil => {
                Ok(Self::WriteSingleCoil(WriteSingleCoilResponse::decode_body(r)?))
            }
            FunctionCode::WriteSingleRegister => Ok(Self::WriteSingleRegister(
                WriteSingleRegisterResponse::decode_body(r)?,
            )),
            FunctionCode::WriteMultipleCoils => Ok(Self::WriteMultiple(
                WriteMultipleResponse::decode_body(r, MAX_WRITE_COILS)?,
            )),
            FunctionCode::WriteMultipleRegisters => Ok(Self::WriteMultiple(
                WriteMultipleResponse::decode_body(r, MAX_WRITE_REGISTERS)?,
            )),
            FunctionCode::MaskWriteRegister => Ok(Self::MaskWriteRegister(
                MaskWriteRegisterResponse::decode_body(r)?,
            )),
            FunctionCode::ReadFileRecord => {
                Ok(Self::FileRecords(FileRecordsResponse::decode_body(r)?))
            }
            FunctionCode::WriteFileRecord => Ok(Self::WriteFileRecord(
                WriteFileRecordResponse::decode_body(r)?,
            )),
            FunctionCode::ReadFifoQueue => {
                Ok(Self::FifoQueue(FifoQueueResponse::decode_body(r)?))
            }
        }
    }
}
