use crate::encoding::Writer;
use crate::pdu::FunctionCode;
use crate::EncodeError;

pub(crate) const MAX_READ_BITS: u16 = 2000;
pub(crate) const MAX_READ_REGISTERS: u16 = 125;
pub(crate) const MAX_WRITE_COILS: u16 = 1968;
pub(crate) const MAX_WRITE_REGISTERS: u16 = 123;
pub(crate) const MAX_RW_WRITE_REGISTERS: u16 = 121;
pub(crate) const MAX_FILE_RECORD_WORDS: u16 = 120;

/// The only reference type defined for file record access.
pub(crate) const FILE_REFERENCE_TYPE: u8 = 0x06;

fn validate_quantity(quantity: u16, max: u16) -> Result<(), EncodeError> {
    if quantity == 0 || quantity > max {
        return Err(EncodeError::ValueOutOfRange);
    }
    Ok(())
}

fn write_header(
    w: &mut Writer<'_>,
    function: FunctionCode,
    start_address: u16,
    quantity: u16,
) -> Result<(), EncodeError> {
    w.write_u8(function.as_u8())?;
    w.write_be_u16(start_address)?;
    w.write_be_u16(quantity)?;
    Ok(())
}

fn pack_coils(values: &[bool], out: &mut [u8]) {
    out.fill(0);
    for (i, value) in values.iter().enumerate() {
        if *value {
            out[i / 8] |= 1u8 << (i % 8);
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCoilsRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadCoilsRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_BITS)?;
        write_header(w, FunctionCode::ReadCoils, self.start_address, self.quantity)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadDiscreteInputsRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadDiscreteInputsRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_BITS)?;
        write_header(
            w,
            FunctionCode::ReadDiscreteInputs,
            self.start_address,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadHoldingRegistersRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadHoldingRegistersRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_REGISTERS)?;
        write_header(
            w,
            FunctionCode::ReadHoldingRegisters,
            self.start_address,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadInputRegistersRequest {
    pub start_address: u16,
    pub quantity: u16,
}

impl ReadInputRegistersRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.quantity, MAX_READ_REGISTERS)?;
        write_header(
            w,
            FunctionCode::ReadInputRegisters,
            self.start_address,
            self.quantity,
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleCoilRequest {
    pub address: u16,
    pub value: bool,
}

impl WriteSingleCoilRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::WriteSingleCoil.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(if self.value { 0xFF00 } else { 0x0000 })?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteSingleRegisterRequest {
    pub address: u16,
    pub value: u16,
}

impl WriteSingleRegisterRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::WriteSingleRegister.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(self.value)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleCoilsRequest<'a> {
    pub start_address: u16,
    pub values: &'a [bool],
}

impl<'a> WriteMultipleCoilsRequest<'a> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_WRITE_COILS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;
        let byte_count = self.values.len().div_ceil(8);

        w.write_u8(FunctionCode::WriteMultipleCoils.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(quantity)?;
        w.write_u8(byte_count as u8)?;

        let mut packed = [0u8; 246];
        pack_coils(self.values, &mut packed[..byte_count]);
        w.write_all(&packed[..byte_count])?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteMultipleRegistersRequest<'a> {
    pub start_address: u16,
    pub values: &'a [u16],
}

impl<'a> WriteMultipleRegistersRequest<'a> {
    pub fn quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_WRITE_REGISTERS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let quantity = self.quantity()?;

        w.write_u8(FunctionCode::WriteMultipleRegisters.as_u8())?;
        w.write_be_u16(self.start_address)?;
        w.write_be_u16(quantity)?;
        w.write_u8((self.values.len() * 2) as u8)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MaskWriteRegisterRequest {
    pub address: u16,
    pub and_mask: u16,
    pub or_mask: u16,
}

impl MaskWriteRegisterRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::MaskWriteRegister.as_u8())?;
        w.write_be_u16(self.address)?;
        w.write_be_u16(self.and_mask)?;
        w.write_be_u16(self.or_mask)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadWriteMultipleRegistersRequest<'a> {
    pub read_start_address: u16,
    pub read_quantity: u16,
    pub write_start_address: u16,
    pub values: &'a [u16],
}

impl<'a> ReadWriteMultipleRegistersRequest<'a> {
    pub fn write_quantity(&self) -> Result<u16, EncodeError> {
        let quantity: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(quantity, MAX_RW_WRITE_REGISTERS)?;
        Ok(quantity)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.read_quantity, MAX_READ_REGISTERS)?;
        let write_quantity = self.write_quantity()?;

        w.write_u8(FunctionCode::ReadWriteMultipleRegisters.as_u8())?;
        w.write_be_u16(self.read_start_address)?;
        w.write_be_u16(self.read_quantity)?;
        w.write_be_u16(self.write_start_address)?;
        w.write_be_u16(write_quantity)?;
        w.write_u8((self.values.len() * 2) as u8)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

/// A single-reference Read File Record sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFileRecordRequest {
    pub file_number: u16,
    pub record_number: u16,
    pub record_length: u16,
}

impl ReadFileRecordRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        validate_quantity(self.record_length, MAX_FILE_RECORD_WORDS)?;

        w.write_u8(FunctionCode::ReadFileRecord.as_u8())?;
        w.write_u8(7)?;
        w.write_u8(FILE_REFERENCE_TYPE)?;
        w.write_be_u16(self.file_number)?;
        w.write_be_u16(self.record_number)?;
        w.write_be_u16(self.record_length)?;
        Ok(())
    }
}

/// A single-reference Write File Record sub-request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteFileRecordRequest<'a> {
    pub file_number: u16,
    pub record_number: u16,
    pub values: &'a [u16],
}

impl<'a> WriteFileRecordRequest<'a> {
    pub fn record_length(&self) -> Result<u16, EncodeError> {
        let length: u16 = self
            .values
            .len()
            .try_into()
            .map_err(|_| EncodeError::ValueOutOfRange)?;
        validate_quantity(length, MAX_FILE_RECORD_WORDS)?;
        Ok(length)
    }

    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        let record_length = self.record_length()?;

        w.write_u8(FunctionCode::WriteFileRecord.as_u8())?;
        w.write_u8((7 + self.values.len() * 2) as u8)?;
        w.write_u8(FILE_REFERENCE_TYPE)?;
        w.write_be_u16(self.file_number)?;
        w.write_be_u16(self.record_number)?;
        w.write_be_u16(record_length)?;
        for value in self.values {
            w.write_be_u16(*value)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadFifoQueueRequest {
    pub address: u16,
}

impl ReadFifoQueueRequest {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        w.write_u8(FunctionCode::ReadFifoQueue.as_u8())?;
        w.write_be_u16(self.address)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Request<'a> {
    ReadCoils(ReadCoilsRequest),
    ReadDiscreteInputs(ReadDiscreteInputsRequest),
    ReadHoldingRegisters(ReadHoldingRegistersRequest),
    ReadInputRegisters(ReadInputRegistersRequest),
    WriteSingleCoil(WriteSingleCoilRequest),
    WriteSingleRegister(WriteSingleRegisterRequest),
    WriteMultipleCoils(WriteMultipleCoilsRequest<'a>),
    WriteMultipleRegisters(WriteMultipleRegistersRequest<'a>),
    MaskWriteRegister(MaskWriteRegisterRequest),
    ReadWriteMultipleRegisters(ReadWriteMultipleRegistersRequest<'a>),
    ReadFileRecord(ReadFileRecordRequest),
    WriteFileRecord(WriteFileRecordRequest<'a>),
    ReadFifoQueue(ReadFifoQueueRequest),
}

impl<'a> Request<'a> {
    pub fn encode(&self, w: &mut Writer<'_>) -> Result<(), EncodeError> {
        match self {
            Self::ReadCoils(req) => req.encode(w),
            Self::ReadDiscreteInputs(req) => req.encode(w),
            Self::ReadHoldingRegisters(req) => req.encode(w),
            Self::ReadInputRegisters(req) => req.encode(w),
            Self::WriteSingleCoil(req) => req.encode(w),
            Self::WriteSingleRegister(req) => req.encode(w),
            Self::WriteMultipleCoils(req) => req.encode(w),
            Self::WriteMultipleRegisters(req) => req.encode(w),
            Self::MaskWriteRegister(req) => req.encode(w),
            Self::ReadWriteMultipleRegisters(req) => req.encode(w),
            Self::ReadFileRecord(req) => req.encode(w),
            Self::WriteFileRecord(req) => req.encode(w),
            Self::ReadFifoQueue(req) => req.encode(w),
        }
    }

    pub fn function_code(&self) -> FunctionCode {
        match self {
            Self::ReadCoils(_) => FunctionCode::ReadCoils,
            Self::ReadDiscreteInputs(_) => FunctionCode::ReadDiscreteInputs,
            Self::ReadHoldingRegisters(_) => FunctionCode::ReadHoldingRegisters,
            Self::ReadInputRegisters(_) => FunctionCode::ReadInputRegisters,
            Self::WriteSingleCoil(_) => FunctionCode::WriteSingleCoil,
            Self::WriteSingleRegister(_) => FunctionCode::WriteSingleRegister,
            Self::WriteMultipleCoils(_) => FunctionCode::WriteMultipleCoils,
            Self::WriteMultipleRegisters(_) => FunctionCode::WriteMultipleRegisters,
            Self::MaskWriteRegister(_) => FunctionCode::MaskWriteRegister,
            Self::ReadWriteMultipleRegisters(_) => FunctionCode::ReadWriteMultipleRegisters,
            Self::ReadFileRecord(_) => FunctionCode::ReadFileRecord,
            Self::WriteFileRecord(_) => FunctionCode::WriteFileRecord,
            Self::ReadFifoQueue(_) => FunctionCode::ReadFifoQueue,
        }
    }
}
