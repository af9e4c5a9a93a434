//! Blocking wrapper around [`RtuClient`] for callers without an async runtime.

use crate::{
    BitValues, CoilWriteEcho, Error, FileWriteEcho, MaskWriteEcho, MultiWriteEcho,
    RegisterWriteEcho, RtuClient, WordValues,
};
use serbus_datalink::{DataLinkError, RtuConfig, RtuTransport, SerialStream, Transport};
use std::time::Duration;
use thiserror::Error as ThisError;
use tokio::runtime::Runtime;

#[derive(Debug, ThisError)]
pub enum SyncClientError {
    #[error("runtime init error: {0}")]
    RuntimeInit(std::io::Error),
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("client error: {0}")]
    Client(#[from] Error),
}

/// An [`RtuClient`] driven by a dedicated runtime, one blocking call per
/// transaction.
pub struct SyncRtuClient<T: Transport> {
    runtime: Runtime,
    client: RtuClient<T>,
}

impl SyncRtuClient<RtuTransport<SerialStream>> {
    /// Open a serial port and build the runtime that drives it.
    pub fn open(path: &str, baud_rate: u32, config: RtuConfig) -> Result<Self, SyncClientError> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .map_err(SyncClientError::RuntimeInit)?;
        let transport = {
            // The serial stream registers with the runtime's reactor.
            let _guard = runtime.enter();
            RtuTransport::open(path, baud_rate, config)?
        };
        Ok(Self {
            runtime,
            client: RtuClient::new(transport),
        })
    }
}

impl<T: Transport> SyncRtuClient<T> {
    /// Wrap an already-built client, e.g. one backed by a test transport.
    pub fn from_client(runtime: Runtime, client: RtuClient<T>) -> Self {
        Self { runtime, client }
    }

    pub fn unit_id(&self) -> u8 {
        self.client.unit_id()
    }

    pub fn set_unit_id(&mut self, unit_id: u8) -> Result<(), SyncClientError> {
        Ok(self.client.set_unit_id(unit_id)?)
    }

    pub fn response_timeout(&self) -> Duration {
        self.client.response_timeout()
    }

    pub fn set_response_timeout(&mut self, timeout: Duration) {
        self.client.set_response_timeout(timeout);
    }

    /// Consume the wrapper, closing the transport and shutting the runtime down.
    pub fn close(self) {}

    pub fn read_coils(&mut self, address: u16, quantity: u16) -> Result<BitValues, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.read_coils(address, quantity))?)
    }

    pub fn read_discrete_inputs(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<BitValues, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.read_discrete_inputs(address, quantity))?)
    }

    pub fn read_holding_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<WordValues, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.read_holding_registers(address, quantity))?)
    }

    pub fn read_input_registers(
        &mut self,
        address: u16,
        quantity: u16,
    ) -> Result<WordValues, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.read_input_registers(address, quantity))?)
    }

    pub fn write_coil(&mut self, address: u16, value: bool) -> Result<CoilWriteEcho, SyncClientError> {
        Ok(self.runtime.block_on(self.client.write_coil(address, value))?)
    }

    pub fn write_register(
        &mut self,
        address: u16,
        value: u16,
    ) -> Result<RegisterWriteEcho, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.write_register(address, value))?)
    }

    pub fn write_coils(
        &mut self,
        address: u16,
        values: &[bool],
    ) -> Result<MultiWriteEcho, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.write_coils(address, values))?)
    }

    pub fn write_registers(
        &mut self,
        address: u16,
        values: &[u16],
    ) -> Result<MultiWriteEcho, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.write_registers(address, values))?)
    }

    pub fn mask_write_register(
        &mut self,
        address: u16,
        and_mask: u16,
        or_mask: u16,
    ) -> Result<MaskWriteEcho, SyncClientError> {
        Ok(self
            .runtime
            .block_on(self.client.mask_write_register(address, and_mask, or_mask))?)
    }

    pub fn read_write_registers(
        &mut self,
        read_address: u16,
        read_quantity: u16,
        write_address: u16,
        values: &[u16],
    ) -> Result<WordValues, SyncClientError> {
        Ok(self.runtime.block_on(self.client.read_write_registers(
            read_address,
            read_quantity,
            write_address,
            values,
        ))?)
    }

    pub fn read_file_record(
        &mut self,
        file_number: u16,
        record_number: u16,
        record_length: u16,
    ) -> Result<WordValues, SyncClientError> {
        Ok(self.runtime.block_on(self.client.read_file_record(
            file_number,
            record_number,
            record_length,
        ))?)
    }

    pub fn write_file_record(
        &mut self,
        file_number: u16,
        record_number: u16,
        values: &[u16],
    ) -> Result<FileWriteEcho, SyncClientError> {
        Ok(self.runtime.block_on(self.client.write_file_record(
            file_number,
            record_number,
            values,
        ))?)
    }

    pub fn read_fifo_queue(&mut self, address: u16) -> Result<WordValues, SyncClientError> {
        Ok(self.runtime.block_on(self.client.read_fifo_queue(address))?)
    }
}

#[cfg(test)]
mod tests {
    use super::{SyncClientError, SyncRtuClient};
    use crate::{Error, RtuClient, Transport};
    use async_trait::async_trait;
    use serbus_core::encoding::Writer;
    use serbus_core::frame::rtu as rtu_frame;
    use serbus_datalink::DataLinkError;
    use std::collections::VecDeque;
    use std::time::Duration;

    struct QueuedTransport {
        responses: VecDeque<Vec<u8>>,
    }

    #[async_trait]
    impl Transport for QueuedTransport {
        async fn transact(&mut self, _request: &[u8]) -> Result<Vec<u8>, DataLinkError> {
            self.responses.pop_front().ok_or(DataLinkError::Timeout)
        }

        fn response_timeout(&self) -> Duration {
            Duration::from_millis(500)
        }

        fn set_response_timeout(&mut self, _timeout: Duration) {}
    }

    fn frame(unit_id: u8, pdu: &[u8]) -> Vec<u8> {
        let mut buf = [0u8; 256];
        let mut w = Writer::new(&mut buf);
        rtu_frame::encode_frame(&mut w, unit_id, pdu).unwrap();
        w.as_written().to_vec()
    }

    fn sync_client(responses: Vec<Vec<u8>>) -> SyncRtuClient<QueuedTransport> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let transport = QueuedTransport {
            responses: responses.into(),
        };
        SyncRtuClient::from_client(runtime, RtuClient::new(transport))
    }

    #[test]
    fn blocking_read_holding_registers() {
        let mut client = sync_client(vec![frame(1, &[0x03, 0x02, 0x00, 0x2A])]);
        let result = client.read_holding_registers(0, 1).unwrap();
        assert_eq!(result.values, vec![0x2A]);
    }

    #[test]
    fn blocking_timeout_maps_to_client_error() {
        let mut client = sync_client(vec![]);
        let err = client.read_holding_registers(0, 1).unwrap_err();
        assert!(matches!(err, SyncClientError::Client(Error::Timeout)));
    }
}
