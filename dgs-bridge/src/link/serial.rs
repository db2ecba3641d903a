use std::io;

use serialport::{DataBits, Parity, SerialPort, StopBits};

use super::{Connector, Transport};
use crate::config::SerialConfig;

/// Opens real serial devices through the `serialport` crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialConnector;

impl Connector for SerialConnector {
    type Port = Box<dyn SerialPort>;

    fn open(&self, config: &SerialConfig) -> io::Result<Self::Port> {
        let port = serialport::new(&config.port, config.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .timeout(config.read_timeout)
            .open()?;
        Ok(port)
    }
}

impl Transport for Box<dyn SerialPort> {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        Ok(SerialPort::bytes_to_read(&**self)?)
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        io::Read::read(self, buf)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        io::Write::write_all(self, bytes)?;
        io::Write::flush(self)
    }
}
