use std::collections::VecDeque;
use std::io;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Connector, Transport};
use crate::config::SerialConfig;

/// In-memory stand-in for a serial sensor.
///
/// Clones share the same line, so a test can keep one handle for scripting and
/// inspection while the [`LinkManager`](super::LinkManager) owns another.
#[derive(Clone, Default)]
pub struct MockConnector {
    inner: Arc<Mutex<MockLine>>,
}

#[derive(Default)]
struct MockLine {
    /// Number of upcoming `open` calls that fail
    failures_left: u32,
    open_attempts: u32,
    /// Each entry is returned by exactly one read
    inbound: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    /// Report a transport error once `inbound` is empty
    fail_when_drained: bool,
    fail_writes: bool,
    port_open: bool,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// A connector whose first `times` open attempts fail.
    pub fn failing(times: u32) -> Self {
        let connector = Self::default();
        connector.lock().failures_left = times;
        connector
    }

    /// Make reads fail with a transport error after all scripted data is consumed.
    pub fn fail_when_drained(self) -> Self {
        self.lock().fail_when_drained = true;
        self
    }

    /// Make every write fail without affecting reads.
    pub fn fail_writes(self) -> Self {
        self.lock().fail_writes = true;
        self
    }

    /// Queue raw bytes, delivered as one read.
    pub fn push_bytes(&self, bytes: impl Into<Vec<u8>>) {
        self.lock().inbound.push_back(bytes.into());
    }

    /// Queue one CRLF-terminated line, the way the sensor emits it.
    pub fn push_line(&self, line: &str) {
        self.push_bytes(format!("{line}\r\n"));
    }

    pub fn open_attempts(&self) -> u32 {
        self.lock().open_attempts
    }

    /// Everything written to the port so far.
    pub fn written(&self) -> Vec<u8> {
        self.lock().written.clone()
    }

    pub fn is_port_open(&self) -> bool {
        self.lock().port_open
    }

    fn lock(&self) -> MutexGuard<'_, MockLine> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Connector for MockConnector {
    type Port = MockPort;

    fn open(&self, config: &SerialConfig) -> io::Result<MockPort> {
        let mut line = self.lock();
        line.open_attempts += 1;

        if line.failures_left > 0 {
            line.failures_left -= 1;
            return Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("{}: no such device", config.port),
            ));
        }

        line.port_open = true;
        Ok(MockPort {
            inner: Arc::clone(&self.inner),
        })
    }
}

/// Open handle to a [`MockConnector`] line. Dropping it closes the port.
pub struct MockPort {
    inner: Arc<Mutex<MockLine>>,
}

impl MockPort {
    fn lock(&self) -> io::Result<MutexGuard<'_, MockLine>> {
        self.inner
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))
    }
}

impl Transport for MockPort {
    fn bytes_to_read(&mut self) -> io::Result<u32> {
        let line = self.lock()?;
        match line.inbound.front() {
            Some(chunk) => Ok(chunk.len() as u32),
            None if line.fail_when_drained => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "device disconnected",
            )),
            None => Ok(0),
        }
    }

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let mut line = self.lock()?;
        let Some(mut chunk) = line.inbound.pop_front() else {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        };

        let n = chunk.len().min(buf.len());
        buf[..n].copy_from_slice(&chunk[..n]);
        if n < chunk.len() {
            line.inbound.push_front(chunk.split_off(n));
        }
        Ok(n)
    }

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut line = self.lock()?;
        if line.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "write rejected"));
        }
        line.written.extend_from_slice(bytes);
        Ok(())
    }
}

impl Drop for MockPort {
    fn drop(&mut self) {
        let mut line = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        line.port_open = false;
    }
}
