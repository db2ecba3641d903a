pub mod mock;
pub mod serial;

use std::io;
use std::string::FromUtf8Error;

use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::SerialConfig;

/// Longest partial line kept while waiting for its terminating newline.
const MAX_LINE_LEN: usize = 1024;

/// Read chunk size for a single poll.
const READ_CHUNK: usize = 256;

#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    #[error("Failed to connect to {port} after {attempts} attempts")]
    ConnectExhausted { port: String, attempts: u32 },

    #[error("Connection to {port} interrupted")]
    Interrupted { port: String },

    #[error("Serial connection not open")]
    NotOpen,

    #[error("Serial transport error: {0}")]
    Transport(#[source] io::Error),

    #[error("Failed to decode serial data: {0}")]
    Decode(#[from] FromUtf8Error),
}

impl LinkError {
    /// Whether the error ends the streaming session.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, LinkError::Decode(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    NotConnected,
    Connected,
    Failed,
}

/// Control commands understood by the DGS2 sensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Take a single measurement.
    SingleMeasurement,
    /// Toggle continuous measurements (~1 Hz).
    ContinuousToggle,
}

impl Command {
    pub fn as_bytes(self) -> &'static [u8] {
        match self {
            Command::SingleMeasurement => b"\r",
            Command::ContinuousToggle => b"C",
        }
    }
}

/// Byte-level access to an open serial device.
pub trait Transport: Send {
    /// Number of bytes that can be read without blocking.
    fn bytes_to_read(&mut self) -> io::Result<u32>;

    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize>;

    fn write_all(&mut self, bytes: &[u8]) -> io::Result<()>;
}

/// Opens the serial device described by a [`SerialConfig`].
pub trait Connector: Send + Sync {
    type Port: Transport;

    fn open(&self, config: &SerialConfig) -> io::Result<Self::Port>;
}

/// Owns the serial connection to the sensor for the lifetime of a session.
pub struct LinkManager<C: Connector> {
    connector: C,
    config: SerialConfig,
    port: Option<C::Port>,
    state: LinkState,
    /// Bytes received after the last complete line
    pending: Vec<u8>,
}

impl<C: Connector> LinkManager<C> {
    pub fn new(connector: C, config: SerialConfig) -> Self {
        Self {
            connector,
            config,
            port: None,
            state: LinkState::NotConnected,
            pending: Vec::with_capacity(READ_CHUNK),
        }
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn is_open(&self) -> bool {
        self.port.is_some()
    }

    /// Open the device, retrying with a fixed delay between attempts.
    ///
    /// Gives up with [`LinkError::Interrupted`] as soon as `cancel` fires, including
    /// in the middle of a retry delay.
    pub async fn connect(&mut self, cancel: &CancellationToken) -> Result<(), LinkError> {
        self.port = None;
        self.pending.clear();

        let attempts = self.config.connect_attempts;
        for attempt in 1..=attempts {
            if cancel.is_cancelled() {
                return Err(self.connect_interrupted());
            }

            match self.connector.open(&self.config) {
                Ok(port) => {
                    info!(
                        port = %self.config.port,
                        baud_rate = self.config.baud_rate,
                        "Connected to sensor"
                    );
                    self.port = Some(port);
                    self.state = LinkState::Connected;
                    return Ok(());
                }
                Err(e) => {
                    warn!(attempt, attempts, error = %e, "Connection attempt failed");
                    if attempt < attempts {
                        tokio::select! {
                            _ = cancel.cancelled() => return Err(self.connect_interrupted()),
                            _ = sleep(self.config.retry_delay) => {}
                        }
                    }
                }
            }
        }

        self.state = LinkState::Failed;
        error!(
            port = %self.config.port,
            attempts,
            "Failed to connect to sensor"
        );
        Err(LinkError::ConnectExhausted {
            port: self.config.port.clone(),
            attempts,
        })
    }

    /// Write a control command. Failures are logged and otherwise ignored.
    pub fn send_command(&mut self, command: Command) {
        let Some(port) = self.port.as_mut() else {
            error!(?command, "Serial connection not open");
            return;
        };

        match port.write_all(command.as_bytes()) {
            Ok(()) => debug!(?command, "Sent command"),
            Err(e) => error!(?command, error = %e, "Failed to send command"),
        }
    }

    /// Poll for one complete line without blocking.
    ///
    /// Returns `Ok(None)` when no full line has arrived yet. The returned line is
    /// trimmed and may be empty.
    pub fn read_line(&mut self) -> Result<Option<String>, LinkError> {
        if let Some(line) = self.take_line()? {
            return Ok(Some(line));
        }

        let Some(port) = self.port.as_mut() else {
            return Err(LinkError::NotOpen);
        };

        let available = match port.bytes_to_read() {
            Ok(n) => n as usize,
            Err(e) => return Err(self.transport_failed(e)),
        };
        if available == 0 {
            return Ok(None);
        }

        let mut chunk = [0u8; READ_CHUNK];
        let want = available.min(READ_CHUNK);
        let read = match port.read(&mut chunk[..want]) {
            Ok(n) => n,
            Err(e) if is_idle_error(&e) => return Ok(None),
            Err(e) => return Err(self.transport_failed(e)),
        };
        self.pending.extend_from_slice(&chunk[..read]);

        let line = self.take_line()?;
        if line.is_none() && self.pending.len() > MAX_LINE_LEN {
            warn!(discarded = self.pending.len(), "Discarding unterminated serial data");
            self.pending.clear();
        }
        Ok(line)
    }

    /// Release the device handle. Safe to call repeatedly.
    pub fn close(&mut self) {
        if self.port.take().is_some() {
            info!(port = %self.config.port, "Serial port closed");
        }
        self.pending.clear();
        if self.state == LinkState::Connected {
            self.state = LinkState::NotConnected;
        }
    }

    fn take_line(&mut self) -> Result<Option<String>, LinkError> {
        let Some(end) = self.pending.iter().position(|b| *b == b'\n') else {
            return Ok(None);
        };

        let raw: Vec<u8> = self.pending.drain(..=end).collect();
        let line = String::from_utf8(raw)?;
        Ok(Some(line.trim().to_owned()))
    }

    fn connect_interrupted(&mut self) -> LinkError {
        self.state = LinkState::NotConnected;
        info!(port = %self.config.port, "Connection attempts interrupted");
        LinkError::Interrupted {
            port: self.config.port.clone(),
        }
    }

    fn transport_failed(&mut self, e: io::Error) -> LinkError {
        self.state = LinkState::Failed;
        LinkError::Transport(e)
    }
}

fn is_idle_error(e: &io::Error) -> bool {
    use std::io::ErrorKind::*;
    matches!(e.kind(), TimedOut | WouldBlock | Interrupted)
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::mock::MockConnector;
    use super::*;

    fn config() -> SerialConfig {
        SerialConfig {
            port: "/dev/ttyMOCK0".to_string(),
            ..SerialConfig::default()
        }
    }

    #[tokio::test]
    async fn test_connect_first_attempt() {
        let connector = MockConnector::new();
        let mut link = LinkManager::new(connector.clone(), config());

        assert_eq!(link.state(), LinkState::NotConnected);
        link.connect(&CancellationToken::new()).await.unwrap();

        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(connector.open_attempts(), 1);
        assert!(connector.is_port_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_retries_then_succeeds() {
        let connector = MockConnector::failing(2);
        let mut link = LinkManager::new(connector.clone(), config());

        let started = tokio::time::Instant::now();
        link.connect(&CancellationToken::new()).await.unwrap();

        assert_eq!(connector.open_attempts(), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(4));
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_gives_up_after_five_attempts() {
        let connector = MockConnector::failing(u32::MAX);
        let mut link = LinkManager::new(connector.clone(), config());

        let started = tokio::time::Instant::now();
        let err = link.connect(&CancellationToken::new()).await.unwrap_err();

        assert!(matches!(err, LinkError::ConnectExhausted { attempts: 5, .. }));
        assert!(err.is_fatal());
        assert_eq!(connector.open_attempts(), 5);
        assert_eq!(started.elapsed(), Duration::from_secs(8));
        assert_eq!(link.state(), LinkState::Failed);
        assert!(!link.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn test_connect_stops_during_retry_delay() {
        let connector = MockConnector::failing(u32::MAX);
        let mut link = LinkManager::new(connector.clone(), config());

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let started = tokio::time::Instant::now();
        let err = link.connect(&cancel).await.unwrap_err();

        assert!(matches!(err, LinkError::Interrupted { .. }));
        // attempts at 0s and 2s, cancelled inside the second delay
        assert_eq!(connector.open_attempts(), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(3));
        assert_eq!(link.state(), LinkState::NotConnected);
    }

    #[tokio::test]
    async fn test_connect_with_cancelled_token_never_opens() {
        let connector = MockConnector::new();
        let mut link = LinkManager::new(connector.clone(), config());

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = link.connect(&cancel).await.unwrap_err();

        assert!(matches!(err, LinkError::Interrupted { .. }));
        assert_eq!(connector.open_attempts(), 0);
        assert!(!connector.is_port_open());
    }

    #[tokio::test]
    async fn test_failed_write_keeps_link_usable() {
        let connector = MockConnector::new().fail_writes();
        connector.push_line("SN1, 2500, 2500, 4500, 1, 2, 3");
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        link.send_command(Command::ContinuousToggle);

        assert!(connector.written().is_empty());
        assert_eq!(link.state(), LinkState::Connected);
        assert_eq!(
            link.read_line().unwrap().as_deref(),
            Some("SN1, 2500, 2500, 4500, 1, 2, 3")
        );
    }

    #[tokio::test]
    async fn test_send_command_bytes() {
        let connector = MockConnector::new();
        let mut link = LinkManager::new(connector.clone(), config());

        // not open yet: nothing written
        link.send_command(Command::ContinuousToggle);
        assert!(connector.written().is_empty());

        link.connect(&CancellationToken::new()).await.unwrap();
        link.send_command(Command::ContinuousToggle);
        link.send_command(Command::SingleMeasurement);

        assert_eq!(connector.written(), b"C\r".to_vec());
    }

    #[tokio::test]
    async fn test_read_line_assembles_partial_chunks() {
        let connector = MockConnector::new();
        connector.push_bytes("SN1, 2500, 25");
        connector.push_bytes("00, 4500, 1, 2, 3\r\nSN2");
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        assert_eq!(link.read_line().unwrap(), None);
        assert_eq!(
            link.read_line().unwrap().as_deref(),
            Some("SN1, 2500, 2500, 4500, 1, 2, 3")
        );
        assert_eq!(link.read_line().unwrap(), None);
    }

    #[tokio::test]
    async fn test_read_line_returns_buffered_lines_first() {
        let connector = MockConnector::new();
        connector.push_bytes("a\nb\n");
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        assert_eq!(link.read_line().unwrap().as_deref(), Some("a"));
        assert_eq!(link.read_line().unwrap().as_deref(), Some("b"));
        assert_eq!(link.read_line().unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_utf8_is_transient() {
        let connector = MockConnector::new();
        connector.push_bytes(vec![0xff, 0xfe, b'\n']);
        connector.push_line("ok");
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        let err = link.read_line().unwrap_err();
        assert!(matches!(err, LinkError::Decode(_)));
        assert!(!err.is_fatal());

        assert_eq!(link.read_line().unwrap().as_deref(), Some("ok"));
        assert_eq!(link.state(), LinkState::Connected);
    }

    #[tokio::test]
    async fn test_transport_error_is_fatal() {
        let connector = MockConnector::new().fail_when_drained();
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        let err = link.read_line().unwrap_err();
        assert!(matches!(err, LinkError::Transport(_)));
        assert!(err.is_fatal());
        assert_eq!(link.state(), LinkState::Failed);
    }

    #[tokio::test]
    async fn test_overlong_partial_line_is_discarded() {
        let connector = MockConnector::new();
        for _ in 0..5 {
            connector.push_bytes(vec![b'x'; 250]);
        }
        connector.push_line("tail");
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        for _ in 0..5 {
            assert_eq!(link.read_line().unwrap(), None);
        }
        assert_eq!(link.read_line().unwrap().as_deref(), Some("tail"));
    }

    #[tokio::test]
    async fn test_read_without_connection() {
        let mut link = LinkManager::new(MockConnector::new(), config());
        assert!(matches!(link.read_line(), Err(LinkError::NotOpen)));
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let connector = MockConnector::new();
        let mut link = LinkManager::new(connector.clone(), config());
        link.connect(&CancellationToken::new()).await.unwrap();

        link.close();
        link.close();

        assert!(!connector.is_port_open());
        assert!(!link.is_open());
        assert_eq!(link.state(), LinkState::NotConnected);
    }
}
