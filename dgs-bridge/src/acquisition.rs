use std::time::Duration;

use dgs_core::parse_line;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::forward::Forwarder;
use crate::link::{Command, Connector, LinkError, LinkManager};
use crate::logbook::BoundedLog;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Connecting,
    Streaming,
    ShuttingDown,
    Terminated,
}

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEnd {
    /// Cancellation was requested.
    Interrupted,
    /// The serial transport failed while streaming.
    LinkLost,
    /// The sensor could not be opened.
    ConnectFailed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSummary {
    /// Lines that parsed into a reading.
    pub readings: u64,
    pub end: SessionEnd,
}

/// Drives one sensor session: link → parser → forwarder → local log.
pub struct Acquisition<C: Connector, F: Forwarder> {
    link: LinkManager<C>,
    forwarder: F,
    log: BoundedLog,
    poll_interval: Duration,
    state: SessionState,
    readings: u64,
    end: Option<SessionEnd>,
}

impl<C: Connector, F: Forwarder> Acquisition<C, F> {
    pub fn new(
        link: LinkManager<C>,
        forwarder: F,
        log: BoundedLog,
        poll_interval: Duration,
    ) -> Self {
        Self {
            link,
            forwarder,
            log,
            poll_interval,
            state: SessionState::Idle,
            readings: 0,
            end: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn readings(&self) -> u64 {
        self.readings
    }

    pub fn log(&self) -> &BoundedLog {
        &self.log
    }

    /// Run the session until `cancel` fires or the link is lost.
    ///
    /// A session runs once. Calling this again, or after [`shutdown`](Self::shutdown),
    /// returns the recorded outcome without touching the link.
    pub async fn run(&mut self, cancel: CancellationToken) -> SessionSummary {
        if self.state != SessionState::Idle {
            return self.summary(self.end.unwrap_or(SessionEnd::Interrupted));
        }

        self.state = SessionState::Connecting;
        match self.link.connect(&cancel).await {
            Ok(()) => {}
            Err(LinkError::Interrupted { .. }) => return self.finish(SessionEnd::Interrupted),
            Err(_) => return self.finish(SessionEnd::ConnectFailed),
        }

        if cancel.is_cancelled() {
            info!("Shutting down");
            return self.finish(SessionEnd::Interrupted);
        }

        self.state = SessionState::Streaming;
        info!("Starting continuous measurements");
        self.link.send_command(Command::ContinuousToggle);
        info!("Waiting for sensor readings");

        let end = self.stream(&cancel).await;
        self.finish(end)
    }

    /// Close the link and log the final count. Has no effect once terminated.
    pub fn shutdown(&mut self) {
        if self.state == SessionState::Terminated {
            return;
        }

        self.state = SessionState::ShuttingDown;
        self.link.close();
        info!(total_readings = self.readings, "Session finished");
        self.state = SessionState::Terminated;
        self.end.get_or_insert(SessionEnd::Interrupted);
    }

    fn finish(&mut self, end: SessionEnd) -> SessionSummary {
        self.end = Some(end);
        self.shutdown();
        self.summary(end)
    }

    async fn stream(&mut self, cancel: &CancellationToken) -> SessionEnd {
        loop {
            if cancel.is_cancelled() {
                info!("Shutting down");
                return SessionEnd::Interrupted;
            }

            match self.link.read_line() {
                Ok(Some(line)) if line.is_empty() => {}
                Ok(Some(line)) => self.handle_line(&line).await,
                Ok(None) => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.poll_interval) => {}
                    }
                }
                Err(e) if e.is_fatal() => {
                    error!(error = %e, "Serial read error");
                    return SessionEnd::LinkLost;
                }
                Err(e) => {
                    warn!(error = %e, "Skipping undecodable serial data");
                }
            }
        }
    }

    async fn handle_line(&mut self, line: &str) {
        let reading = match parse_line(line) {
            Ok(reading) => reading,
            Err(e) => {
                warn!(error = %e, "Invalid reading");
                return;
            }
        };
        self.readings += 1;

        if let Err(e) = self.forwarder.forward(&reading).await {
            warn!(error = %e, "Failed to send reading to backend");
            return;
        }

        self.log.log_if_under_cap(&reading);
        info!(
            "Reading #{} | PPB: {:.1} | Temp: {:.2}°C | Humidity: {:.2}%",
            self.readings, reading.ppb, reading.temperature, reading.humidity
        );
    }

    fn summary(&self, end: SessionEnd) -> SessionSummary {
        SessionSummary {
            readings: self.readings,
            end,
        }
    }
}
