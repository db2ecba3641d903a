use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_SERIAL_PORT: &str = "/dev/ttyUSB0";
pub const DEFAULT_BAUD_RATE: u32 = 9600;
pub const DEFAULT_BACKEND_URL: &str = "http://localhost:3001/api/sensor/data";
pub const DEFAULT_LOG_FILE: &str = "sensor_readings.csv";

/// Maximum number of rows the local log accepts per process lifetime.
pub const MAX_LOG_ENTRIES: usize = 500;

#[derive(Debug, Clone)]
pub struct Config {
    pub serial: SerialConfig,
    pub backend: BackendConfig,
    pub log: LogConfig,
    /// Pause between polls while the sensor has nothing to say
    pub poll_interval: Duration,
}

/// Serial link parameters. Framing is always 8-N-1.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Device path of the USB-UART adapter
    pub port: String,
    pub baud_rate: u32,
    pub read_timeout: Duration,
    /// Total number of open attempts before giving up
    pub connect_attempts: u32,
    /// Delay between two consecutive open attempts
    pub retry_delay: Duration,
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Collection endpoint readings are POSTed to
    pub url: String,
    pub request_timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub path: PathBuf,
    pub max_entries: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial: SerialConfig::default(),
            backend: BackendConfig::default(),
            log: LogConfig::default(),
            poll_interval: Duration::from_millis(100),
        }
    }
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_SERIAL_PORT.to_string(),
            baud_rate: DEFAULT_BAUD_RATE,
            read_timeout: Duration::from_secs(1),
            connect_attempts: 5,
            retry_delay: Duration::from_secs(2),
        }
    }
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_BACKEND_URL.to_string(),
            request_timeout: Duration::from_secs(5),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_LOG_FILE),
            max_entries: MAX_LOG_ENTRIES,
        }
    }
}
