mod parser;

pub use parser::{ParseError, parse_line, parse_line_at};

use serde::{Deserialize, Serialize};

// Same convention as the rest of the workspace: `Box<str>` for strings that are
// never grown after construction.
type BoxStr = Box<str>;

/// Zero-point drift of the DGS2 gas channel, subtracted from every raw ppb value.
pub const PPB_BASELINE_OFFSET: f64 = 2300.0;

/// Temperature and humidity are reported as integers scaled by this factor.
pub const ENVIRONMENT_SCALE: f64 = 100.0;

/// Column names of a reading, in wire and log order.
pub const READING_FIELDS: [&str; 8] = [
    "timestamp",
    "sensor_sn",
    "ppb",
    "temperature",
    "humidity",
    "adc_gas",
    "adc_temp",
    "adc_hum",
];

/// A single calibrated measurement taken from the gas sensor.
///
/// Created by [`parse_line`], then borrowed by the forwarder and the local log.
/// Field order matches [`READING_FIELDS`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    /// Capture instant (UTC).
    pub timestamp: jiff::Timestamp,
    /// Serial number reported by the sensor.
    pub sensor_sn: BoxStr,
    /// Gas concentration in ppb, baseline-adjusted.
    pub ppb: f64,
    /// Temperature in °C.
    pub temperature: f64,
    /// Relative humidity in %.
    pub humidity: f64,
    /// Raw ADC count of the gas channel.
    pub adc_gas: i64,
    /// Raw ADC count of the temperature channel.
    pub adc_temp: i64,
    /// Raw ADC count of the humidity channel.
    pub adc_hum: i64,
}
