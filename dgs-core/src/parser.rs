use std::str::FromStr;

use crate::{ENVIRONMENT_SCALE, PPB_BASELINE_OFFSET, Reading};

/// Reasons a sensor output line does not yield a [`Reading`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("expected 7 fields, got {fields}: {line}")]
    MalformedLine { fields: usize, line: Box<str> },

    #[error("invalid {field} value {value:?}: {line}")]
    Numeric {
        field: &'static str,
        value: Box<str>,
        line: Box<str>,
    },
}

/// Parse one line of sensor output, stamping it with the current time.
///
/// Expected format: `sensor_sn, ppb, temperature, humidity, adc_gas, adc_temp, adc_hum`.
pub fn parse_line(line: &str) -> Result<Reading, ParseError> {
    parse_line_at(line, jiff::Timestamp::now())
}

/// Parse one line of sensor output with an explicit capture instant.
pub fn parse_line_at(line: &str, timestamp: jiff::Timestamp) -> Result<Reading, ParseError> {
    let parts: Vec<&str> = line.split(',').map(str::trim).collect();

    let &[sensor_sn, ppb_raw, temp_raw, hum_raw, adc_gas, adc_temp, adc_hum] = parts.as_slice()
    else {
        return Err(ParseError::MalformedLine {
            fields: parts.len(),
            line: line.into(),
        });
    };

    let ppb_raw: f64 = numeric(line, "ppb", ppb_raw)?;
    let temp_raw: f64 = numeric(line, "temperature", temp_raw)?;
    let hum_raw: f64 = numeric(line, "humidity", hum_raw)?;

    Ok(Reading {
        timestamp,
        sensor_sn: sensor_sn.into(),
        ppb: ppb_raw - PPB_BASELINE_OFFSET,
        temperature: temp_raw / ENVIRONMENT_SCALE,
        humidity: hum_raw / ENVIRONMENT_SCALE,
        adc_gas: numeric(line, "adc_gas", adc_gas)?,
        adc_temp: numeric(line, "adc_temp", adc_temp)?,
        adc_hum: numeric(line, "adc_hum", adc_hum)?,
    })
}

fn numeric<T: FromStr>(line: &str, field: &'static str, value: &str) -> Result<T, ParseError> {
    value.parse().map_err(|_| ParseError::Numeric {
        field,
        value: value.into(),
        line: line.into(),
    })
}
