//! Device text protocol parser
//!
//! The soil probe firmware exposes two plain-text endpoints, each of which
//! has shipped in more than one format over time:
//!
//! ```text
//! /raw_dht11   "<humidity> <temperature> <heatIndex>"
//!              "<humidity> <temperature>"
//!              "<humidity>|<temperature>"              (legacy)
//!
//! /raw_a       "<integer>"                             (legacy)
//!              "A=<int> R_top=<float> R_bottom=<float>" (R fields optional)
//! ```
//!
//! Parsing is all-or-nothing for required fields: a payload either yields a
//! complete structure or a [`ProtocolError::Malformed`] carrying the raw text.
//! Optional fields that fail to parse are dropped rather than rejected.

use thiserror::Error;

/// Which device endpoint a payload came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Dht,
    Analog,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Endpoint::Dht => write!(f, "raw_dht11"),
            Endpoint::Analog => write!(f, "raw_a"),
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq)]
pub enum ProtocolError {
    #[error("malformed {endpoint} payload {payload:?}: {reason}")]
    Malformed {
        endpoint: Endpoint,
        payload: String,
        reason: String,
    },
}

impl ProtocolError {
    fn malformed(endpoint: Endpoint, payload: &str, reason: impl Into<String>) -> Self {
        ProtocolError::Malformed {
            endpoint,
            payload: payload.to_string(),
            reason: reason.into(),
        }
    }

    /// The raw text that failed to parse.
    pub fn payload(&self) -> &str {
        match self {
            ProtocolError::Malformed { payload, .. } => payload,
        }
    }
}

/// Parsed `/raw_dht11` payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DhtPayload {
    pub humidity: f64,
    pub temperature: f64,
    pub heat_index: Option<f64>,
}

impl DhtPayload {
    /// Heat index as reported, or the air temperature when the device omits it.
    pub fn heat_index_or_temperature(&self) -> f64 {
        self.heat_index.unwrap_or(self.temperature)
    }
}

/// Parsed `/raw_a` payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnalogPayload {
    pub raw_value: i32,
    pub resistance_top: Option<f64>,
    pub resistance_bottom: Option<f64>,
}

/// Parse a finite float, treating `NaN`/`inf` spellings as unparseable.
fn parse_finite(token: &str) -> Option<f64> {
    token.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Parse an ADC integer. Fractional input is truncated toward zero.
fn parse_adc(token: &str) -> Option<i32> {
    let token = token.trim();
    if let Ok(v) = token.parse::<i32>() {
        return Some(v);
    }
    parse_finite(token)
        .filter(|v| *v >= f64::from(i32::MIN) && *v <= f64::from(i32::MAX))
        .map(|v| v.trunc() as i32)
}

/// Parse a `/raw_dht11` payload in any of the three known formats.
pub fn parse_dht(payload: &str) -> Result<DhtPayload, ProtocolError> {
    let text = payload.trim();

    let tokens: Vec<&str> = if text.contains('|') {
        text.split('|').map(str::trim).collect()
    } else {
        text.split_whitespace().collect()
    };

    if tokens.len() < 2 {
        return Err(ProtocolError::malformed(
            Endpoint::Dht,
            payload,
            format!("expected at least 2 fields, got {}", tokens.len()),
        ));
    }

    let humidity = parse_finite(tokens[0])
        .ok_or_else(|| ProtocolError::malformed(Endpoint::Dht, payload, "humidity is not numeric"))?;
    let temperature = parse_finite(tokens[1]).ok_or_else(|| {
        ProtocolError::malformed(Endpoint::Dht, payload, "temperature is not numeric")
    })?;

    // The pipe format never carried a heat index.
    let heat_index = if text.contains('|') {
        None
    } else {
        tokens.get(2).and_then(|t| {
            let parsed = parse_finite(t);
            if parsed.is_none() {
                tracing::debug!(token = %t, "Ignoring non-numeric heat index");
            }
            parsed
        })
    };

    Ok(DhtPayload {
        humidity,
        temperature,
        heat_index,
    })
}

/// Parse a `/raw_a` payload. Key/value format is detected by the presence of `=`.
pub fn parse_analog(payload: &str) -> Result<AnalogPayload, ProtocolError> {
    let text = payload.trim();

    if !text.contains('=') {
        let raw_value = parse_adc(text).ok_or_else(|| {
            ProtocolError::malformed(Endpoint::Analog, payload, "raw value is not an integer")
        })?;
        return Ok(AnalogPayload {
            raw_value,
            resistance_top: None,
            resistance_bottom: None,
        });
    }

    let mut raw: Option<&str> = None;
    let mut resistance_top = None;
    let mut resistance_bottom = None;

    for field in text.split_whitespace() {
        let Some((key, value)) = field.split_once('=') else {
            continue;
        };
        match key {
            "A" => raw = Some(value),
            "R_top" => resistance_top = parse_finite(value),
            "R_bottom" => resistance_bottom = parse_finite(value),
            other => tracing::debug!(key = %other, "Ignoring unknown analog field"),
        }
    }

    let raw = raw.ok_or_else(|| ProtocolError::malformed(Endpoint::Analog, payload, "missing A field"))?;
    let raw_value = parse_adc(raw)
        .ok_or_else(|| ProtocolError::malformed(Endpoint::Analog, payload, "A is not an integer"))?;

    Ok(AnalogPayload {
        raw_value,
        resistance_top,
        resistance_bottom,
    })
}
