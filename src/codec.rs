//! Control file value codec
//!
//! sysfs exposes enumerated settings as `choice [selected] choice`, and
//! size tunables accept plain byte counts only.

use crate::error::{BcacheError, BcacheResult};

const KIB: u128 = 1024;

/// Decode raw control file text.
///
/// Returns the bracketed token when the text is a choice list, otherwise
/// the trimmed text.
pub fn decode(raw: &str) -> String {
    let trimmed = raw.trim();
    if trimmed.contains('[') {
        let selected = trimmed
            .split_whitespace()
            .find(|token| token.starts_with('[') && token.ends_with(']'));
        if let Some(token) = selected {
            return token.trim_start_matches('[').trim_end_matches(']').to_string();
        }
    }
    trimmed.to_string()
}

/// Convert a human readable size (`4m`, `1.5k`, `2G`, `512`) to bytes.
pub fn human_to_bytes(input: &str) -> BcacheResult<u64> {
    let s = input.trim();
    let invalid = |reason: &str| BcacheError::InvalidValue {
        value: input.to_string(),
        reason: reason.to_string(),
    };

    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (magnitude, unit) = s.split_at(split);

    let (whole, fraction) = magnitude.split_once('.').unwrap_or((magnitude, ""));
    if whole.is_empty() && fraction.is_empty() {
        return Err(invalid("missing numeric magnitude"));
    }
    if fraction.contains('.') {
        return Err(invalid("magnitude is not a number"));
    }

    let multiplier: u128 = match unit.to_ascii_lowercase().as_str() {
        "" => 1,
        "k" => KIB,
        "m" => KIB * KIB,
        "g" => KIB * KIB * KIB,
        _ => return Err(invalid("unit must be one of k, m, g")),
    };

    // Fixed point: digits / 10^len(fraction)
    let digits: u128 = format!("{}{}", whole, fraction)
        .parse()
        .map_err(|_| invalid("magnitude is too large"))?;
    let scale = u32::try_from(fraction.len())
        .ok()
        .and_then(|places| 10u128.checked_pow(places))
        .ok_or_else(|| invalid("too many decimal places"))?;
    let scaled = digits
        .checked_mul(multiplier)
        .ok_or_else(|| invalid("size is too large"))?;

    if scaled % scale != 0 {
        return Err(invalid("size is not a whole number of bytes"));
    }
    u64::try_from(scaled / scale).map_err(|_| invalid("size is too large"))
}

/// A `name:value` tunable assignment as typed on the command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuneSpec {
    pub name: String,
    pub value: String,
}

impl TuneSpec {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }

    /// Parse `name:value`
    pub fn parse(s: &str) -> BcacheResult<Self> {
        match s.split_once(':') {
            Some((name, value)) if !name.is_empty() && !value.is_empty() => {
                Ok(Self::new(name, value))
            }
            _ => Err(BcacheError::InvalidValue {
                value: s.to_string(),
                reason: "tunable string must look like name:value".to_string(),
            }),
        }
    }
}
