//! Timestamp parsing and formatting utilities.
//!
//! Shared timestamp handling for event logs and subtitle output,
//! supporting formats like HH:MM:SS, HH:MM:SS.mmm, MM:SS, and SS.

/// Maximum reasonable recording duration (12 hours in seconds).
pub const MAX_RECORDING_DURATION_SECS: f64 = 43200.0;

/// Parse a timestamp string to total seconds.
///
/// Supports formats:
/// - `HH:MM:SS` or `HH:MM:SS.mmm`
/// - `MM:SS` or `MM:SS.mmm`
/// - `SS` or `SS.mmm`
///
/// # Examples
/// ```
/// use reel_models::timestamp::parse_timestamp;
/// assert_eq!(parse_timestamp("01:30:00").unwrap(), 5400.0);
/// assert_eq!(parse_timestamp("23:00").unwrap(), 1380.0);
/// assert_eq!(parse_timestamp("90").unwrap(), 90.0);
/// ```
pub fn parse_timestamp(ts: &str) -> Result<f64, TimestampError> {
    let ts = ts.trim();
    if ts.is_empty() {
        return Err(TimestampError::Empty);
    }

    let parts: Vec<&str> = ts.split(':').collect();
    let parse_part = |label: &'static str, raw: &str| -> Result<f64, TimestampError> {
        raw.parse::<f64>()
            .map_err(|_| TimestampError::InvalidValue(label, raw.to_string()))
    };

    let total = match parts.len() {
        1 => parse_part("seconds", parts[0])?,
        2 => {
            let minutes = parse_part("minutes", parts[0])?;
            let seconds = parse_part("seconds", parts[1])?;
            minutes * 60.0 + seconds
        }
        3 => {
            let hours = parse_part("hours", parts[0])?;
            let minutes = parse_part("minutes", parts[1])?;
            let seconds = parse_part("seconds", parts[2])?;
            hours * 3600.0 + minutes * 60.0 + seconds
        }
        _ => return Err(TimestampError::InvalidFormat(ts.to_string())),
    };

    if parts.iter().any(|p| p.starts_with('-')) || total < 0.0 {
        return Err(TimestampError::Negative);
    }
    if total > MAX_RECORDING_DURATION_SECS {
        return Err(TimestampError::ExceedsMaxDuration(MAX_RECORDING_DURATION_SECS));
    }

    Ok(total)
}

/// Format seconds into HH:MM:SS or HH:MM:SS.mmm string.
pub fn format_seconds(total_secs: f64) -> String {
    let hours = (total_secs / 3600.0).floor() as u32;
    let mins = ((total_secs % 3600.0) / 60.0).floor() as u32;
    let secs = total_secs % 60.0;

    if (secs - secs.floor()).abs() > 0.0001 {
        format!("{:02}:{:02}:{:06.3}", hours, mins, secs)
    } else {
        format!("{:02}:{:02}:{:02}", hours, mins, secs.floor() as u32)
    }
}

/// Format seconds as an SRT timestamp (`HH:MM:SS,mmm`).
///
/// # Examples
/// ```
/// use reel_models::timestamp::format_srt;
/// assert_eq!(format_srt(83.5), "00:01:23,500");
/// ```
pub fn format_srt(total_secs: f64) -> String {
    let total_secs = total_secs.max(0.0);
    let millis = (total_secs * 1000.0).round() as u64;
    let hours = millis / 3_600_000;
    let mins = (millis % 3_600_000) / 60_000;
    let secs = (millis % 60_000) / 1000;
    let ms = millis % 1000;
    format!("{:02}:{:02}:{:02},{:03}", hours, mins, secs, ms)
}

/// Timestamp parsing error.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimestampError {
    #[error("Timestamp cannot be empty")]
    Empty,

    #[error("Timestamp cannot be negative")]
    Negative,

    #[error("Invalid {0} value: {1}")]
    InvalidValue(&'static str, String),

    #[error("Invalid timestamp format '{0}'. Use HH:MM:SS, HH:MM:SS.mmm, MM:SS, or SS")]
    InvalidFormat(String),

    #[error("Timestamp exceeds maximum recording duration ({0} seconds)")]
    ExceedsMaxDuration(f64),
}
