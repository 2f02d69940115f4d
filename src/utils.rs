use chrono::Duration;

use crate::errors::{IngestError, Result};

/// Parse a retention string like "10m", "5h" or "30d" into a chrono::Duration
pub fn parse_duration(s: &str) -> Result<Duration> {
    if s.len() < 2 {
        return Err(IngestError::config(format!("Invalid duration '{s}'")));
    }

    let (number, unit) = s.split_at(s.len() - 1);
    let value: i64 = number
        .parse()
        .map_err(|_| IngestError::config(format!("Invalid number in duration '{s}'")))?;
    if value <= 0 {
        return Err(IngestError::config("Duration must be positive"));
    }

    match unit {
        "m" => Ok(Duration::minutes(value)),
        "h" => Ok(Duration::hours(value)),
        "d" => Ok(Duration::days(value)),
        _ => Err(IngestError::config(format!(
            "Invalid duration unit '{unit}'. Use 'm' for minutes, 'h' for hours, or 'd' for days"
        ))),
    }
}
