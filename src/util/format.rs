use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Format a byte count as a human-readable string (B, KB, MB, GB)
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = 1024 * 1024;
    const GB: u64 = 1024 * 1024 * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.1} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.1} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// Format a Unix timestamp as a UTC `YYYY-MM-DD` string
pub fn format_timestamp(timestamp: i64) -> String {
    if timestamp == 0 {
        return "unknown".to_string();
    }

    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .and_then(|dt| dt.format(format_description!("[year]-[month]-[day]")).ok())
        .unwrap_or_else(|| "unknown".to_string())
}

/// Format a Unix timestamp in the timezone git recorded, e.g. `+0130`,
/// as `YYYY-MM-DD HH:MM:SS +hhmm`
pub fn format_timestamp_with_offset(timestamp: i64, offset: &str) -> String {
    let Some(utc_offset) = parse_offset(offset) else {
        return format_timestamp(timestamp);
    };

    OffsetDateTime::from_unix_timestamp(timestamp)
        .ok()
        .map(|dt| dt.to_offset(utc_offset))
        .and_then(|dt| {
            dt.format(format_description!(
                "[year]-[month]-[day] [hour]:[minute]:[second] [offset_hour sign:mandatory][offset_minute]"
            ))
            .ok()
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Parse git's `+hhmm` / `-hhmm` timezone notation
fn parse_offset(offset: &str) -> Option<UtcOffset> {
    let (sign, digits) = match offset.as_bytes().first()? {
        b'+' => (1i8, &offset[1..]),
        b'-' => (-1i8, &offset[1..]),
        _ => return None,
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours: i8 = digits[..2].parse().ok()?;
    let minutes: i8 = digits[2..].parse().ok()?;
    UtcOffset::from_hms(sign * hours, sign * minutes, 0).ok()
}
