use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y/%m/%d %H:%M:%S",
    "%Y-%m-%d %H:%M",
];

/// Parse a naive ONS timestamp (`"YYYY-MM-DD HH:MM:SS"` and close variants,
/// or a bare date) → millis since epoch, wall clock taken as UTC.
pub fn parse_timestamp_millis(s: &str) -> Option<i64> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    let naive = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(s, "%Y-%m-%d")
                .ok()
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })?;
    Some(naive.and_utc().timestamp_millis())
}

/// Calendar month `(year, month)` containing `millis`.
pub fn month_of(millis: i64) -> Option<(i32, u32)> {
    DateTime::from_timestamp_millis(millis).map(|dt| (dt.year(), dt.month()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_ons_layouts() {
        let base = parse_timestamp_millis("2024-03-31 23:30:00").unwrap();
        assert_eq!(base, 1_711_927_800_000);
        assert_eq!(parse_timestamp_millis("2024-03-31T23:30:00"), Some(base));
        assert_eq!(parse_timestamp_millis("2024/03/31 23:30:00"), Some(base));
        assert_eq!(parse_timestamp_millis(" 2024-03-31 23:30 "), Some(base));
        assert_eq!(
            parse_timestamp_millis("2024-03-31 23:30:00.250"),
            Some(base + 250)
        );
        assert_eq!(
            parse_timestamp_millis("2024-03-31"),
            Some(base - (23 * 3600 + 30 * 60) * 1000)
        );
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(parse_timestamp_millis(""), None);
        assert_eq!(parse_timestamp_millis("31/03/2024"), None);
        assert_eq!(parse_timestamp_millis("2024-13-01 00:00:00"), None);
    }

    #[test]
    fn month_period() {
        let ms = parse_timestamp_millis("2024-03-31 23:30:00").unwrap();
        assert_eq!(month_of(ms), Some((2024, 3)));
        let next = parse_timestamp_millis("2024-04-01 00:00:00").unwrap();
        assert_eq!(month_of(next), Some((2024, 4)));
    }
}
