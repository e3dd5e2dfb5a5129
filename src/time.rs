use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, Utc};

pub fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

/// Current instant as an RFC 3339 string with millisecond precision.
pub fn now_iso() -> String {
    to_iso(Utc::now())
}

pub fn to_iso(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Parse the date shapes seed data and request parameters use: RFC 3339,
/// naive `YYYY-MM-DDTHH:MM:SS` (taken as UTC) and bare `YYYY-MM-DD`.
pub fn parse_datetime(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if raw.len() < 10 {
        return None;
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(naive.and_utc());
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Calendar day (UTC) of a date-like string.
pub fn parse_day(raw: &str) -> Option<NaiveDate> {
    parse_datetime(raw).map(|at| at.date_naive())
}

pub fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn now_ms_is_reasonable() {
        let a = now_ms();
        assert!(a > 1_500_000_000_000); // after 2017
        assert!(a < 4_100_000_000_000); // before year ~2100
    }

    #[test]
    fn parses_all_supported_shapes() {
        let full = parse_datetime("2024-03-01T10:30:00.000Z").expect("rfc3339");
        assert_eq!(to_iso(full), "2024-03-01T10:30:00.000Z");
        let naive = parse_datetime("2024-03-01T10:30:00").expect("naive");
        assert_eq!(naive, full);
        let day = parse_day("2024-03-01").expect("date");
        assert_eq!(day.to_string(), "2024-03-01");
    }

    #[test]
    fn rejects_non_dates() {
        assert!(parse_datetime("Buddy").is_none());
        assert!(parse_datetime("12345").is_none());
        assert!(parse_datetime("not-a-real-date").is_none());
    }
}
