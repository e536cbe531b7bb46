//! Timestamp normalization and display formatting.
//!
//! The feeds carry three timestamp shapes: the service's native instant,
//! ISO-like text (including a legacy slash-separated date form), and
//! serialized `{seconds: ..}` objects. Normalization runs an ordered
//! chain of parsers, first success wins. Parse failure is never an
//! error; it degrades to [`Normalized::Unparseable`] and the call site's
//! fallback label.

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tally_feed_protocol::TimestampValue;

/// Fallback label for log entries whose timestamp did not parse.
pub const LOG_TIME_FALLBACK: &str = "Recent activity";

/// Fallback label for an occupancy card whose `last_updated` is present
/// but unparseable.
pub const CARD_TIME_FALLBACK: &str = "Recent update";

/// Label for an occupancy card with no `last_updated` at all.
pub const CARD_TIME_MISSING: &str = "Just now";

/// Naive datetime layouts accepted after ISO-like cleanup.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
];

/// A normalized timestamp: a canonical instant, or the sentinel for
/// values that matched no known shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Normalized {
    Instant(DateTime<Utc>),
    Unparseable,
}

impl Normalized {
    pub fn instant(self) -> Option<DateTime<Utc>> {
        match self {
            Normalized::Instant(instant) => Some(instant),
            Normalized::Unparseable => None,
        }
    }

    /// Renders the instant relative to `now`, or the supplied fallback.
    pub fn label(self, now: DateTime<Utc>, fallback: &str) -> String {
        match self {
            Normalized::Instant(instant) => format_relative(instant, now),
            Normalized::Unparseable => fallback.to_string(),
        }
    }
}

type Parser = fn(&TimestampValue) -> Option<DateTime<Utc>>;

/// Ordered parser chain: native instant, ISO-like text, epoch seconds.
const PARSERS: &[Parser] = &[parse_native, parse_text_value, parse_epoch_value];

/// Converts a raw wire timestamp into a canonical instant.
///
/// Pure and total: no shape ever panics or errors out of this function.
pub fn normalize(raw: &TimestampValue) -> Normalized {
    for parser in PARSERS {
        if let Some(instant) = parser(raw) {
            return Normalized::Instant(instant);
        }
    }
    tracing::debug!(raw = ?raw, "timestamp matched no known shape");
    Normalized::Unparseable
}

fn parse_native(raw: &TimestampValue) -> Option<DateTime<Utc>> {
    match raw {
        TimestampValue::Native(instant) => Some(*instant),
        _ => None,
    }
}

fn parse_text_value(raw: &TimestampValue) -> Option<DateTime<Utc>> {
    match raw {
        TimestampValue::Text(text) => parse_text(text),
        _ => None,
    }
}

fn parse_epoch_value(raw: &TimestampValue) -> Option<DateTime<Utc>> {
    match raw {
        TimestampValue::EpochSeconds { seconds } => TimestampValue::epoch_instant(*seconds),
        _ => None,
    }
}

/// Parses the text shapes. Strings with both a date/time separator and a
/// colon are treated as ISO-like and cleaned first; the original
/// untrimmed string is retried as a last resort before giving up.
fn parse_text(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    let iso_like = (trimmed.contains('T') || trimmed.contains(' ')) && trimmed.contains(':');
    let candidate = if iso_like {
        clean_iso_like(trimmed)
    } else {
        trimmed.to_string()
    };

    parse_instant(&candidate).or_else(|| parse_instant(raw))
}

/// Normalizes an ISO-like string: one `T` becomes a space; slash-dated
/// strings are re-separated with dashes and cut at 19 characters;
/// otherwise the sub-second suffix is dropped. A bare trailing zone
/// marker is stripped so the naive layouts apply.
fn clean_iso_like(text: &str) -> String {
    let mut cleaned = text.replacen('T', " ", 1);
    if text.contains('/') {
        cleaned = cleaned.replace('/', "-");
        cleaned.truncate(19);
    } else if let Some(dot) = cleaned.find('.') {
        cleaned.truncate(dot);
    }
    cleaned.trim_end_matches('Z').to_string()
}

fn parse_instant(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }
    None
}

/// Renders an instant relative to `now`: `Today at HH:MM`,
/// `Yesterday at HH:MM`, or `Mon D at HH:MM`.
pub fn format_relative(instant: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let date = instant.date_naive();
    let today = now.date_naive();
    let time = instant.format("%H:%M");
    if date == today {
        format!("Today at {time}")
    } else if today.pred_opt() == Some(date) {
        format!("Yesterday at {time}")
    } else {
        format!("{} at {time}", instant.format("%b %-d"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instant(text: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(text)
            .expect("test instant")
            .with_timezone(&Utc)
    }

    #[test]
    fn normalizes_native_instant_directly() {
        let at = instant("2025-09-24T10:15:00Z");
        assert_eq!(
            normalize(&TimestampValue::Native(at)),
            Normalized::Instant(at)
        );
    }

    #[test]
    fn normalizes_rfc3339_text() {
        let raw = TimestampValue::Text("2025-09-24T10:15:00Z".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T10:15:00Z"))
        );
    }

    #[test]
    fn normalizes_text_with_subsecond_suffix() {
        let raw = TimestampValue::Text("2025-09-24T10:15:00.123456Z".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T10:15:00Z"))
        );
    }

    #[test]
    fn normalizes_slash_dated_text() {
        let raw = TimestampValue::Text("2025/09/24T10:15:00".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T10:15:00Z"))
        );
    }

    #[test]
    fn normalizes_slash_dated_text_with_suffix() {
        let raw = TimestampValue::Text("2025/09/24T10:15:00.987Z".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T10:15:00Z"))
        );
    }

    #[test]
    fn normalizes_space_separated_text() {
        let raw = TimestampValue::Text("2025-09-24 10:15:00".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T10:15:00Z"))
        );
    }

    #[test]
    fn retries_original_for_offset_text() {
        // The cleanup leaves the offset attached and the naive layouts
        // reject it; the last-resort parse of the original succeeds.
        let raw = TimestampValue::Text("2025-09-24T10:15:00+05:30".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T04:45:00Z"))
        );
    }

    #[test]
    fn trims_before_parsing() {
        let raw = TimestampValue::Text("  2025-09-24T10:15:00Z  ".to_string());
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2025-09-24T10:15:00Z"))
        );
    }

    #[test]
    fn normalizes_epoch_seconds() {
        let raw = TimestampValue::epoch(1700000000);
        assert_eq!(
            normalize(&raw),
            Normalized::Instant(instant("2023-11-14T22:13:20Z"))
        );
    }

    #[test]
    fn unparseable_text_yields_sentinel() {
        let raw = TimestampValue::Text("not-a-date".to_string());
        assert_eq!(normalize(&raw), Normalized::Unparseable);
    }

    #[test]
    fn empty_text_yields_sentinel() {
        let raw = TimestampValue::Text("   ".to_string());
        assert_eq!(normalize(&raw), Normalized::Unparseable);
    }

    #[test]
    fn unknown_object_shape_yields_sentinel() {
        let raw = TimestampValue::Other(serde_json::json!({ "nanos": 12 }));
        assert_eq!(normalize(&raw), Normalized::Unparseable);
    }

    #[test]
    fn round_trips_each_accepted_shape_within_a_second() {
        let canonical = instant("2025-09-24T10:15:00Z");
        let shapes = [
            TimestampValue::Native(canonical),
            TimestampValue::Text(canonical.to_rfc3339()),
            TimestampValue::Text(canonical.format("%Y-%m-%d %H:%M:%S").to_string()),
            TimestampValue::Text(canonical.format("%Y/%m/%dT%H:%M:%S").to_string()),
            TimestampValue::epoch(canonical.timestamp()),
        ];
        for shape in shapes {
            let parsed = normalize(&shape).instant().expect("shape should parse");
            let drift = (parsed - canonical).num_seconds().abs();
            assert!(drift <= 1, "{shape:?} drifted {drift}s");
        }
    }

    #[test]
    fn labels_fall_back_per_call_site() {
        let now = instant("2025-09-24T12:00:00Z");
        assert_eq!(
            Normalized::Unparseable.label(now, LOG_TIME_FALLBACK),
            "Recent activity"
        );
        assert_eq!(
            Normalized::Unparseable.label(now, CARD_TIME_FALLBACK),
            "Recent update"
        );
    }

    #[test]
    fn formats_today_yesterday_and_older() {
        let now = instant("2025-09-24T18:00:00Z");
        assert_eq!(
            format_relative(instant("2025-09-24T10:15:00Z"), now),
            "Today at 10:15"
        );
        assert_eq!(
            format_relative(instant("2025-09-23T22:05:00Z"), now),
            "Yesterday at 22:05"
        );
        assert_eq!(
            format_relative(instant("2025-09-20T08:30:00Z"), now),
            "Sep 20 at 08:30"
        );
    }
}
