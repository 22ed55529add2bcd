//! `Range:`/`Scale:` header parsing and formatting for `PLAY` (§4.6).

use std::time::{Duration, SystemTime};

/// A play range in Normal Play Time seconds; `end: None` means "to the end
/// of the file".
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NptRange {
    pub start: f64,
    pub end: Option<f64>,
}

impl NptRange {
    /// Parses `npt=<start>-<end>`; either bound may be empty.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("npt=")?;
        let (start_str, end_str) = rest.split_once('-')?;
        let start = if start_str.is_empty() {
            0.0
        } else {
            start_str.parse().ok()?
        };
        let end = if end_str.is_empty() {
            None
        } else {
            Some(end_str.parse().ok()?)
        };
        Some(Self { start, end })
    }

    /// Formats as `npt=<start>-<end>`, resolving an open end against the
    /// file's duration.
    pub fn format(&self, duration_secs: f64) -> String {
        format!("npt={:.3}-{:.3}", self.start, self.end.unwrap_or(duration_secs))
    }
}

/// Parses a `Scale:` header value. The sign gives playback direction,
/// the magnitude gives speed; `1` (or absent) is normal forward playback.
pub fn parse_scale(value: &str) -> Option<f64> {
    value.trim().parse().ok()
}

/// Formats a single absolute-clock position as an open-ended `Range:` value
/// (`clock=<iso>-`), the form `GET_PARAMETER position` replies with (§4.6).
pub fn clock_point(t: SystemTime) -> String {
    format!("clock={}-", format_iso(t))
}

/// `start + secs` as a `SystemTime`, saturating at `UNIX_EPOCH` for
/// negative offsets (this implementation never produces one, but a
/// malformed upstream clock value should not panic).
pub fn offset(base: SystemTime, secs: f64) -> SystemTime {
    if secs >= 0.0 {
        base + Duration::from_secs_f64(secs)
    } else {
        base.checked_sub(Duration::from_secs_f64(-secs))
            .unwrap_or(base)
    }
}

fn format_iso(t: SystemTime) -> String {
    let dt = time::OffsetDateTime::from(t);
    format!(
        "{:04}{:02}{:02}T{:02}{:02}{:02}Z",
        dt.year(),
        u8::from(dt.month()),
        dt.day(),
        dt.hour(),
        dt.minute(),
        dt.second(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bounded_range() {
        let r = NptRange::parse("npt=3.0-6.0").unwrap();
        assert_eq!(r.start, 3.0);
        assert_eq!(r.end, Some(6.0));
    }

    #[test]
    fn parses_open_ended_range() {
        let r = NptRange::parse("npt=3.0-").unwrap();
        assert_eq!(r.start, 3.0);
        assert_eq!(r.end, None);
    }

    #[test]
    fn open_start_defaults_to_zero() {
        let r = NptRange::parse("npt=-6.0").unwrap();
        assert_eq!(r.start, 0.0);
        assert_eq!(r.end, Some(6.0));
    }

    #[test]
    fn format_resolves_open_end_against_duration() {
        let r = NptRange { start: 1.0, end: None };
        assert_eq!(r.format(10.0), "npt=1.000-10.000");
    }

    #[test]
    fn rejects_missing_npt_prefix() {
        assert!(NptRange::parse("clock=20260101T000000Z-").is_none());
    }

    #[test]
    fn parses_negative_scale_for_reverse() {
        assert_eq!(parse_scale("-2"), Some(-2.0));
    }

    #[test]
    fn clock_point_is_open_ended() {
        let formatted = clock_point(SystemTime::UNIX_EPOCH);
        assert!(formatted.starts_with("clock=19700101T000000Z-"));
        assert!(formatted.ends_with('-'));
    }
}
