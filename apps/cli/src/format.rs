//! Human-readable rendering of schedules, durations, and timestamps.

use chrono::{DateTime, Local};

use clawdeck_protocol::types::CronSchedule;

const NOT_AVAILABLE: &str = "n/a";

pub fn schedule(schedule: &CronSchedule) -> String {
    match schedule {
        CronSchedule::Cron { expr, tz } if !expr.is_empty() => match tz {
            Some(tz) => format!("Cron: {expr} ({tz})"),
            None => format!("Cron: {expr}"),
        },
        CronSchedule::Every { every_ms, .. } if *every_ms > 0 => {
            let mins = (*every_ms as f64 / 60_000.0).round() as u64;
            if mins < 60 {
                return format!("Every {mins}min");
            }
            let hours = (mins as f64 / 60.0).round() as u64;
            if hours < 24 {
                return format!("Every {hours}h");
            }
            format!("Every {}d", (hours as f64 / 24.0).round() as u64)
        }
        CronSchedule::At { at } if !at.is_empty() => format!("At {at}"),
        _ => "Unknown schedule".to_string(),
    }
}

/// `850ms`, `12.5s`, or `1h 2m 5s` for longer spans.
pub fn duration_ms(ms: Option<u64>) -> String {
    let Some(ms) = ms else {
        return NOT_AVAILABLE.to_string();
    };
    if ms < 1_000 {
        return format!("{ms}ms");
    }
    if ms < 60_000 {
        return format!("{:.1}s", ms as f64 / 1000.0);
    }

    let total = ms / 1000;
    let parts = [
        (total / 86_400, "d"),
        (total % 86_400 / 3600, "h"),
        (total % 3600 / 60, "m"),
        (total % 60, "s"),
    ];
    parts
        .iter()
        .filter(|(n, _)| *n > 0)
        .map(|(n, unit)| format!("{n}{unit}"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Local wall-clock time of a unix-ms timestamp.
pub fn timestamp_ms(ms: Option<i64>) -> String {
    ms.and_then(DateTime::from_timestamp_millis)
        .map(|t| t.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| NOT_AVAILABLE.to_string())
}

/// `in 5m`, `3h ago`, or `just now` relative to `now_ms`.
pub fn relative_ms(ms: Option<i64>, now_ms: i64) -> String {
    let Some(ms) = ms else {
        return NOT_AVAILABLE.to_string();
    };
    let delta = ms - now_ms;
    let secs = delta.unsigned_abs() / 1000;
    if secs < 5 {
        return "just now".to_string();
    }
    let span = if secs < 60 {
        format!("{secs}s")
    } else if secs < 3600 {
        format!("{}m", secs / 60)
    } else if secs < 86_400 {
        format!("{}h", secs / 3600)
    } else {
        format!("{}d", secs / 86_400)
    };
    if delta > 0 {
        format!("in {span}")
    } else {
        format!("{span} ago")
    }
}

/// Shows only the last four characters of a secret.
pub fn mask(secret: &str) -> String {
    if secret.is_empty() {
        return "(none)".to_string();
    }
    let tail: String = secret
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    format!("****{tail}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_schedules() {
        let every = |ms| CronSchedule::Every {
            every_ms: ms,
            anchor_ms: None,
        };
        assert_eq!(schedule(&every(15 * 60_000)), "Every 15min");
        assert_eq!(schedule(&every(2 * 3_600_000)), "Every 2h");
        assert_eq!(schedule(&every(3 * 86_400_000)), "Every 3d");
        assert_eq!(schedule(&every(0)), "Unknown schedule");
    }

    #[test]
    fn cron_and_at_schedules() {
        let cron = CronSchedule::Cron {
            expr: "0 7 * * *".into(),
            tz: None,
        };
        assert_eq!(schedule(&cron), "Cron: 0 7 * * *");
        let cron_tz = CronSchedule::Cron {
            expr: "0 7 * * *".into(),
            tz: Some("Europe/Paris".into()),
        };
        assert_eq!(schedule(&cron_tz), "Cron: 0 7 * * * (Europe/Paris)");
        let at = CronSchedule::At {
            at: "2026-01-01T09:00:00Z".into(),
        };
        assert_eq!(schedule(&at), "At 2026-01-01T09:00:00Z");
        assert_eq!(schedule(&CronSchedule::Unknown), "Unknown schedule");
    }

    #[test]
    fn durations() {
        assert_eq!(duration_ms(None), "n/a");
        assert_eq!(duration_ms(Some(850)), "850ms");
        assert_eq!(duration_ms(Some(12_500)), "12.5s");
        assert_eq!(duration_ms(Some(3_725_000)), "1h 2m 5s");
        assert_eq!(duration_ms(Some(120_000)), "2m");
    }

    #[test]
    fn timestamps() {
        assert_eq!(timestamp_ms(None), "n/a");
        assert_eq!(timestamp_ms(Some(0)).len(), "1970-01-01 00:00:00".len());
    }

    #[test]
    fn relative_times() {
        let now = 1_700_000_000_000;
        assert_eq!(relative_ms(None, now), "n/a");
        assert_eq!(relative_ms(Some(now + 1000), now), "just now");
        assert_eq!(relative_ms(Some(now + 5 * 60_000), now), "in 5m");
        assert_eq!(relative_ms(Some(now - 3 * 3_600_000), now), "3h ago");
        assert_eq!(relative_ms(Some(now - 2 * 86_400_000), now), "2d ago");
    }

    #[test]
    fn masking() {
        assert_eq!(mask(""), "(none)");
        assert_eq!(mask("abcdef123"), "****f123");
        assert_eq!(mask("ab"), "****ab");
    }
}
