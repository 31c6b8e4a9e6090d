use std::sync::LazyLock;

use chrono::{DateTime, Datelike, FixedOffset, NaiveDate, NaiveDateTime, Utc};
use regex::Regex;

use crate::error::ReportError;
use crate::models::{PeriodSpec, TimeWindow};

/// Fixed reference zone for window arithmetic and display labels (JST).
pub fn reference_zone() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("UTC+9 is a valid fixed offset")
}

static RELATIVE_MONTHS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-(\d+)$").expect("valid relative-month pattern"));
static EXPLICIT_MONTH: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{4})[-/](\d{1,2})$").expect("valid month pattern"));
static EXPLICIT_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4}-\d{2}-\d{2} \d{2}:\d{2})\s*(?:\.\.|〜|~)\s*(\d{4}-\d{2}-\d{2} \d{2}:\d{2})$",
    )
    .expect("valid range pattern")
});

/// Parse a period literal from the command surface.
///
/// Accepted forms: `this`/`今月`/`0`, `last`/`先月`/`-1`, `-N`,
/// `YYYY-MM` (or `YYYY/MM`), `all`/`全期間`, and an explicit range
/// `YYYY-MM-DD HH:MM..YYYY-MM-DD HH:MM` at minute precision.
pub fn parse(text: &str) -> Result<PeriodSpec, ReportError> {
    let trimmed = text.trim();
    let lowered = trimmed.to_ascii_lowercase();

    match lowered.as_str() {
        "all" | "全期間" => return Ok(PeriodSpec::AllTime),
        "last" | "先月" | "-1" => return Ok(PeriodSpec::PreviousPeriod),
        "this" | "今月" | "0" => return Ok(PeriodSpec::ThisPeriod),
        _ => {}
    }

    if let Some(caps) = RELATIVE_MONTHS.captures(&lowered) {
        if let Ok(months) = caps[1].parse::<u32>() {
            return Ok(PeriodSpec::RelativeOffset { months });
        }
    }

    if let Some(caps) = EXPLICIT_MONTH.captures(trimmed) {
        let year = caps[1].parse::<i32>();
        let month = caps[2].parse::<u32>();
        if let (Ok(year), Ok(month)) = (year, month) {
            return Ok(PeriodSpec::ExplicitMonth { year, month });
        }
    }

    if let Some(caps) = EXPLICIT_RANGE.captures(trimmed) {
        let start = NaiveDateTime::parse_from_str(&caps[1], "%Y-%m-%d %H:%M");
        let end = NaiveDateTime::parse_from_str(&caps[2], "%Y-%m-%d %H:%M");
        if let (Ok(start), Ok(end)) = (start, end) {
            return Ok(PeriodSpec::ExplicitRange { start, end });
        }
    }

    Err(ReportError::InvalidPeriodSpec {
        literal: trimmed.to_string(),
    })
}

/// Resolve a period specifier into a half-open `[start, end)` window
/// against the supplied reference instant.
pub fn resolve(spec: &PeriodSpec, now: DateTime<Utc>) -> Result<TimeWindow, ReportError> {
    let local_now = now.with_timezone(&reference_zone());

    match spec {
        PeriodSpec::ThisPeriod => month_window(local_now.year(), local_now.month()),
        PeriodSpec::PreviousPeriod => {
            if local_now.month() == 1 {
                month_window(local_now.year() - 1, 12)
            } else {
                month_window(local_now.year(), local_now.month() - 1)
            }
        }
        PeriodSpec::RelativeOffset { months } => {
            let mut year = i64::from(local_now.year());
            let mut month = i64::from(local_now.month()) - i64::from(*months);
            while month <= 0 {
                month += 12;
                year -= 1;
            }
            let year = i32::try_from(year).map_err(|_| ReportError::InvalidPeriodSpec {
                literal: format!("-{months}"),
            })?;
            month_window(year, month as u32)
        }
        PeriodSpec::ExplicitMonth { year, month } => month_window(*year, *month),
        PeriodSpec::ExplicitRange { start, end } => {
            if start >= end {
                return Err(ReportError::InvalidRange {
                    start: *start,
                    end: *end,
                });
            }
            Ok(TimeWindow {
                start: Some(to_utc(*start)),
                end: Some(to_utc(*end)),
            })
        }
        PeriodSpec::AllTime => Ok(TimeWindow::ALL),
    }
}

/// Human label for the resolved period, derived from the same value
/// `resolve` produces so the two can never disagree.
pub fn format(spec: &PeriodSpec, now: DateTime<Utc>) -> Result<String, ReportError> {
    match spec {
        PeriodSpec::AllTime => Ok("全期間".to_string()),
        PeriodSpec::ExplicitRange { start, end } => {
            resolve(spec, now)?;
            Ok(format!(
                "{} 〜 {}",
                start.format("%Y-%m-%d %H:%M"),
                end.format("%Y-%m-%d %H:%M")
            ))
        }
        _ => {
            let window = resolve(spec, now)?;
            let Some(start) = window.start else {
                return Ok("全期間".to_string());
            };
            let local = start.with_timezone(&reference_zone());
            Ok(format!("{}年{}月", local.year(), local.month()))
        }
    }
}

/// Artifact filename for the resolved period, with the locale-specific
/// separators of the label mapped for file-system use.
pub fn report_filename(spec: &PeriodSpec, now: DateTime<Utc>) -> Result<String, ReportError> {
    let label = format(spec, now)?;
    Ok(format!("{}_report.csv", label.replace('年', "-").replace('月', "")))
}

fn month_window(year: i32, month: u32) -> Result<TimeWindow, ReportError> {
    let start = month_start(year, month).ok_or_else(|| invalid_month(year, month))?;
    let (next_year, next_month) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    let end = month_start(next_year, next_month).ok_or_else(|| invalid_month(year, month))?;
    Ok(TimeWindow {
        start: Some(start),
        end: Some(end),
    })
}

fn month_start(year: i32, month: u32) -> Option<DateTime<Utc>> {
    let first = NaiveDate::from_ymd_opt(year, month, 1)?.and_hms_opt(0, 0, 0)?;
    Some(to_utc(first))
}

fn to_utc(local: NaiveDateTime) -> DateTime<Utc> {
    local
        .and_local_timezone(reference_zone())
        .single()
        .expect("fixed offsets map local times uniquely")
        .with_timezone(&Utc)
}

fn invalid_month(year: i32, month: u32) -> ReportError {
    ReportError::InvalidPeriodSpec {
        literal: format!("{year}-{month:02}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn local_instant(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
        reference_zone()
            .with_ymd_and_hms(year, month, day, hour, minute, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn this_period_covers_the_current_month() {
        let now = local_instant(2024, 6, 18, 14, 30);
        let window = resolve(&PeriodSpec::ThisPeriod, now).unwrap();
        assert_eq!(window.start, Some(local_instant(2024, 6, 1, 0, 0)));
        assert_eq!(window.end, Some(local_instant(2024, 7, 1, 0, 0)));
    }

    #[test]
    fn previous_period_rolls_back_over_the_year_boundary() {
        let now = local_instant(2025, 1, 10, 9, 0);
        let window = resolve(&PeriodSpec::PreviousPeriod, now).unwrap();
        assert_eq!(window.start, Some(local_instant(2024, 12, 1, 0, 0)));
        assert_eq!(window.end, Some(local_instant(2025, 1, 1, 0, 0)));
    }

    #[test]
    fn december_rolls_forward_into_the_next_year() {
        let window =
            resolve(&PeriodSpec::ExplicitMonth { year: 2024, month: 12 }, Utc::now()).unwrap();
        assert_eq!(window.end, Some(local_instant(2025, 1, 1, 0, 0)));
    }

    #[test]
    fn relative_offset_borrows_whole_years() {
        // 14 months back from March 2025 is January 2024.
        let now = local_instant(2025, 3, 20, 8, 0);
        let window = resolve(&PeriodSpec::RelativeOffset { months: 14 }, now).unwrap();
        assert_eq!(window.start, Some(local_instant(2024, 1, 1, 0, 0)));
        assert_eq!(window.end, Some(local_instant(2024, 2, 1, 0, 0)));
    }

    #[test]
    fn relative_offset_zero_is_the_current_month() {
        let now = local_instant(2024, 6, 18, 14, 30);
        assert_eq!(
            resolve(&PeriodSpec::RelativeOffset { months: 0 }, now).unwrap(),
            resolve(&PeriodSpec::ThisPeriod, now).unwrap()
        );
    }

    #[test]
    fn adjacent_months_tile_without_gap_or_overlap() {
        let now = Utc::now();
        for month in 1..=11 {
            let current =
                resolve(&PeriodSpec::ExplicitMonth { year: 2024, month }, now).unwrap();
            let next = resolve(
                &PeriodSpec::ExplicitMonth {
                    year: 2024,
                    month: month + 1,
                },
                now,
            )
            .unwrap();
            assert_eq!(current.end, next.start, "month {month} must tile");
        }
    }

    #[test]
    fn all_time_is_unbounded() {
        let window = resolve(&PeriodSpec::AllTime, Utc::now()).unwrap();
        assert_eq!(window, TimeWindow::ALL);
    }

    #[test]
    fn explicit_range_rejects_inverted_bounds() {
        let start = NaiveDate::from_ymd_opt(2024, 2, 1)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 1, 1)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        let err = resolve(&PeriodSpec::ExplicitRange { start, end }, Utc::now());
        assert!(matches!(err, Err(ReportError::InvalidRange { .. })));
    }

    #[test]
    fn out_of_range_month_is_rejected() {
        let err = resolve(&PeriodSpec::ExplicitMonth { year: 2024, month: 13 }, Utc::now());
        assert!(matches!(err, Err(ReportError::InvalidPeriodSpec { .. })));
    }

    #[test]
    fn parse_accepts_the_command_surface_grammar() {
        assert_eq!(
            parse("2024-01").unwrap(),
            PeriodSpec::ExplicitMonth { year: 2024, month: 1 }
        );
        assert_eq!(
            parse("2024/3").unwrap(),
            PeriodSpec::ExplicitMonth { year: 2024, month: 3 }
        );
        assert_eq!(parse("last").unwrap(), PeriodSpec::PreviousPeriod);
        assert_eq!(parse("先月").unwrap(), PeriodSpec::PreviousPeriod);
        assert_eq!(parse("this").unwrap(), PeriodSpec::ThisPeriod);
        assert_eq!(parse("今月").unwrap(), PeriodSpec::ThisPeriod);
        assert_eq!(parse("-3").unwrap(), PeriodSpec::RelativeOffset { months: 3 });
        assert_eq!(parse("all").unwrap(), PeriodSpec::AllTime);
        assert_eq!(parse("全期間").unwrap(), PeriodSpec::AllTime);
    }

    #[test]
    fn parse_accepts_minute_precision_ranges() {
        let spec = parse("2024-01-01 00:00..2024-01-15 23:59").unwrap();
        match spec {
            PeriodSpec::ExplicitRange { start, end } => {
                assert_eq!(start.format("%Y-%m-%d %H:%M").to_string(), "2024-01-01 00:00");
                assert_eq!(end.format("%Y-%m-%d %H:%M").to_string(), "2024-01-15 23:59");
            }
            other => panic!("expected range, got {other:?}"),
        }
    }

    #[test]
    fn parse_surfaces_the_offending_literal() {
        let err = parse("two weeks ago");
        match err {
            Err(ReportError::InvalidPeriodSpec { literal }) => {
                assert_eq!(literal, "two weeks ago");
            }
            other => panic!("expected InvalidPeriodSpec, got {other:?}"),
        }
    }

    #[test]
    fn labels_come_from_the_resolved_value() {
        let now = local_instant(2025, 1, 10, 9, 0);
        assert_eq!(format(&PeriodSpec::PreviousPeriod, now).unwrap(), "2024年12月");
        assert_eq!(
            format(&PeriodSpec::ExplicitMonth { year: 2024, month: 1 }, now).unwrap(),
            "2024年1月"
        );
        assert_eq!(format(&PeriodSpec::AllTime, now).unwrap(), "全期間");
    }

    #[test]
    fn filenames_map_locale_separators() {
        let now = local_instant(2024, 6, 18, 14, 30);
        assert_eq!(
            report_filename(&PeriodSpec::ExplicitMonth { year: 2024, month: 1 }, now).unwrap(),
            "2024-1_report.csv"
        );
        assert_eq!(
            report_filename(&PeriodSpec::AllTime, now).unwrap(),
            "全期間_report.csv"
        );
    }
}
