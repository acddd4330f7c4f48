use chrono::{Datelike, NaiveDate};

/// Billing cycles are keyed by calendar month, `"YYYY-MM"`.
pub fn month_key(date: NaiveDate) -> String {
    format!("{:04}-{:02}", date.year(), date.month())
}

/// Parse a `"YYYY-MM"` key back to the first day of that month.
pub fn parse_month_key(key: &str) -> Option<NaiveDate> {
    let (year, month) = key.split_once('-')?;
    let year: i32 = year.parse().ok()?;
    let month: u32 = month.parse().ok()?;
    NaiveDate::from_ymd_opt(year, month, 1)
}

/// First day of each calendar month touched by the inclusive date range.
pub fn months_in_range(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    if end < start {
        return months;
    }
    let mut cursor = NaiveDate::from_ymd_opt(start.year(), start.month(), 1).expect("valid first-of-month");
    let last = NaiveDate::from_ymd_opt(end.year(), end.month(), 1).expect("valid first-of-month");
    while cursor <= last {
        months.push(cursor);
        cursor = next_month(cursor);
    }
    months
}

fn next_month(first_of_month: NaiveDate) -> NaiveDate {
    let (year, month) = if first_of_month.month() == 12 {
        (first_of_month.year() + 1, 1)
    } else {
        (first_of_month.year(), first_of_month.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).expect("valid first-of-month")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn test_month_key_format() {
        assert_eq!(month_key(d(2025, 3, 17)), "2025-03");
        assert_eq!(parse_month_key("2025-03"), Some(d(2025, 3, 1)));
        assert_eq!(parse_month_key("2025-3x"), None);
    }

    #[test]
    fn test_months_in_range_spans_year_boundary() {
        let months = months_in_range(d(2025, 11, 20), d(2026, 2, 3));
        assert_eq!(months, vec![d(2025, 11, 1), d(2025, 12, 1), d(2026, 1, 1), d(2026, 2, 1)]);
    }

    #[test]
    fn test_months_in_range_single_month() {
        assert_eq!(months_in_range(d(2025, 5, 2), d(2025, 5, 30)), vec![d(2025, 5, 1)]);
    }

    #[test]
    fn test_months_in_range_inverted_is_empty() {
        assert!(months_in_range(d(2025, 6, 1), d(2025, 5, 1)).is_empty());
    }
}
