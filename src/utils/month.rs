use chrono::{Datelike, NaiveDate};

/// Parses `YYYY-MM` into the first day of that month.
pub fn parse_month(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(&format!("{}-01", raw.trim()), "%Y-%m-%d").ok()
}

pub fn first_of_month(date: NaiveDate) -> NaiveDate {
    date.with_day(1).unwrap_or(date)
}

/// Inclusive first and last day of the month containing `date`.
pub fn month_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = first_of_month(date);
    let last = next_month(first).pred_opt().unwrap_or(first);
    (first, last)
}

pub fn next_month(first: NaiveDate) -> NaiveDate {
    let (year, month) = if first.month() == 12 {
        (first.year() + 1, 1)
    } else {
        (first.year(), first.month() + 1)
    };
    NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(first)
}

/// First day of every month touched by `start..=end`.
pub fn months_between(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    let mut months = Vec::new();
    let mut cursor = first_of_month(start);
    while cursor <= end {
        months.push(cursor);
        let next = next_month(cursor);
        if next == cursor {
            break;
        }
        cursor = next;
    }
    months
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn parses_year_month() {
        assert_eq!(parse_month("2024-06"), Some(d(2024, 6, 1)));
        assert_eq!(parse_month("2024-13"), None);
        assert_eq!(parse_month("June"), None);
    }

    #[test]
    fn bounds_handle_leap_february_and_december() {
        assert_eq!(month_bounds(d(2024, 2, 14)), (d(2024, 2, 1), d(2024, 2, 29)));
        assert_eq!(month_bounds(d(2023, 12, 31)), (d(2023, 12, 1), d(2023, 12, 31)));
    }

    #[test]
    fn months_between_spans_year_end() {
        assert_eq!(
            months_between(d(2023, 12, 28), d(2024, 1, 3)),
            vec![d(2023, 12, 1), d(2024, 1, 1)]
        );
        assert_eq!(months_between(d(2024, 6, 1), d(2024, 6, 3)), vec![d(2024, 6, 1)]);
    }
}
