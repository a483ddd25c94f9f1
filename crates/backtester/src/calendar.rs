use chrono::{Datelike, NaiveDate, Weekday};

/// Every Monday to Friday from `start` to `end`, inclusive. Empty when `start > end`.
///
/// Exchange holidays are not modelled; a holiday step simply sees the previous close.
pub fn business_days(start: NaiveDate, end: NaiveDate) -> Vec<NaiveDate> {
    start
        .iter_days()
        .take_while(|date| *date <= end)
        .filter(|date| !matches!(date.weekday(), Weekday::Sat | Weekday::Sun))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    #[test]
    fn skips_weekends() {
        // 2024-03-01 is a Friday.
        let days = business_days(date(1), date(11));
        assert_eq!(days, vec![date(1), date(4), date(5), date(6), date(7), date(8), date(11)]);
    }

    #[test]
    fn weekend_only_and_reversed_ranges_are_empty() {
        assert!(business_days(date(2), date(3)).is_empty());
        assert!(business_days(date(11), date(1)).is_empty());
    }
}
