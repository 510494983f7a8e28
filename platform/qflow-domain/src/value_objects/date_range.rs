use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Inclusive calendar window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, String> {
        if start > end {
            return Err(format!("start {start} is after end {end}"));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn covers(&self, other: &DateRange) -> bool {
        self.contains(other.start) && self.contains(other.end)
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl std::fmt::Display for DateRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::DateRange;
    use chrono::NaiveDate;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("valid date")
    }

    #[test]
    fn rejects_reversed_bounds() {
        assert!(DateRange::new(d(2015, 1, 1), d(2014, 12, 31)).is_err());
        assert!(DateRange::new(d(2015, 1, 1), d(2015, 1, 1)).is_ok());
    }

    #[test]
    fn overlap_and_cover() {
        let train = DateRange::new(d(2008, 1, 1), d(2014, 12, 31)).expect("train");
        let valid = DateRange::new(d(2015, 1, 1), d(2016, 12, 31)).expect("valid");
        let all = DateRange::new(d(2008, 1, 1), d(2020, 8, 1)).expect("all");
        assert!(!train.overlaps(&valid));
        assert!(all.covers(&train) && all.covers(&valid));
        assert!(!train.covers(&all));
        assert_eq!(
            DateRange::new(d(2020, 1, 1), d(2020, 1, 31))
                .expect("jan")
                .days(),
            31
        );
    }
}
