//! Aggregate statistics over journal records

use chrono::NaiveDate;
use serde::Serialize;

use super::{EntryType, Record};

/// How many of the newest entries feed the recent averages
const RECENT_WINDOW: usize = 10;

/// Averages over recent entries, rounded to one decimal
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RecentAverages {
    pub mood: Option<f64>,
    pub energy: Option<f64>,
    pub pain: Option<f64>,
}

/// Totals by check-in type plus recent averages
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EntrySummary {
    pub total_entries: usize,
    pub morning_entries: usize,
    pub evening_entries: usize,
    pub recent_averages: RecentAverages,
}

impl EntrySummary {
    /// Summarize records; `records` must be ordered newest first.
    #[must_use]
    pub fn from_records(records: &[Record]) -> Self {
        let morning_entries = records
            .iter()
            .filter(|record| record.entry_type == EntryType::Morning)
            .count();
        let recent = &records[..records.len().min(RECENT_WINDOW)];

        Self {
            total_entries: records.len(),
            morning_entries,
            evening_entries: records.len() - morning_entries,
            recent_averages: RecentAverages {
                mood: average(recent.iter().map(|record| record.mood)),
                energy: average(recent.iter().map(|record| record.energy)),
                pain: average(recent.iter().map(|record| record.pain)),
            },
        }
    }
}

/// Metric series over a window of days, one point per entry, oldest first
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrendSeries {
    pub period_days: u32,
    pub dates: Vec<NaiveDate>,
    pub mood: Vec<Option<u8>>,
    pub energy: Vec<Option<u8>>,
    pub pain: Vec<Option<u8>>,
    pub anxiety: Vec<Option<u8>>,
    pub fatigue: Vec<Option<u8>>,
}

impl TrendSeries {
    /// Build the series from records in any order.
    #[must_use]
    pub fn from_records(period_days: u32, records: &[Record]) -> Self {
        let mut ordered: Vec<&Record> = records.iter().collect();
        ordered.sort_by_key(|record| (record.date, record.timestamp));

        let mut series = Self {
            period_days,
            ..Self::default()
        };
        for record in ordered {
            series.dates.push(record.date);
            series.mood.push(record.mood);
            series.energy.push(record.energy);
            series.pain.push(record.pain);
            series.anxiety.push(record.anxiety);
            series.fatigue.push(record.fatigue);
        }
        series
    }

    pub fn total_entries(&self) -> usize {
        self.dates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dates.is_empty()
    }
}

/// Mean of the present values, rounded to one decimal
pub fn average(values: impl Iterator<Item = Option<u8>>) -> Option<f64> {
    let (sum, count) = values
        .flatten()
        .fold((0_u32, 0_u32), |(sum, count), value| {
            (sum + u32::from(value), count + 1)
        });
    if count == 0 {
        return None;
    }
    let mean = f64::from(sum) / f64::from(count);
    Some((mean * 10.0).round() / 10.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(entry_type: EntryType, mood: Option<u8>) -> Record {
        Record {
            mood,
            ..Record::new(entry_type, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap())
        }
    }

    #[test]
    fn summary_counts_entry_types() {
        let records = vec![
            record(EntryType::Morning, Some(6)),
            record(EntryType::Evening, Some(7)),
            record(EntryType::Evening, None),
        ];
        let summary = EntrySummary::from_records(&records);
        assert_eq!(summary.total_entries, 3);
        assert_eq!(summary.morning_entries, 1);
        assert_eq!(summary.evening_entries, 2);
        assert_eq!(summary.recent_averages.mood, Some(6.5));
        assert_eq!(summary.recent_averages.pain, None);
    }

    #[test]
    fn averages_only_use_recent_window() {
        let mut records: Vec<Record> = (0..RECENT_WINDOW)
            .map(|_| record(EntryType::Morning, Some(2)))
            .collect();
        records.push(record(EntryType::Morning, Some(10)));
        let summary = EntrySummary::from_records(&records);
        assert_eq!(summary.recent_averages.mood, Some(2.0));
    }

    #[test]
    fn trend_series_orders_by_day_then_time() {
        let evening = Record {
            mood: Some(7),
            pain: Some(2),
            timestamp: 2_000,
            ..Record::new(EntryType::Evening, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        };
        let morning = Record {
            mood: Some(5),
            timestamp: 1_000,
            ..Record::new(EntryType::Morning, NaiveDate::from_ymd_opt(2024, 1, 2).unwrap())
        };
        let earlier_day = Record {
            fatigue: Some(9),
            timestamp: 3_000,
            ..record(EntryType::Evening, None)
        };

        let series = TrendSeries::from_records(30, &[evening, earlier_day, morning]);
        assert_eq!(series.period_days, 30);
        assert_eq!(series.total_entries(), 3);
        assert_eq!(series.dates[0], NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(series.mood, vec![None, Some(5), Some(7)]);
        assert_eq!(series.pain, vec![None, None, Some(2)]);
        assert_eq!(series.fatigue, vec![Some(9), None, None]);
    }

    #[test]
    fn average_rounds_to_one_decimal() {
        let mean = average([Some(1), Some(2), Some(2)].into_iter());
        assert_eq!(mean, Some(1.7));
    }
}
