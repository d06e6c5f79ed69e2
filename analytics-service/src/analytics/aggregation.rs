use serde::Serialize;
use time::{Date, OffsetDateTime, Weekday};
use water_client::FlowSeries;

use super::stats::{group_values, mean, percentile, sample_std};
use super::table::{Table, TableRow};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DailyAggregate {
    pub date: Date,
    pub total_consumption: f64,
    pub mean: f64,
    pub std: Option<f64>,
    pub p95: f64,
    pub count: usize,
}

impl TableRow for DailyAggregate {
    const COLUMNS: &'static [&'static str] =
        &["date", "total_consumption", "mean", "std", "p95", "count"];
}

/// Daily consumption totals and interval statistics, one row per date seen.
pub fn daily_totals(flow: &FlowSeries) -> Table<DailyAggregate> {
    let groups = group_values(flow.consumption().map(|(ts, c)| (ts.date(), c)));

    let rows: Vec<DailyAggregate> = groups
        .into_iter()
        .filter_map(|(date, values)| {
            Some(DailyAggregate {
                date,
                total_consumption: values.iter().sum(),
                mean: mean(&values)?,
                std: sample_std(&values),
                p95: percentile(&values, 95.0)?,
                count: values.len(),
            })
        })
        .collect();

    tracing::debug!(rows = rows.len(), "daily totals computed");
    Table::new(rows)
}

/// Fixed eight-hour operating shifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum Shift {
    /// 06:00 to 14:00
    A,
    /// 14:00 to 22:00
    B,
    /// 22:00 to 06:00 the next day
    C,
}

impl Shift {
    pub const ALL: [Shift; 3] = [Shift::A, Shift::B, Shift::C];

    pub fn start_hour(self) -> u8 {
        match self {
            Shift::A => 6,
            Shift::B => 14,
            Shift::C => 22,
        }
    }

    /// The shift covering a local hour of day.
    pub fn for_hour(hour: u8) -> Shift {
        match hour {
            6..=13 => Shift::A,
            14..=21 => Shift::B,
            _ => Shift::C,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Shift::A => "Shift A",
            Shift::B => "Shift B",
            Shift::C => "Shift C",
        }
    }
}

/// Shift assignment of a reading and the date on which that shift started.
///
/// The overnight shift is attributed to the evening it began, so 02:00 on
/// the 5th belongs to shift C of the 4th.
pub fn shift_of(ts: OffsetDateTime) -> (Date, Shift) {
    let shift = Shift::for_hour(ts.hour());
    let date = ts.date();
    if shift == Shift::C && ts.hour() < Shift::C.start_hour() {
        (date.previous_day().unwrap_or(date), shift)
    } else {
        (date, shift)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShiftAggregate {
    pub date: Date,
    pub shift: Shift,
    pub total_consumption: f64,
    pub mean: f64,
    pub count: usize,
}

impl TableRow for ShiftAggregate {
    const COLUMNS: &'static [&'static str] =
        &["date", "shift", "total_consumption", "mean", "count"];
}

pub fn shift_aggregates(flow: &FlowSeries) -> Table<ShiftAggregate> {
    let groups = group_values(flow.consumption().map(|(ts, c)| (shift_of(ts), c)));

    let rows: Vec<ShiftAggregate> = groups
        .into_iter()
        .filter_map(|((date, shift), values)| {
            Some(ShiftAggregate {
                date,
                shift,
                total_consumption: values.iter().sum(),
                mean: mean(&values)?,
                count: values.len(),
            })
        })
        .collect();

    tracing::debug!(rows = rows.len(), "shift aggregates computed");
    Table::new(rows)
}

/// Mean interval consumption by day of week (rows, Monday first) and hour of
/// day (columns). Cells without any reading are `None`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HourDowHeatmap {
    cells: [[Option<f64>; 24]; 7],
}

impl HourDowHeatmap {
    pub const WEEKDAYS: [Weekday; 7] = [
        Weekday::Monday,
        Weekday::Tuesday,
        Weekday::Wednesday,
        Weekday::Thursday,
        Weekday::Friday,
        Weekday::Saturday,
        Weekday::Sunday,
    ];

    pub fn get(&self, weekday: Weekday, hour: u8) -> Option<f64> {
        self.cells
            .get(weekday.number_days_from_monday() as usize)
            .and_then(|row| row.get(hour as usize))
            .copied()
            .flatten()
    }

    pub fn rows(&self) -> impl Iterator<Item = (Weekday, &[Option<f64>; 24])> + '_ {
        Self::WEEKDAYS.into_iter().zip(self.cells.iter())
    }

    pub fn populated_cells(&self) -> usize {
        self.cells.iter().flatten().filter(|c| c.is_some()).count()
    }
}

pub fn hour_dow_heatmap(flow: &FlowSeries) -> HourDowHeatmap {
    let groups = group_values(flow.consumption().map(|(ts, c)| {
        (
            (ts.weekday().number_days_from_monday() as usize, ts.hour() as usize),
            c,
        )
    }));

    let mut cells = [[None; 24]; 7];
    for ((dow, hour), values) in groups {
        cells[dow][hour] = mean(&values);
    }

    HourDowHeatmap { cells }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::{date, datetime};
    use time::Duration;

    fn series(start: OffsetDateTime, totals: &[f64], step_minutes: i64) -> FlowSeries {
        FlowSeries::from_totalizer(
            totals
                .iter()
                .enumerate()
                .map(|(i, t)| (start + Duration::minutes(step_minutes * i as i64), *t)),
        )
        .unwrap()
    }

    #[test]
    fn daily_totals_split_at_local_midnight() {
        let flow = series(
            datetime!(2024-03-01 23:50:00 +05:30),
            &[100.0, 102.0, 105.0, 111.0],
            5,
        );
        let daily = daily_totals(&flow);

        assert_eq!(daily.len(), 2);
        let first = &daily.rows()[0];
        assert_eq!(first.date, date!(2024 - 03 - 01));
        assert_eq!(first.total_consumption, 2.0);
        assert_eq!(first.count, 1);
        assert_eq!(first.std, None);

        let second = &daily.rows()[1];
        assert_eq!(second.date, date!(2024 - 03 - 02));
        assert_eq!(second.total_consumption, 9.0);
        assert_eq!(second.mean, 4.5);
        assert_eq!(second.count, 2);
        assert!(second.std.is_some());
    }

    #[test]
    fn day_with_only_the_first_reading_is_absent() {
        let flow = series(datetime!(2024-03-01 23:55:00 +05:30), &[1.0, 2.0], 5);
        let daily = daily_totals(&flow);
        assert_eq!(daily.len(), 1);
        assert_eq!(daily.rows()[0].date, date!(2024 - 03 - 02));
    }

    #[test]
    fn empty_flow_yields_empty_tables() {
        let flow = FlowSeries::default();
        assert!(daily_totals(&flow).is_empty());
        assert!(shift_aggregates(&flow).is_empty());
        assert_eq!(hour_dow_heatmap(&flow).populated_cells(), 0);
    }

    #[test]
    fn shift_boundaries_belong_to_the_starting_shift() {
        assert_eq!(shift_of(datetime!(2024-03-05 06:00:00 +05:30)).1, Shift::A);
        assert_eq!(shift_of(datetime!(2024-03-05 05:59:59 +05:30)).1, Shift::C);
        assert_eq!(shift_of(datetime!(2024-03-05 14:00:00 +05:30)).1, Shift::B);
        assert_eq!(shift_of(datetime!(2024-03-05 13:59:59 +05:30)).1, Shift::A);
        assert_eq!(shift_of(datetime!(2024-03-05 22:00:00 +05:30)).1, Shift::C);
        assert_eq!(shift_of(datetime!(2024-03-05 21:59:59 +05:30)).1, Shift::B);
    }

    #[test]
    fn overnight_shift_is_attributed_to_its_start_date() {
        assert_eq!(
            shift_of(datetime!(2024-03-05 02:00:00 +05:30)),
            (date!(2024 - 03 - 04), Shift::C)
        );
        assert_eq!(
            shift_of(datetime!(2024-03-05 23:00:00 +05:30)),
            (date!(2024 - 03 - 05), Shift::C)
        );
        assert_eq!(
            shift_of(datetime!(2024-03-01 00:30:00 +05:30)),
            (date!(2024 - 02 - 29), Shift::C)
        );
    }

    #[test]
    fn shifts_partition_the_day() {
        let mut hours_per_shift = [0u32; 3];
        for hour in 0..24u8 {
            let shift = Shift::for_hour(hour);
            let idx = Shift::ALL.iter().position(|s| *s == shift).unwrap();
            hours_per_shift[idx] += 1;
        }
        assert_eq!(hours_per_shift, [8, 8, 8]);
    }

    #[test]
    fn shift_aggregates_group_by_shift_date() {
        // 21:55 .. 22:10 on the 4th, then 01:00 on the 5th.
        let start = datetime!(2024-03-04 21:55:00 +05:30);
        let mut samples: Vec<(OffsetDateTime, f64)> = (0..4)
            .map(|i| (start + Duration::minutes(5 * i), 10.0 * i as f64))
            .collect();
        samples.push((datetime!(2024-03-05 01:00:00 +05:30), 50.0));
        let flow = FlowSeries::from_totalizer(samples).unwrap();

        let shifts = shift_aggregates(&flow);
        let rows = shifts.rows();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].date, date!(2024 - 03 - 04));
        assert_eq!(rows[0].shift, Shift::C);
        assert_eq!(rows[0].count, 4);
        assert_eq!(rows[0].total_consumption, 50.0);
    }

    #[test]
    fn heatmap_reports_missing_cells_as_none() {
        // 2024-03-04 is a Monday.
        let flow = series(datetime!(2024-03-04 10:00:00 +05:30), &[0.0, 4.0, 10.0], 5);
        let heat = hour_dow_heatmap(&flow);

        assert_eq!(heat.get(Weekday::Monday, 10), Some(5.0));
        assert_eq!(heat.get(Weekday::Monday, 11), None);
        assert_eq!(heat.get(Weekday::Tuesday, 10), None);
        assert_eq!(heat.populated_cells(), 1);
        assert_eq!(heat.rows().count(), 7);
    }

    #[test]
    fn zero_consumption_cell_is_distinct_from_missing() {
        let flow = series(datetime!(2024-03-04 10:00:00 +05:30), &[5.0, 5.0], 5);
        let heat = hour_dow_heatmap(&flow);
        assert_eq!(heat.get(Weekday::Monday, 10), Some(0.0));
    }
}
