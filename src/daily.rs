//! Per-day aggregation of minute rows
//!
//! Each minute is either awake (no sleep state) or asleep, and feeds only
//! the counters of its side: steps, awake heart rate, METs and intensity
//! for awake minutes; asleep heart rate, sleep stages and bedtime candidates
//! for asleep minutes. Overall heart rate is the one counter both sides feed.
//!
//! Bedtime needs the following day's data, so it is resolved in a second
//! pass over the finished aggregates.

use std::collections::BTreeMap;

use chrono::{NaiveTime, Timelike};

use crate::types::{
    AsleepSummary, AwakeSummary, Bedtime, DayAggregate, DayWindow, IndexedMinute, MinuteRow,
    RunningMean,
};

/// Days for which bedtime candidates are tracked
pub const BEDTIME_WINDOW: DayWindow = DayWindow::open(-1, 22);

/// Raw METs are stored at ten times their value
const METS_SCALE: f64 = 10.0;

/// Each half-minute sleep-stage observation is worth half a minute
const HALF_MINUTE: f64 = 0.5;

const NOON_MINUTES: i64 = 12 * 60;

/// Day aggregates of one participant time range, keyed by study day
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyAggregates {
    days: BTreeMap<i64, DayAggregate>,
}

impl DailyAggregates {
    pub fn get(&self, day: i64) -> Option<&DayAggregate> {
        self.days.get(&day)
    }

    /// Aggregates in ascending day order
    pub fn iter(&self) -> impl Iterator<Item = &DayAggregate> {
        self.days.values()
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

impl FromIterator<DayAggregate> for DailyAggregates {
    fn from_iter<I: IntoIterator<Item = DayAggregate>>(iter: I) -> Self {
        Self {
            days: iter.into_iter().map(|d| (d.day, d)).collect(),
        }
    }
}

/// Folds indexed minute rows into day aggregates
pub struct DailyAggregator;

impl DailyAggregator {
    /// Aggregate minutes (in time order) into one aggregate per study day
    pub fn aggregate(minutes: &[IndexedMinute]) -> DailyAggregates {
        let mut accumulators: BTreeMap<i64, DayAccumulator> = BTreeMap::new();

        for minute in minutes {
            accumulators
                .entry(minute.day)
                .or_insert_with(|| DayAccumulator::new(minute.day, minute.weekday))
                .add_minute(&minute.row);
        }

        let finished: BTreeMap<i64, DayAggregate> = accumulators
            .into_iter()
            .map(|(day, acc)| (day, acc.finish()))
            .collect();

        DailyAggregates {
            days: resolve_bedtimes(finished),
        }
    }
}

/// Accumulator for folding one day's minutes
struct DayAccumulator {
    day: i64,
    weekday: u8,
    awake: Option<AwakeSummary>,
    asleep: Option<AsleepSummary>,
    hr_overall: RunningMean,
    laydown: Option<NaiveTime>,
    earliest_sleep: Option<NaiveTime>,
}

impl DayAccumulator {
    fn new(day: i64, weekday: u8) -> Self {
        Self {
            day,
            weekday,
            awake: None,
            asleep: None,
            hr_overall: RunningMean::default(),
            laydown: None,
            earliest_sleep: None,
        }
    }

    fn add_minute(&mut self, row: &MinuteRow) {
        if row.is_asleep() {
            self.add_asleep(row);
        } else {
            self.add_awake(row);
        }

        if row.hr_value > 0.0 {
            self.hr_overall.push(row.hr_value);
        }
    }

    fn add_awake(&mut self, row: &MinuteRow) {
        let awake = self.awake.get_or_insert_with(AwakeSummary::default);

        if let Some(steps) = row.steps.filter(|s| *s > 0) {
            awake.steps += u64::from(steps);
        }
        if row.hr_value > 0.0 {
            awake.hr.push(row.hr_value);
        }
        if let Some(mets) = row.mets.filter(|m| *m > 0.0) {
            awake.mets.push(mets / METS_SCALE);
        }
        if let Some(level) = row.intensity {
            awake.intensity.add(level, 1);
            awake.intensity_n += 1;
        }
    }

    fn add_asleep(&mut self, row: &MinuteRow) {
        let asleep = self.asleep.get_or_insert_with(AsleepSummary::default);

        if row.hr_value > 0.0 {
            asleep.hr.push(row.hr_value);
        }
        for stage in [row.sleep_stage, row.sleep_stage_30].into_iter().flatten() {
            asleep.stages.add(stage, HALF_MINUTE);
        }

        if row.hr_value > 0.0 && BEDTIME_WINDOW.contains(self.day) {
            self.track_bedtime(row.minute.time());
        }
    }

    /// Laydown is the asleep minute closest after noon; earliest sleep is the
    /// asleep minute closest after midnight. Both compare time of day only.
    fn track_bedtime(&mut self, time: NaiveTime) {
        if minutes_of_day(time) - NOON_MINUTES > 0 {
            self.laydown = Some(self.laydown.map_or(time, |t| t.min(time)));
        }
        self.earliest_sleep = Some(self.earliest_sleep.map_or(time, |t| t.min(time)));
    }

    fn finish(self) -> DayAggregate {
        DayAggregate {
            day: self.day,
            weekday: self.weekday,
            awake: self.awake,
            asleep: self.asleep,
            hr_overall: self.hr_overall,
            bedtime: self.earliest_sleep.map(|earliest_sleep| Bedtime {
                laydown: self.laydown,
                earliest_sleep,
                resolved: None,
            }),
        }
    }
}

/// A day without an afternoon laydown borrows the next day's earliest sleep
/// (falling asleep after midnight). Without a next day it stays unresolved.
fn resolve_bedtimes(days: BTreeMap<i64, DayAggregate>) -> BTreeMap<i64, DayAggregate> {
    let earliest_by_day: BTreeMap<i64, NaiveTime> = days
        .iter()
        .filter_map(|(day, agg)| agg.bedtime.map(|b| (*day, b.earliest_sleep)))
        .collect();

    days.into_iter()
        .map(|(day, mut agg)| {
            if let Some(bedtime) = agg.bedtime.as_mut() {
                bedtime.resolved = bedtime
                    .laydown
                    .or_else(|| earliest_by_day.get(&(day + 1)).copied());
            }
            (day, agg)
        })
        .collect()
}

fn minutes_of_day(time: NaiveTime) -> i64 {
    i64::from(time.hour()) * 60 + i64::from(time.minute())
}
