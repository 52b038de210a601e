//! Week, workday and weekend rollups of the daily aggregates
//!
//! Weeks are numbered from day 1: days 1-7 are week 0, 8-14 week 1 and
//! 15-21 week 2. Day 0 never enters a week. Weekly values are derived from
//! the per-day values, never from minute data.

use crate::config::ScoringConfig;
use crate::daily::DailyAggregates;
use crate::types::{DayAggregate, DayWindow, IntensityMinutes, RunningMean, SleepStageMinutes};

/// Number of study weeks that are reported
pub const WEEK_COUNT: usize = 3;

/// Days that feed weekly steps, METs, intensity and wear rollups
pub const WEEKLY_WINDOW: DayWindow = DayWindow::open(0, 22);

/// Days that feed the workday/weekend sleep split (day 0 included)
pub const SLEEP_SPLIT_WINDOW: DayWindow = DayWindow::open(-1, 22);

/// Week index of a study day; day 0 falls in week -1
pub fn week_of(day: i64) -> i64 {
    (day - 1).div_euclid(7)
}

/// Slot of a day among the reported weeks, if it has one
fn week_slot(day: i64) -> Option<usize> {
    usize::try_from(week_of(day))
        .ok()
        .filter(|week| *week < WEEK_COUNT)
}

/// Activity totals of one week, from days with awake minutes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ActivityWeek {
    pub steps: u64,
    pub days: u32,
    pub steps_workday: Option<u64>,
    pub steps_weekend: Option<u64>,
    /// Mean of the daily METs means
    pub mets: RunningMean,
    pub intensity: IntensityMinutes,
}

impl ActivityWeek {
    pub fn steps_average(&self) -> f64 {
        self.steps as f64 / f64::from(self.days.max(1))
    }
}

/// Wear-gated days and their awake minutes
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WearBucket {
    pub days: u32,
    pub minutes: u64,
}

impl WearBucket {
    fn add(&mut self, minutes: u32) {
        self.days += 1;
        self.minutes += u64::from(minutes);
    }

    /// Mean wear minutes per qualifying day, 0 without any.
    ///
    /// Reported as `wearminutesavg_weekN`. Earlier exports of that field held
    /// a mean of daily heart-rate sums instead.
    pub fn average(&self) -> f64 {
        self.minutes as f64 / f64::from(self.days.max(1))
    }
}

/// Sleep-gated days and their stage minutes
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SleepBucket {
    pub stages: SleepStageMinutes,
    pub days: u32,
}

impl SleepBucket {
    fn add(&mut self, stages: &SleepStageMinutes) {
        self.stages.merge(stages);
        self.days += 1;
    }

    /// Per-day averages of each stage, 0 without any qualifying day
    pub fn averages(&self) -> SleepStageMinutes {
        let divisor = f64::from(self.days.max(1));
        SleepStageMinutes {
            light: self.stages.light / divisor,
            deep: self.stages.deep / divisor,
            rem: self.stages.rem / divisor,
            wake: self.stages.wake / divisor,
        }
    }

    pub fn combined_average(&self) -> f64 {
        self.stages.total() / f64::from(self.days.max(1))
    }
}

/// Rollups of one reported week
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct WeekAggregate {
    /// 0-based week index
    pub week: usize,
    /// Present when the week has a day with awake minutes
    pub activity: Option<ActivityWeek>,
    pub wear: WearBucket,
    /// Present when the week has a day passing the sleep gate
    pub sleep: Option<SleepBucket>,
}

/// Weekly and workday/weekend views of one participant time range
#[derive(Debug, Clone, PartialEq)]
pub struct WeeklySummary {
    /// One entry per reported week, in order
    pub weeks: Vec<WeekAggregate>,
    pub mets_workday: RunningMean,
    pub mets_weekend: RunningMean,
    pub wear_workday: WearBucket,
    pub wear_weekend: WearBucket,
    pub sleep_workday: SleepBucket,
    pub sleep_weekend: SleepBucket,
}

impl Default for WeeklySummary {
    fn default() -> Self {
        Self {
            weeks: (0..WEEK_COUNT)
                .map(|week| WeekAggregate {
                    week,
                    ..Default::default()
                })
                .collect(),
            mets_workday: RunningMean::default(),
            mets_weekend: RunningMean::default(),
            wear_workday: WearBucket::default(),
            wear_weekend: WearBucket::default(),
            sleep_workday: SleepBucket::default(),
            sleep_weekend: SleepBucket::default(),
        }
    }
}

/// Derives weekly summaries, applying the wear-time and sleep-time gates
#[derive(Debug, Clone, Copy)]
pub struct WeeklyRollup {
    wear_minutes_min: u32,
    wear_minutes_max: u32,
    sleep_minutes_min: f64,
}

impl Default for WeeklyRollup {
    fn default() -> Self {
        Self::from_config(&ScoringConfig::default())
    }
}

impl WeeklyRollup {
    pub fn new(wear_minutes_min: u32, wear_minutes_max: u32, sleep_minutes_min: f64) -> Self {
        Self {
            wear_minutes_min,
            wear_minutes_max,
            sleep_minutes_min,
        }
    }

    pub fn from_config(config: &ScoringConfig) -> Self {
        Self::new(
            config.wear_minutes_min,
            config.wear_minutes_max,
            config.sleep_minutes_min,
        )
    }

    pub fn rollup(&self, daily: &DailyAggregates) -> WeeklySummary {
        let mut summary = WeeklySummary::default();

        for day in daily.iter() {
            if WEEKLY_WINDOW.contains(day.day) {
                self.add_activity(&mut summary, day);
                self.add_wear(&mut summary, day);
            }
            if SLEEP_SPLIT_WINDOW.contains(day.day) {
                self.add_sleep(&mut summary, day);
            }
        }

        summary
    }

    fn add_activity(&self, summary: &mut WeeklySummary, day: &DayAggregate) {
        let (Some(awake), Some(slot)) = (day.awake, week_slot(day.day)) else {
            return;
        };
        let daily_mets = awake.mets.mean();

        let activity = summary.weeks[slot]
            .activity
            .get_or_insert_with(ActivityWeek::default);
        activity.steps += awake.steps;
        activity.days += 1;
        activity.mets.push(daily_mets);
        activity.intensity.merge(&awake.intensity);

        if day.is_weekend() {
            *activity.steps_weekend.get_or_insert(0) += awake.steps;
            summary.mets_weekend.push(daily_mets);
        } else {
            *activity.steps_workday.get_or_insert(0) += awake.steps;
            summary.mets_workday.push(daily_mets);
        }
    }

    fn add_wear(&self, summary: &mut WeeklySummary, day: &DayAggregate) {
        let Some(awake) = day.awake else {
            return;
        };
        let minutes = awake.wear_minutes();
        if !self.is_valid_wear_day(minutes) {
            return;
        }

        if day.is_weekend() {
            summary.wear_weekend.add(minutes);
        } else {
            summary.wear_workday.add(minutes);
        }
        if let Some(slot) = week_slot(day.day) {
            summary.weeks[slot].wear.add(minutes);
        }
    }

    fn add_sleep(&self, summary: &mut WeeklySummary, day: &DayAggregate) {
        let Some(asleep) = day.asleep else {
            return;
        };
        if asleep.stages.total() < self.sleep_minutes_min {
            return;
        }

        if day.is_weekend() {
            summary.sleep_weekend.add(&asleep.stages);
        } else {
            summary.sleep_workday.add(&asleep.stages);
        }
        if let Some(slot) = week_slot(day.day) {
            summary.weeks[slot]
                .sleep
                .get_or_insert_with(SleepBucket::default)
                .add(&asleep.stages);
        }
    }

    fn is_valid_wear_day(&self, minutes: u32) -> bool {
        minutes >= self.wear_minutes_min && minutes <= self.wear_minutes_max
    }
}
