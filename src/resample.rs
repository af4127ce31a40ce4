//! Session resampling
//!
//! Turns a time-ordered tick series into fixed-width OHLC bars. Intervals are
//! right-closed and right-labeled: the bar stamped `T` covers `(T - width, T]`,
//! with buckets anchored at each local midnight. Intervals without ticks
//! produce no bar. Only bars whose label falls in the session window are kept.

use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use rayon::prelude::*;
use std::collections::HashMap;
use std::iter::Peekable;
use thiserror::Error;
use tracing::debug;

use crate::config::SessionConfig;
use crate::types::fractional_hour;
use crate::{PriceBar, Tick};

/// Why a resampled series came out empty
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResampleError {
    #[error("no ticks to resample")]
    NoTicks,

    #[error("all {bars} {width}m bars fall outside the session window")]
    OutsideSession { width: u32, bars: usize },
}

/// Half-open session window `[start, end)` in fractional hours
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionWindow {
    pub start: f64,
    pub end: f64,
}

impl SessionWindow {
    pub fn new(start: f64, end: f64) -> Self {
        Self { start, end }
    }

    pub fn from_config(config: &SessionConfig) -> Self {
        Self::new(config.start, config.end)
    }

    pub fn contains(&self, time: &NaiveDateTime) -> bool {
        let h = fractional_hour(time);
        self.start <= h && h < self.end
    }
}

/// Minutes in a day; every bar width must divide it
pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// Right edge of the `width`-minute interval containing `time`.
///
/// Buckets restart at every local midnight. For widths that divide
/// [`MINUTES_PER_DAY`] this is the same grid as anchoring once at the first
/// day's midnight; other widths are rejected by `Config::validate`.
pub fn bucket_label(time: &NaiveDateTime, width_minutes: u32) -> NaiveDateTime {
    let midnight = time.date().and_time(NaiveTime::MIN);
    let width = i64::from(width_minutes) * 60;
    let secs = i64::from(time.num_seconds_from_midnight());

    let mut buckets = secs / width;
    if secs % width != 0 || time.nanosecond() > 0 {
        buckets += 1;
    }
    midnight + Duration::seconds(buckets * width)
}

/// Lazy resampling adapter over time-ordered ticks
pub struct Resample<'a, I>
where
    I: Iterator<Item = &'a Tick>,
{
    ticks: Peekable<I>,
    width: u32,
}

impl<'a, I> Iterator for Resample<'a, I>
where
    I: Iterator<Item = &'a Tick>,
{
    type Item = PriceBar;

    fn next(&mut self) -> Option<PriceBar> {
        let first = self.ticks.next()?;
        let label = bucket_label(&first.time, self.width);
        let mut bar = PriceBar::new_unchecked(
            label,
            first.open,
            tick_high(first),
            tick_low(first),
            first.close,
        );

        let width = self.width;
        while let Some(tick) = self
            .ticks
            .next_if(|t| bucket_label(&t.time, width) == label)
        {
            bar.high = bar.high.max(tick_high(tick));
            bar.low = bar.low.min(tick_low(tick));
            bar.close = tick.close;
        }

        Some(bar)
    }
}

fn tick_high(t: &Tick) -> f64 {
    t.high.max(t.open).max(t.close)
}

fn tick_low(t: &Tick) -> f64 {
    t.low.min(t.open).min(t.close)
}

/// Resample time-ordered ticks into `width_minutes` bars, without session filtering
pub fn resample<'a, I>(ticks: I, width_minutes: u32) -> Resample<'a, I::IntoIter>
where
    I: IntoIterator<Item = &'a Tick>,
{
    Resample {
        ticks: ticks.into_iter().peekable(),
        width: width_minutes.max(1),
    }
}

/// Resample and keep only bars labeled inside the session window
pub fn session_bars(
    ticks: &[Tick],
    width_minutes: u32,
    window: &SessionWindow,
) -> Result<Vec<PriceBar>, ResampleError> {
    if ticks.is_empty() {
        return Err(ResampleError::NoTicks);
    }

    let mut total = 0usize;
    let bars: Vec<PriceBar> = resample(ticks, width_minutes)
        .inspect(|_| total += 1)
        .filter(|bar| window.contains(&bar.time))
        .collect();

    if bars.is_empty() {
        return Err(ResampleError::OutsideSession {
            width: width_minutes,
            bars: total,
        });
    }

    debug!(
        "Resampled {} ticks into {} {}m session bars ({} total)",
        ticks.len(),
        bars.len(),
        width_minutes,
        total
    );
    Ok(bars)
}

/// Session bars per width, built once and shared read-only by every sweep task
#[derive(Debug, Default, Clone)]
pub struct BarCache {
    bars: HashMap<u32, Vec<PriceBar>>,
}

impl BarCache {
    /// Build bars for every distinct width.
    ///
    /// Fails if any width ends up with no session bars, so a sweep never runs
    /// over empty series.
    pub fn build(ticks: &[Tick], widths: &[u32], window: &SessionWindow) -> Result<Self, ResampleError> {
        let mut unique: Vec<u32> = widths.to_vec();
        unique.sort_unstable();
        unique.dedup();

        let bars = unique
            .par_iter()
            .map(|&width| session_bars(ticks, width, window).map(|series| (width, series)))
            .collect::<Result<HashMap<_, _>, _>>()?;

        Ok(Self { bars })
    }

    pub fn insert(&mut self, width: u32, bars: Vec<PriceBar>) {
        self.bars.insert(width, bars);
    }

    pub fn get(&self, width: u32) -> &[PriceBar] {
        self.bars.get(&width).map(|v| v.as_slice()).unwrap_or(&[])
    }

    pub fn widths(&self) -> Vec<u32> {
        let mut widths: Vec<u32> = self.bars.keys().copied().collect();
        widths.sort_unstable();
        widths
    }
}
