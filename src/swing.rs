//! Swing point detection
//!
//! A swing low at `i` is strictly lower than every value within `width` bars
//! on either side; a swing high is strictly higher. Indices too close to
//! either end of the series to have a full window are never swing points.

use serde::{Deserialize, Serialize};

use crate::Direction;

/// Bars on each side of a swing point, as used by the reference setup
pub const DEFAULT_SWING_WIDTH: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SwingKind {
    Low,
    High,
}

impl SwingKind {
    /// Swing that anchors the stop for a trade in `direction`
    pub fn for_direction(direction: Direction) -> Self {
        match direction {
            Direction::Long => SwingKind::Low,
            Direction::Short => SwingKind::High,
        }
    }
}

/// Whether `i` can be evaluated with a full window
pub fn has_window(len: usize, i: usize, width: usize) -> bool {
    i >= width && i + width < len
}

pub fn is_swing_low(lows: &[f64], i: usize, width: usize) -> bool {
    has_window(lows.len(), i, width)
        && (1..=width).all(|j| lows[i] < lows[i - j] && lows[i] < lows[i + j])
}

pub fn is_swing_high(highs: &[f64], i: usize, width: usize) -> bool {
    has_window(highs.len(), i, width)
        && (1..=width).all(|j| highs[i] > highs[i - j] && highs[i] > highs[i + j])
}

pub fn is_swing(kind: SwingKind, values: &[f64], i: usize, width: usize) -> bool {
    match kind {
        SwingKind::Low => is_swing_low(values, i, width),
        SwingKind::High => is_swing_high(values, i, width),
    }
}
