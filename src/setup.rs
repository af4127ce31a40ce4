//! Breakout-continuation setup detection on the structural timeframe

use crate::{Direction, PriceBar, Setup};

/// Classify a pair of consecutive structural bars.
///
/// Long: both bars bullish and the current close above the previous high.
/// Short: both bars bearish and the current close below the previous low.
pub fn detect(prev: &PriceBar, cur: &PriceBar) -> Option<Setup> {
    let (direction, level) = if prev.is_bullish() && cur.is_bullish() && cur.close > prev.high {
        (Direction::Long, prev.high)
    } else if prev.is_bearish() && cur.is_bearish() && cur.close < prev.low {
        (Direction::Short, prev.low)
    } else {
        return None;
    };

    Some(Setup {
        direction,
        level,
        time: cur.time,
        day: cur.day(),
    })
}

/// Every setup in a structural series, in time order
pub fn scan(bars: &[PriceBar]) -> impl Iterator<Item = Setup> + '_ {
    bars.windows(2).filter_map(|w| detect(&w[0], &w[1]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, m, 0)
            .unwrap()
    }

    fn bar(m: u32, o: f64, h: f64, l: f64, c: f64) -> PriceBar {
        PriceBar::new(at(m), o, h, l, c).unwrap()
    }

    #[test]
    fn test_long_setup() {
        let prev = bar(0, 10.0, 12.0, 9.0, 11.0);
        let cur = bar(15, 11.0, 13.0, 10.0, 12.5);
        let setup = detect(&prev, &cur).unwrap();
        assert_eq!(setup.direction, Direction::Long);
        assert_eq!(setup.level, 12.0);
        assert_eq!(setup.time, at(15));
    }

    #[test]
    fn test_short_setup() {
        let prev = bar(0, 11.0, 12.0, 9.0, 10.0);
        let cur = bar(15, 10.0, 10.5, 8.0, 8.5);
        let setup = detect(&prev, &cur).unwrap();
        assert_eq!(setup.direction, Direction::Short);
        assert_eq!(setup.level, 9.0);
    }

    #[test]
    fn test_close_must_strictly_break_level() {
        let prev = bar(0, 10.0, 12.0, 9.0, 11.0);
        let cur = bar(15, 11.0, 13.0, 10.0, 12.0);
        assert!(detect(&prev, &cur).is_none());
    }

    #[test]
    fn test_mixed_colors_are_ignored() {
        let prev = bar(0, 11.0, 12.0, 9.0, 10.0);
        let cur = bar(15, 11.0, 13.0, 10.0, 12.5);
        assert!(detect(&prev, &cur).is_none());

        let doji = bar(0, 10.0, 12.0, 9.0, 10.0);
        assert!(detect(&doji, &cur).is_none());
    }

    #[test]
    fn test_scan_pairs() {
        let bars = vec![
            bar(0, 10.0, 12.0, 9.0, 11.0),
            bar(15, 11.0, 13.0, 10.0, 12.5),
            bar(30, 12.5, 14.0, 12.0, 13.5),
            bar(45, 13.5, 13.6, 11.0, 11.5),
        ];
        let setups: Vec<Setup> = scan(&bars).collect();
        assert_eq!(setups.len(), 2);
        assert_eq!(setups[1].level, 13.0);
    }
}
