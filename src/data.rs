//! Data loading
//!
//! Reads raw tick exports (one or more delimited files), keeps trade ticks,
//! normalizes timestamps into the session time zone and merges everything
//! into one time-ordered series.
//!
//! Bad input is never fatal on its own: unreadable files, narrow files and
//! malformed rows are skipped and counted. Only a run that ends up with no
//! ticks at all fails.

use chrono::{NaiveDateTime, TimeZone};
use chrono_tz::Tz;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::{Config, ConfigError};
use crate::Tick;

/// Columns used from every file: timestamp, type, open, high, low, close, volume
pub const REQUIRED_COLUMNS: usize = 7;

const TIMESTAMP_FORMAT: &str = "%Y%m%d%H%M%S";

/// Delimiters tried when sniffing a file, in order of preference
const CANDIDATE_DELIMITERS: &[u8] = b",;\t|";

#[derive(Debug, Error)]
pub enum DataError {
    #[error("failed to read data directory {path}: {source}")]
    ReadDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("no usable trade ticks found in {0}")]
    NoUsableInput(PathBuf),
}

/// Counters collected while loading
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LoadStats {
    pub files_read: usize,
    pub files_skipped: usize,
    pub rows_kept: usize,
    pub rows_skipped: usize,
    /// Well-formed rows that were not trade ticks
    pub rows_filtered: usize,
}

/// Loads tick files and converts them into session-local [`Tick`]s
#[derive(Debug, Clone)]
pub struct TickLoader {
    trade_record_type: f64,
    source_tz: Tz,
    venue_tz: Tz,
    extension: String,
}

impl TickLoader {
    pub fn new(trade_record_type: i64, source_tz: Tz, venue_tz: Tz) -> Self {
        Self {
            trade_record_type: trade_record_type as f64,
            source_tz,
            venue_tz,
            extension: "csv".to_string(),
        }
    }

    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::new(
            config.data.trade_record_type,
            config.data.source_tz()?,
            config.session.tz()?,
        )
        .with_extension(config.data.file_extension.clone()))
    }

    /// Load every matching file in `dir`, merged and sorted by time
    pub fn load_dir(&self, dir: impl AsRef<Path>) -> Result<(Vec<Tick>, LoadStats), DataError> {
        let dir = dir.as_ref();
        let entries = fs::read_dir(dir).map_err(|source| DataError::ReadDir {
            path: dir.to_path_buf(),
            source,
        })?;

        let mut files: Vec<PathBuf> = entries
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| p.is_file())
            .filter(|p| {
                p.extension()
                    .and_then(|e| e.to_str())
                    .is_some_and(|e| e.eq_ignore_ascii_case(&self.extension))
            })
            .collect();
        files.sort();

        info!("Found {} data files in {}", files.len(), dir.display());
        self.load_files(&files)
            .map_err(|_| DataError::NoUsableInput(dir.to_path_buf()))
    }

    /// Load the given files, merged and sorted by time
    pub fn load_files(&self, files: &[PathBuf]) -> Result<(Vec<Tick>, LoadStats), DataError> {
        let mut stats = LoadStats::default();
        let mut ticks = Vec::new();

        for path in files {
            match fs::read(path) {
                Ok(bytes) => match self.parse_bytes(&bytes, &mut stats) {
                    Some(mut file_ticks) => {
                        debug!("Loaded {} ticks from {}", file_ticks.len(), path.display());
                        stats.files_read += 1;
                        ticks.append(&mut file_ticks);
                    }
                    None => {
                        warn!(
                            "Skipping {}: fewer than {} columns",
                            path.display(),
                            REQUIRED_COLUMNS
                        );
                        stats.files_skipped += 1;
                    }
                },
                Err(e) => {
                    warn!("Skipping {}: {}", path.display(), e);
                    stats.files_skipped += 1;
                }
            }
        }

        if ticks.is_empty() {
            return Err(DataError::NoUsableInput(
                files
                    .first()
                    .and_then(|p| p.parent())
                    .map(Path::to_path_buf)
                    .unwrap_or_default(),
            ));
        }

        ticks.sort_by_key(|t| t.time);

        info!(
            "Loaded {} trade ticks ({} files read, {} skipped, {} malformed rows)",
            stats.rows_kept, stats.files_read, stats.files_skipped, stats.rows_skipped
        );

        Ok((ticks, stats))
    }

    /// Parse one file's contents. `None` when the file is too narrow to use.
    pub fn parse_bytes(&self, bytes: &[u8], stats: &mut LoadStats) -> Option<Vec<Tick>> {
        let first_line = bytes.split(|b| *b == b'\n').next().unwrap_or_default();
        let delimiter = sniff_delimiter(first_line);

        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(delimiter)
            .from_reader(bytes);

        let mut ticks = Vec::new();
        let mut width_checked = false;

        for result in reader.byte_records() {
            let record = match result {
                Ok(r) => r,
                Err(e) => {
                    debug!("Skipping unreadable row: {}", e);
                    stats.rows_skipped += 1;
                    continue;
                }
            };

            if !width_checked {
                if record.len() < REQUIRED_COLUMNS {
                    return None;
                }
                width_checked = true;
            }

            match self.parse_record(&record) {
                RowParse::Tick(tick) => {
                    stats.rows_kept += 1;
                    ticks.push(tick);
                }
                RowParse::NotTrade => stats.rows_filtered += 1,
                RowParse::Malformed => stats.rows_skipped += 1,
            }
        }

        Some(ticks)
    }

    fn parse_record(&self, record: &csv::ByteRecord) -> RowParse {
        if record.len() < REQUIRED_COLUMNS {
            return RowParse::Malformed;
        }

        let field = |i: usize| -> String {
            record
                .get(i)
                .map(|f| String::from_utf8_lossy(f).trim().to_string())
                .unwrap_or_default()
        };

        let record_type = match field(1).parse::<f64>() {
            Ok(t) => t,
            Err(_) => return RowParse::Malformed,
        };

        let time = match parse_timestamp(&field(0))
            .and_then(|ts| convert_zone(ts, self.source_tz, self.venue_tz))
        {
            Some(t) => t,
            None => return RowParse::Malformed,
        };

        let prices: Option<Vec<f64>> = (2..6)
            .map(|i| field(i).parse::<f64>().ok().filter(|p| p.is_finite()))
            .collect();
        let Some(prices) = prices else {
            return RowParse::Malformed;
        };

        if record_type != self.trade_record_type {
            return RowParse::NotTrade;
        }

        RowParse::Tick(Tick {
            time,
            open: prices[0],
            high: prices[1],
            low: prices[2],
            close: prices[3],
        })
    }
}

enum RowParse {
    Tick(Tick),
    NotTrade,
    Malformed,
}

/// Pick the candidate delimiter that occurs most often in the first line
pub fn sniff_delimiter(first_line: &[u8]) -> u8 {
    CANDIDATE_DELIMITERS
        .iter()
        .map(|d| (*d, first_line.iter().filter(|b| *b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Parse a compact `YYYYMMDDHHMMSS` timestamp. A trailing `.0` is tolerated.
pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let digits = raw.trim().split('.').next()?;
    NaiveDateTime::parse_from_str(digits, TIMESTAMP_FORMAT).ok()
}

/// Re-express a wall-clock time from one zone in another.
///
/// Ambiguous source times resolve to the earlier instant; times that do not
/// exist in the source zone yield `None`.
pub fn convert_zone(naive: NaiveDateTime, from: Tz, to: Tz) -> Option<NaiveDateTime> {
    from.from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&to).naive_local())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn loader() -> TickLoader {
        TickLoader::new(2, chrono_tz::UTC, chrono_tz::US::Eastern)
    }

    #[test]
    fn test_sniff_delimiter() {
        assert_eq!(sniff_delimiter(b"a,b,c"), b',');
        assert_eq!(sniff_delimiter(b"a;b;c;d"), b';');
        assert_eq!(sniff_delimiter(b"a\tb\tc"), b'\t');
        assert_eq!(sniff_delimiter(b"nothing"), b',');
    }

    #[test]
    fn test_parse_timestamp() {
        let expected = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(14, 30, 5)
            .unwrap();
        assert_eq!(parse_timestamp("20240304143005"), Some(expected));
        assert_eq!(parse_timestamp(" 20240304143005.0 "), Some(expected));
        assert_eq!(parse_timestamp("2024-03-04"), None);
        assert_eq!(parse_timestamp("timestamp"), None);
    }

    #[test]
    fn test_convert_zone_handles_dst() {
        let winter = parse_timestamp("20240105143000").unwrap();
        let summer = parse_timestamp("20240705133000").unwrap();
        let east = chrono_tz::US::Eastern;
        assert_eq!(
            convert_zone(winter, chrono_tz::UTC, east).map(|t| t.to_string()),
            Some("2024-01-05 09:30:00".to_string())
        );
        assert_eq!(
            convert_zone(summer, chrono_tz::UTC, east).map(|t| t.to_string()),
            Some("2024-07-05 09:30:00".to_string())
        );
    }

    #[test]
    fn test_parse_bytes_filters_and_skips() {
        let data = b"timestamp;type;open;high;low;close;volume\n\
            20240105143000;2;10;11;9;10.5;100\n\
            20240105143100;1;10;11;9;10.5;100\n\
            garbage;2;10;11;9;10.5;100\n\
            20240105143200;2;10;oops;9;10.5;100\n\
            20240105143300;2;10.5;12;10;11;50\n";
        let mut stats = LoadStats::default();
        let ticks = loader().parse_bytes(data, &mut stats).unwrap();

        assert_eq!(ticks.len(), 2);
        assert_eq!(ticks[0].time.to_string(), "2024-01-05 09:30:00");
        assert_eq!(ticks[1].close, 11.0);
        assert_eq!(stats.rows_kept, 2);
        assert_eq!(stats.rows_filtered, 1);
        // header, bad timestamp, bad price
        assert_eq!(stats.rows_skipped, 3);
    }

    #[test]
    fn test_narrow_file_is_skipped() {
        let data = b"20240105143000,2,10,11\n";
        let mut stats = LoadStats::default();
        assert!(loader().parse_bytes(data, &mut stats).is_none());
    }

    #[test]
    fn test_latin1_bytes_do_not_abort() {
        let data = b"zeit\xe9,type,o,h,l,c,v\n20240105143000,2,10,11,9,10.5,100\n";
        let mut stats = LoadStats::default();
        let ticks = loader().parse_bytes(data, &mut stats).unwrap();
        assert_eq!(ticks.len(), 1);
    }
}
