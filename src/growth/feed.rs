//! Crop-model output feed
//!
//! Pull interface over the simulator's daily output (`.out`, whitespace
//! delimited after a fixed preamble) and the stage interval table (CSV).
//! Missing, empty or stale feeds are typed conditions, not file checks
//! scattered through callers.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("feed file not found: {}", path.display())]
    Missing { path: PathBuf },

    #[error("failed to read feed file {}: {reason}", path.display())]
    Unreadable { path: PathBuf, reason: String },

    #[error("feed file {} has no usable rows", path.display())]
    Empty { path: PathBuf },

    #[error("feed file {} is missing columns {columns:?}", path.display())]
    MissingColumns { path: PathBuf, columns: Vec<String> },

    #[error("feed is stale: latest row {latest} is before {today}")]
    Stale { latest: NaiveDate, today: NaiveDate },
}

/// One simulated day
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeedRow {
    pub date: NaiveDate,
    /// Root depth (m)
    pub root_depth_m: Option<f64>,
    /// Crop evapotranspiration (mm/day)
    pub etc_mm: Option<f64>,
    /// Rainfall (mm/day)
    pub rain_mm: Option<f64>,
}

/// Phenological stage interval, both ends inclusive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GrowthStage {
    pub name: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl GrowthStage {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

pub trait GrowthFeed: Send + Sync + fmt::Debug {
    /// All dated rows, ascending
    fn rows(&self) -> Result<Vec<FeedRow>, FeedError>;

    /// Stage intervals in file order
    fn stages(&self) -> Result<Vec<GrowthStage>, FeedError>;

    /// Row for `date`, else the closest row by absolute day distance
    fn current_row(&self, date: NaiveDate) -> Result<Option<FeedRow>, FeedError> {
        let rows = self.rows()?;
        let Some(latest) = rows.iter().map(|row| row.date).max() else {
            return Ok(None);
        };
        if latest < date {
            return Err(FeedError::Stale {
                latest,
                today: date,
            });
        }

        if let Some(exact) = rows.iter().find(|row| row.date == date) {
            return Ok(Some(exact.clone()));
        }

        debug!(date = %date, "No feed row for date, using closest");
        Ok(rows
            .into_iter()
            .min_by_key(|row| (row.date - date).num_days().abs()))
    }

    /// First stage interval containing `date`
    fn stage_at(&self, date: NaiveDate) -> Result<Option<GrowthStage>, FeedError> {
        Ok(self
            .stages()?
            .into_iter()
            .find(|stage| stage.contains(date)))
    }
}

const STAGE_NAME_HEADERS: [&str; 3] = ["stage", "stage_name", "阶段"];
const STAGE_START_HEADERS: [&str; 2] = ["start_date", "开始日期"];
const STAGE_END_HEADERS: [&str; 2] = ["end_date", "结束日期"];

/// Feed backed by the simulator's files on disk; re-read on every call so a
/// refreshed model run is picked up without restarting.
#[derive(Debug, Clone)]
pub struct FileGrowthFeed {
    feed_path: PathBuf,
    stage_table_path: PathBuf,
    header_skip_lines: usize,
}

impl FileGrowthFeed {
    pub fn new(
        feed_path: impl Into<PathBuf>,
        stage_table_path: impl Into<PathBuf>,
        header_skip_lines: usize,
    ) -> Self {
        Self {
            feed_path: feed_path.into(),
            stage_table_path: stage_table_path.into(),
            header_skip_lines,
        }
    }

    pub fn feed_path(&self) -> &Path {
        &self.feed_path
    }

    fn read(path: &Path) -> Result<String, FeedError> {
        if !path.is_file() {
            return Err(FeedError::Missing {
                path: path.to_path_buf(),
            });
        }
        fs::read_to_string(path).map_err(|e| FeedError::Unreadable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn parse_rows(&self, content: &str) -> Result<Vec<FeedRow>, FeedError> {
        let mut lines = content
            .lines()
            .skip(self.header_skip_lines)
            .filter(|line| !line.trim().is_empty());

        let Some(header_line) = lines.next() else {
            return Err(FeedError::Empty {
                path: self.feed_path.clone(),
            });
        };
        let header: Vec<&str> = header_line.split_whitespace().collect();
        let column = |name: &str| header.iter().position(|h| *h == name);

        let (date_idx, etc_idx, rain_idx) = match (column("Date"), column("ETc"), column("Rain")) {
            (Some(date), Some(etc), Some(rain)) => (date, etc, rain),
            _ => {
                let columns = ["Date", "ETc", "Rain"]
                    .into_iter()
                    .filter(|&name| column(name).is_none())
                    .map(str::to_string)
                    .collect();
                return Err(FeedError::MissingColumns {
                    path: self.feed_path.clone(),
                    columns,
                });
            }
        };
        let root_idx = column("Zr");

        let mut rows: Vec<FeedRow> = lines
            .filter_map(|line| {
                let cells: Vec<&str> = line.split_whitespace().collect();
                let date = NaiveDate::parse_from_str(cells.get(date_idx)?, "%m/%d/%y").ok()?;
                let number = |idx: Option<usize>| {
                    idx.and_then(|i| cells.get(i))
                        .and_then(|cell| cell.parse::<f64>().ok())
                        .filter(|value| value.is_finite())
                };
                Some(FeedRow {
                    date,
                    root_depth_m: number(root_idx),
                    etc_mm: number(Some(etc_idx)),
                    rain_mm: number(Some(rain_idx)),
                })
            })
            .collect();

        if rows.is_empty() {
            return Err(FeedError::Empty {
                path: self.feed_path.clone(),
            });
        }

        rows.sort_by_key(|row| row.date);
        Ok(rows)
    }

    fn parse_stages(&self, content: &str) -> Result<Vec<GrowthStage>, FeedError> {
        let mut lines = content
            .lines()
            .map(|line| line.trim_start_matches('\u{feff}'))
            .filter(|line| !line.trim().is_empty());

        let Some(header_line) = lines.next() else {
            return Err(FeedError::Empty {
                path: self.stage_table_path.clone(),
            });
        };
        let header: Vec<String> = header_line
            .split(',')
            .map(|h| h.trim().to_lowercase())
            .collect();
        let column = |aliases: &[&str]| header.iter().position(|h| aliases.contains(&h.as_str()));

        let (name_idx, start_idx, end_idx) = match (
            column(&STAGE_NAME_HEADERS[..]),
            column(&STAGE_START_HEADERS[..]),
            column(&STAGE_END_HEADERS[..]),
        ) {
            (Some(name), Some(start), Some(end)) => (name, start, end),
            _ => {
                return Err(FeedError::MissingColumns {
                    path: self.stage_table_path.clone(),
                    columns: vec![
                        "stage".to_string(),
                        "start_date".to_string(),
                        "end_date".to_string(),
                    ],
                })
            }
        };

        let stages: Vec<GrowthStage> = lines
            .filter_map(|line| {
                let cells: Vec<&str> = line.split(',').map(str::trim).collect();
                Some(GrowthStage {
                    name: cells.get(name_idx)?.to_string(),
                    start_date: parse_stage_date(cells.get(start_idx)?)?,
                    end_date: parse_stage_date(cells.get(end_idx)?)?,
                })
            })
            .collect();

        if stages.is_empty() {
            return Err(FeedError::Empty {
                path: self.stage_table_path.clone(),
            });
        }
        Ok(stages)
    }
}

impl GrowthFeed for FileGrowthFeed {
    fn rows(&self) -> Result<Vec<FeedRow>, FeedError> {
        let content = Self::read(&self.feed_path)?;
        self.parse_rows(&content)
    }

    fn stages(&self) -> Result<Vec<GrowthStage>, FeedError> {
        let content = Self::read(&self.stage_table_path)?;
        self.parse_stages(&content)
    }
}

fn parse_stage_date(cell: &str) -> Option<NaiveDate> {
    let day = cell.get(..10).unwrap_or(cell);
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(day, "%Y/%m/%d"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        path
    }

    fn preamble() -> String {
        (0..10).map(|i| format!("preamble line {i}\n")).collect()
    }

    fn ymd(m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, m, d).unwrap()
    }

    #[test]
    fn test_parses_out_file_after_preamble() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}  Year-DOY  Date   Zr    ETc   Rain\n\
             2025-335 12/01/25 0.25 1.5 0.0\n\
             2025-336 12/02/25 0.26 nan 4.0\n\
             2025-337 bad-date 0.27 1.0 0.0\n",
            preamble()
        );
        let feed_path = write(&dir, "wheat.out", &content);
        let feed = FileGrowthFeed::new(feed_path, dir.path().join("stages.csv"), 10);

        let rows = feed.rows().unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].date, ymd(12, 1));
        assert_eq!(rows[0].root_depth_m, Some(0.25));
        assert_eq!(rows[1].etc_mm, None);
        assert_eq!(rows[1].rain_mm, Some(4.0));
    }

    #[test]
    fn test_missing_columns_and_missing_file() {
        let dir = TempDir::new().unwrap();
        let content = format!("{}Date Zr\n12/01/25 0.3\n", preamble());
        let feed_path = write(&dir, "wheat.out", &content);
        let feed = FileGrowthFeed::new(&feed_path, dir.path().join("stages.csv"), 10);

        match feed.rows() {
            Err(FeedError::MissingColumns { columns, .. }) => {
                assert_eq!(columns, vec!["ETc".to_string(), "Rain".to_string()])
            }
            other => panic!("expected MissingColumns, got {other:?}"),
        }

        assert!(matches!(feed.stages(), Err(FeedError::Missing { .. })));
    }

    #[test]
    fn test_current_row_exact_closest_and_stale() {
        let dir = TempDir::new().unwrap();
        let content = format!(
            "{}Date Zr ETc Rain\n12/01/25 0.2 1 0\n12/05/25 0.4 1 0\n",
            preamble()
        );
        let feed = FileGrowthFeed::new(write(&dir, "w.out", &content), dir.path().join("s.csv"), 10);

        assert_eq!(feed.current_row(ymd(12, 5)).unwrap().unwrap().root_depth_m, Some(0.4));
        assert_eq!(feed.current_row(ymd(12, 2)).unwrap().unwrap().date, ymd(12, 1));
        assert_eq!(feed.current_row(ymd(11, 20)).unwrap().unwrap().date, ymd(12, 1));
        assert!(matches!(
            feed.current_row(ymd(12, 6)),
            Err(FeedError::Stale { .. })
        ));
    }

    #[test]
    fn test_stage_table_accepts_localized_headers() {
        let dir = TempDir::new().unwrap();
        let stage_path = write(
            &dir,
            "stages.csv",
            "\u{feff}阶段,开始日期,结束日期\n分蘖-越冬期,2025-11-20,2026-02-10\n返青-拔节期,2026-02-11,2026-03-20\n",
        );
        let feed = FileGrowthFeed::new(dir.path().join("w.out"), stage_path, 10);

        let stage = feed.stage_at(ymd(12, 1)).unwrap().unwrap();
        assert_eq!(stage.name, "分蘖-越冬期");
        assert!(feed.stage_at(ymd(11, 1)).unwrap().is_none());
    }

    #[test]
    fn test_stage_table_english_headers() {
        let dir = TempDir::new().unwrap();
        let stage_path = write(
            &dir,
            "stages.csv",
            "stage,start_date,end_date\njointing-heading,2026-03-21,2026-04-20\n",
        );
        let feed = FileGrowthFeed::new(dir.path().join("w.out"), stage_path, 10);
        let day = NaiveDate::from_ymd_opt(2026, 4, 20).unwrap();
        assert_eq!(feed.stage_at(day).unwrap().unwrap().name, "jointing-heading");
    }
}
