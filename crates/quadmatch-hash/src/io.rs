//! Point-set files, JSON run configuration and match reports.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use nalgebra::Point2;
use quadmatch_core::{AffineTransform, BackgroundDensity};
use serde::{Deserialize, Serialize};

use crate::{
    AcceptanceParams, BestMatch, MatchError, MatchOutcome, Matcher, QuadParams, SearchParams,
    SearchStats, TransformPair,
};

#[derive(thiserror::Error, Debug)]
pub enum QuadmatchIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("point {entry}: {reason}")]
    InvalidPoint { entry: usize, reason: String },
}

#[derive(thiserror::Error, Debug)]
pub enum QuadmatchRunError {
    #[error(transparent)]
    Io(#[from] QuadmatchIoError),
    #[error(transparent)]
    Match(#[from] MatchError),
}

/// One point in a JSON point file. Extra attributes are ignored.
#[derive(Deserialize)]
#[serde(untagged)]
enum PointRecord {
    Pair([f64; 2]),
    Xy { x: f64, y: f64 },
}

fn checked_point(entry: usize, x: f64, y: f64) -> Result<Point2<f64>, QuadmatchIoError> {
    if x.is_finite() && y.is_finite() {
        Ok(Point2::new(x, y))
    } else {
        Err(QuadmatchIoError::InvalidPoint {
            entry,
            reason: format!("non-finite coordinate ({x}, {y})"),
        })
    }
}

/// Parse `[[x, y], ...]` or `[{"x": .., "y": .., ...}, ...]`.
pub fn parse_points_json(raw: &str) -> Result<Vec<Point2<f64>>, QuadmatchIoError> {
    let records: Vec<PointRecord> = serde_json::from_str(raw)?;
    records
        .into_iter()
        .enumerate()
        .map(|(i, rec)| match rec {
            PointRecord::Pair([x, y]) | PointRecord::Xy { x, y } => checked_point(i, x, y),
        })
        .collect()
}

/// Parse text with two numeric columns per line.
///
/// Columns may be separated by whitespace or commas; `#` starts a comment.
/// Columns past the second are ignored. Entries are numbered by line (1-based).
pub fn parse_points_text(raw: &str) -> Result<Vec<Point2<f64>>, QuadmatchIoError> {
    let mut points = Vec::new();
    for (i, line) in raw.lines().enumerate() {
        let line_no = i + 1;
        let content = line.split('#').next().unwrap_or_default();
        let mut fields = content
            .split(|c: char| c.is_whitespace() || c == ',')
            .filter(|s| !s.is_empty());
        let Some(first) = fields.next() else {
            continue;
        };
        let Some(second) = fields.next() else {
            return Err(QuadmatchIoError::InvalidPoint {
                entry: line_no,
                reason: "expected two columns".to_string(),
            });
        };
        let parse = |s: &str| {
            s.parse::<f64>().map_err(|_| QuadmatchIoError::InvalidPoint {
                entry: line_no,
                reason: format!("not a number: {s:?}"),
            })
        };
        points.push(checked_point(line_no, parse(first)?, parse(second)?)?);
    }
    Ok(points)
}

/// Load a point set; `.json` files (or content starting with `[`) are JSON,
/// anything else is column text.
pub fn load_points(path: impl AsRef<Path>) -> Result<Vec<Point2<f64>>, QuadmatchIoError> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)?;
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
        || raw.trim_start().starts_with('[');
    if is_json {
        parse_points_json(&raw)
    } else {
        parse_points_text(&raw)
    }
}

/// Configuration for one reference/other matching run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchConfig {
    pub reference_path: String,
    pub other_path: String,
    #[serde(default)]
    pub output_path: Option<String>,
    #[serde(default)]
    pub density: BackgroundDensity,
    #[serde(default)]
    pub quads: QuadParams,
    #[serde(default)]
    pub search: SearchParams,
    #[serde(default)]
    pub acceptance: AcceptanceParams,
}

impl MatchConfig {
    pub fn new(reference_path: impl Into<String>, other_path: impl Into<String>) -> Self {
        Self {
            reference_path: reference_path.into(),
            other_path: other_path.into(),
            output_path: None,
            density: BackgroundDensity::default(),
            quads: QuadParams::default(),
            search: SearchParams::default(),
            acceptance: AcceptanceParams::default(),
        }
    }

    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, QuadmatchIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), QuadmatchIoError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    pub fn output_path(&self) -> Option<PathBuf> {
        self.output_path.as_ref().map(PathBuf::from)
    }

    /// Load both point sets, match them and build the report.
    pub fn run(&self) -> Result<MatchReport, QuadmatchRunError> {
        let reference = load_points(&self.reference_path)?;
        let other = load_points(&self.other_path)?;
        let reference_points = reference.len();
        let other_points = other.len();

        self.search.validate()?;
        let matcher = Matcher::new(reference, self.quads.clone(), self.density)?;
        let outcome = matcher.find_transform(other, &self.search)?;

        let mut report = MatchReport::new(
            &outcome,
            &self.acceptance,
            matcher.bg_probability(),
            reference_points,
            other_points,
        );
        report.reference_path = Some(self.reference_path.clone());
        report.other_path = Some(self.other_path.clone());
        Ok(report)
    }
}

/// Coefficient triples keyed by channel pair: `"1_0_x"`/`"1_0_y"` map
/// other to reference, `"0_1_x"`/`"0_1_y"` map reference to other.
pub type Mapping = BTreeMap<String, [f64; 3]>;

pub fn mapping_from(pair: &TransformPair) -> Mapping {
    let entries: [(&str, &AffineTransform); 2] =
        [("1_0", &pair.other_to_ref), ("0_1", &pair.ref_to_other)];
    let mut mapping = Mapping::new();
    for (key, t) in entries {
        mapping.insert(format!("{key}_x"), t.tx);
        mapping.insert(format!("{key}_y"), t.ty);
    }
    mapping
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchReport {
    #[serde(default)]
    pub reference_path: Option<String>,
    #[serde(default)]
    pub other_path: Option<String>,
    pub reference_points: usize,
    pub other_points: usize,
    pub bg_probability: f64,
    pub best_ratio: f64,
    pub min_ratio: f64,
    pub accepted: bool,
    #[serde(default)]
    pub best: Option<BestMatch>,
    pub stats: SearchStats,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mapping: Option<Mapping>,
}

impl MatchReport {
    pub fn new(
        outcome: &MatchOutcome,
        acceptance: &AcceptanceParams,
        bg_probability: f64,
        reference_points: usize,
        other_points: usize,
    ) -> Self {
        Self {
            reference_path: None,
            other_path: None,
            reference_points,
            other_points,
            bg_probability,
            best_ratio: outcome.best_ratio,
            min_ratio: acceptance.min_ratio,
            accepted: outcome.is_accepted(acceptance),
            best: outcome.best.clone(),
            stats: outcome.stats.clone(),
            mapping: outcome.accepted(acceptance).map(mapping_from),
        }
    }

    pub fn to_json_string(&self) -> Result<String, QuadmatchIoError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Load a report from JSON on disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, QuadmatchIoError> {
        let raw = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Write this report to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), QuadmatchIoError> {
        fs::write(path, self.to_json_string()?)?;
        Ok(())
    }
}
