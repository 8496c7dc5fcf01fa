//! Range filters applied to a scanned video list
//!
//! Each filter is optional and independent. Bounds arrive as raw text; a bound
//! that does not parse disables only its own predicate and is reported back as
//! a warning, so a typo never aborts the whole pass.

use crate::core::video_info::VideoRecord;
use crate::error::ChandlError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Date format accepted for publish-date bounds
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Raw inclusive bounds as entered by the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RangeInput {
    pub min: String,
    pub max: String,
}

impl RangeInput {
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        Self {
            min: min.into(),
            max: max.into(),
        }
    }
}

/// Filter criteria; `None` means the predicate is switched off
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    /// Publish date range, `YYYY-MM-DD`
    pub date: Option<RangeInput>,
    /// Duration range in minutes (fractions allowed)
    pub duration: Option<RangeInput>,
    /// View count range
    pub views: Option<RangeInput>,
}

/// A parsed, ready-to-evaluate predicate
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    PublishDate { from: NaiveDate, to: NaiveDate },
    Duration { min_secs: f64, max_secs: f64 },
    Views { min: u64, max: u64 },
}

impl Predicate {
    /// Evaluate against a single record
    pub fn matches(&self, video: &VideoRecord) -> bool {
        match self {
            Predicate::PublishDate { from, to } => {
                let day = video.publish_date();
                *from <= day && day <= *to
            }
            Predicate::Duration { min_secs, max_secs } => {
                let secs = video.duration as f64;
                *min_secs <= secs && secs <= *max_secs
            }
            Predicate::Views { min, max } => *min <= video.views && video.views <= *max,
        }
    }
}

/// Result of a filter pass
#[derive(Debug, Default)]
pub struct FilterOutcome {
    pub videos: Vec<VideoRecord>,
    /// One `FilterParse` error per predicate that was skipped
    pub warnings: Vec<ChandlError>,
}

impl FilterCriteria {
    /// No filtering at all
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_date(mut self, from: impl Into<String>, to: impl Into<String>) -> Self {
        self.date = Some(RangeInput::new(from, to));
        self
    }

    pub fn with_duration_minutes(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.duration = Some(RangeInput::new(min, max));
        self
    }

    pub fn with_views(mut self, min: impl Into<String>, max: impl Into<String>) -> Self {
        self.views = Some(RangeInput::new(min, max));
        self
    }

    /// Parse the enabled predicates; malformed ones are returned as warnings
    pub fn predicates(&self) -> (Vec<Predicate>, Vec<ChandlError>) {
        let mut predicates = Vec::new();
        let mut warnings = Vec::new();

        if let Some(range) = &self.date {
            match (parse_date(&range.min), parse_date(&range.max)) {
                (Ok(from), Ok(to)) => predicates.push(Predicate::PublishDate { from, to }),
                (Err(e), _) | (_, Err(e)) => warnings.push(e),
            }
        }

        if let Some(range) = &self.duration {
            match (parse_minutes(&range.min), parse_minutes(&range.max)) {
                (Ok(min), Ok(max)) => predicates.push(Predicate::Duration {
                    min_secs: min * 60.0,
                    max_secs: max * 60.0,
                }),
                (Err(e), _) | (_, Err(e)) => warnings.push(e),
            }
        }

        if let Some(range) = &self.views {
            match (parse_views(&range.min), parse_views(&range.max)) {
                (Ok(min), Ok(max)) => predicates.push(Predicate::Views { min, max }),
                (Err(e), _) | (_, Err(e)) => warnings.push(e),
            }
        }

        (predicates, warnings)
    }

    /// Apply all enabled predicates to `videos`
    pub fn apply(&self, videos: &[VideoRecord]) -> FilterOutcome {
        let (predicates, warnings) = self.predicates();
        for warning in &warnings {
            warn!("Skipping filter: {}", warning);
        }

        let videos = videos
            .iter()
            .filter(|video| predicates.iter().all(|p| p.matches(video)))
            .cloned()
            .collect();

        FilterOutcome { videos, warnings }
    }
}

fn parse_date(value: &str) -> Result<NaiveDate, ChandlError> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT).map_err(|_| ChandlError::FilterParse {
        field: "date",
        value: value.to_string(),
    })
}

fn parse_minutes(value: &str) -> Result<f64, ChandlError> {
    value
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|minutes| minutes.is_finite())
        .ok_or_else(|| ChandlError::FilterParse {
            field: "duration",
            value: value.to_string(),
        })
}

fn parse_views(value: &str) -> Result<u64, ChandlError> {
    value.trim().parse::<u64>().map_err(|_| ChandlError::FilterParse {
        field: "views",
        value: value.to_string(),
    })
}
