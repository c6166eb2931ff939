use std::fmt;

use crate::error::FetchFailure;
use crate::record::MatchRecord;

/// Identifies one match to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TaskLocator {
    /// In-season sequential id (1-based).
    Sequential(u32),
    /// Detail-page URL discovered by a list crawl.
    Url(String),
}

impl fmt::Display for TaskLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskLocator::Sequential(id) => write!(f, "#{id}"),
            TaskLocator::Url(url) => f.write_str(url),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CollectionTask {
    /// Index in enumeration order; the batch is sorted by this.
    pub position: usize,
    pub locator: TaskLocator,
    pub year: i32,
    /// League display name the record is labelled with.
    pub league: String,
}

impl CollectionTask {
    pub fn new(position: usize, locator: TaskLocator, year: i32, league: &str) -> Self {
        Self {
            position,
            locator,
            year,
            league: league.to_string(),
        }
    }
}

impl fmt::Display for CollectionTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.league, self.year, self.locator)
    }
}

pub type CollectionResult = Result<MatchRecord, FetchFailure>;

/// Ordered records for one (league, year) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonBatch {
    pub league: String,
    pub year: i32,
    pub records: Vec<MatchRecord>,
    /// Tasks enumerated for the season.
    pub enumerated: usize,
    /// Tasks that failed the first pass and were resubmitted.
    pub retried: usize,
    /// Tasks that failed both passes and are missing from `records`.
    pub dropped: usize,
}
