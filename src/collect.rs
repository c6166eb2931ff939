use tracing::{debug, info, warn};

use crate::config::CollectorConfig;
use crate::error::CollectError;
use crate::jleague::{self, JLEAGUES, JLeague, resolve_jleague};
use crate::kleague::{self, KLEAGUES, KLeague, resolve_kleague};
use crate::orchestrator::{ExecutionMode, collect_season};
use crate::record::MatchRecord;
use crate::task::SeasonBatch;

/// Slug used when leagues of both families are combined.
pub const CROSS_FAMILY_SLUG: &str = "football";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum YearSpec {
    Single(i32),
    /// Two entries are an inclusive range; any other length is an explicit set.
    List(Vec<i32>),
}

impl From<i32> for YearSpec {
    fn from(year: i32) -> Self {
        YearSpec::Single(year)
    }
}

impl From<Vec<i32>> for YearSpec {
    fn from(years: Vec<i32>) -> Self {
        YearSpec::List(years)
    }
}

impl From<&[i32]> for YearSpec {
    fn from(years: &[i32]) -> Self {
        YearSpec::List(years.to_vec())
    }
}

impl<const N: usize> From<[i32; N]> for YearSpec {
    fn from(years: [i32; N]) -> Self {
        YearSpec::List(years.to_vec())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeagueSpec(pub Vec<String>);

impl From<&str> for LeagueSpec {
    fn from(name: &str) -> Self {
        LeagueSpec(vec![name.to_string()])
    }
}

impl From<String> for LeagueSpec {
    fn from(name: String) -> Self {
        LeagueSpec(vec![name])
    }
}

impl From<Vec<String>> for LeagueSpec {
    fn from(names: Vec<String>) -> Self {
        LeagueSpec(names)
    }
}

impl From<Vec<&str>> for LeagueSpec {
    fn from(names: Vec<&str>) -> Self {
        LeagueSpec(names.into_iter().map(str::to_string).collect())
    }
}

impl<const N: usize> From<[&str; N]> for LeagueSpec {
    fn from(names: [&str; N]) -> Self {
        LeagueSpec(names.iter().map(|n| n.to_string()).collect())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedYears {
    pub years: Vec<i32>,
    pub label: String,
}

pub fn resolve_years(requested: &YearSpec) -> Result<ResolvedYears, CollectError> {
    match requested {
        YearSpec::Single(year) => Ok(ResolvedYears {
            years: vec![*year],
            label: year.to_string(),
        }),
        YearSpec::List(list) if list.is_empty() => Err(CollectError::InvalidYears),
        YearSpec::List(list) if list.len() == 2 => {
            let (lo, hi) = (list[0].min(list[1]), list[0].max(list[1]));
            Ok(ResolvedYears {
                years: (lo..=hi).collect(),
                label: if lo == hi {
                    lo.to_string()
                } else {
                    format!("{lo}-{hi}")
                },
            })
        }
        YearSpec::List(list) => {
            let mut years = list.clone();
            years.sort_unstable();
            years.dedup();
            let label = years
                .iter()
                .map(i32::to_string)
                .collect::<Vec<_>>()
                .join("_");
            Ok(ResolvedYears { years, label })
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    KLeague,
    JLeague,
}

impl Family {
    pub fn slug(self) -> &'static str {
        match self {
            Family::KLeague => kleague::FAMILY_SLUG,
            Family::JLeague => jleague::FAMILY_SLUG,
        }
    }
}

/// A league resolved to its source family, chosen once per call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolvedLeague {
    Html(&'static KLeague),
    Rendered(&'static JLeague),
}

impl ResolvedLeague {
    pub fn display_name(&self) -> &'static str {
        match self {
            ResolvedLeague::Html(l) => l.display_name,
            ResolvedLeague::Rendered(l) => l.display_name,
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            ResolvedLeague::Html(l) => l.slug,
            ResolvedLeague::Rendered(l) => l.category,
        }
    }

    pub fn family(&self) -> Family {
        match self {
            ResolvedLeague::Html(_) => Family::KLeague,
            ResolvedLeague::Rendered(_) => Family::JLeague,
        }
    }
}

pub fn resolve_league(name: &str) -> Option<ResolvedLeague> {
    resolve_kleague(name)
        .map(ResolvedLeague::Html)
        .or_else(|| resolve_jleague(name).map(ResolvedLeague::Rendered))
}

/// `{slug}_match_{years}`: a lone league keeps its own slug, one family uses
/// the family slug, mixed families use [`CROSS_FAMILY_SLUG`].
pub fn output_file_name(leagues: &[ResolvedLeague], fallback: &str, year_label: &str) -> String {
    let slug = match leagues.first() {
        None => fallback,
        Some(first) if leagues.iter().all(|l| l == first) => first.slug(),
        Some(first) if leagues.iter().all(|l| l.family() == first.family()) => {
            first.family().slug()
        }
        Some(_) => CROSS_FAMILY_SLUG,
    };
    format!("{slug}_match_{year_label}")
}

/// A (league, year) input left out of the output, with the reason.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedInput {
    pub league: String,
    pub year: Option<i32>,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CollectionOutput {
    pub records: Vec<MatchRecord>,
    /// Extension-less name for the persistence sinks.
    pub file_name: String,
    /// Matches that failed both passes.
    pub dropped: usize,
    pub skipped: Vec<SkippedInput>,
}

/// Runs one season for a resolved league.
pub trait SeasonRunner {
    fn run(
        &self,
        league: ResolvedLeague,
        year: i32,
        mode: ExecutionMode,
    ) -> Result<SeasonBatch, CollectError>;
}

/// Sources backed by the live sites.
pub struct LiveSources {
    config: CollectorConfig,
}

impl LiveSources {
    pub fn new(config: CollectorConfig) -> Self {
        Self { config }
    }
}

impl SeasonRunner for LiveSources {
    fn run(
        &self,
        league: ResolvedLeague,
        year: i32,
        mode: ExecutionMode,
    ) -> Result<SeasonBatch, CollectError> {
        match league {
            ResolvedLeague::Html(l) => {
                let source = kleague::live_source(l, self.config.http.clone());
                collect_season(&source, year, mode)
            }
            ResolvedLeague::Rendered(l) => {
                let source = jleague::live_source(
                    l,
                    self.config.browser.clone(),
                    self.config.http.user_agent.clone(),
                );
                collect_season(&source, year, mode)
            }
        }
    }
}

pub struct Collector<R> {
    runner: R,
    mode: ExecutionMode,
}

impl Collector<LiveSources> {
    pub fn live(config: CollectorConfig, mode: ExecutionMode) -> Self {
        Self::new(LiveSources::new(config), mode)
    }
}

impl<R: SeasonRunner> Collector<R> {
    pub fn new(runner: R, mode: ExecutionMode) -> Self {
        Self { runner, mode }
    }

    pub fn mode(&self) -> ExecutionMode {
        self.mode
    }

    /// K League entry point; an unknown league name aborts the call.
    pub fn collect_kleague(
        &self,
        years: impl Into<YearSpec>,
        leagues: impl Into<LeagueSpec>,
    ) -> Result<CollectionOutput, CollectError> {
        let years = resolve_years(&years.into())?;
        let names = non_empty(leagues.into())?;
        let resolved = names
            .iter()
            .map(|name| {
                resolve_kleague(name)
                    .map(ResolvedLeague::Html)
                    .ok_or_else(|| unsupported(name, &kleague_names()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.run_all(resolved, &years, Vec::new(), Family::KLeague.slug())
    }

    /// J League entry point; unknown league names are skipped with a diagnostic.
    pub fn collect_jleague(
        &self,
        years: impl Into<YearSpec>,
        leagues: impl Into<LeagueSpec>,
    ) -> Result<CollectionOutput, CollectError> {
        let years = resolve_years(&years.into())?;
        let names = non_empty(leagues.into())?;
        let mut resolved = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for name in &names {
            match resolve_jleague(name) {
                Some(league) => resolved.push(ResolvedLeague::Rendered(league)),
                None => {
                    let err = unsupported(name, &jleague_names());
                    warn!(league = %name, error = %err, "skipping league");
                    skipped.push(SkippedInput {
                        league: name.clone(),
                        year: None,
                        reason: err.to_string(),
                    });
                }
            }
        }
        self.run_all(resolved, &years, skipped, Family::JLeague.slug())
    }

    /// Either family, mixed freely; a name neither family knows is skipped
    /// with a diagnostic. Mixed-family records are widened to one shared
    /// column set.
    pub fn collect(
        &self,
        years: impl Into<YearSpec>,
        leagues: impl Into<LeagueSpec>,
    ) -> Result<CollectionOutput, CollectError> {
        let years = resolve_years(&years.into())?;
        let names = non_empty(leagues.into())?;
        let expected = format!("{}, {}", kleague_names(), jleague_names());
        let mut resolved = Vec::with_capacity(names.len());
        let mut skipped = Vec::new();
        for name in &names {
            match resolve_league(name) {
                Some(league) => resolved.push(league),
                None => {
                    let err = unsupported(name, &expected);
                    warn!(league = %name, error = %err, "skipping league");
                    skipped.push(SkippedInput {
                        league: name.clone(),
                        year: None,
                        reason: err.to_string(),
                    });
                }
            }
        }
        self.run_all(resolved, &years, skipped, CROSS_FAMILY_SLUG)
    }

    fn run_all(
        &self,
        leagues: Vec<ResolvedLeague>,
        years: &ResolvedYears,
        mut skipped: Vec<SkippedInput>,
        fallback_slug: &str,
    ) -> Result<CollectionOutput, CollectError> {
        let file_name = output_file_name(&leagues, fallback_slug, &years.label);
        let mut records = Vec::new();
        let mut dropped = 0;

        for league in &leagues {
            for &year in &years.years {
                match self.runner.run(*league, year, self.mode) {
                    Ok(batch) => {
                        dropped += batch.dropped;
                        records.extend(batch.records);
                    }
                    Err(
                        err @ (CollectError::UnsupportedSeason { .. }
                        | CollectError::Enumeration { .. }),
                    ) => {
                        warn!(league = league.display_name(), year, error = %err, "skipping season");
                        skipped.push(SkippedInput {
                            league: league.display_name().to_string(),
                            year: Some(year),
                            reason: err.to_string(),
                        });
                    }
                    Err(err) => return Err(err),
                }
            }
        }

        let records = unify_columns(records);
        info!(
            file_name = %file_name,
            records = records.len(),
            dropped,
            skipped = skipped.len(),
            "collection finished"
        );
        Ok(CollectionOutput {
            records,
            file_name,
            dropped,
            skipped,
        })
    }
}

/// Widens records to the union of their key sets (first-seen order) when
/// they do not already share one.
fn unify_columns(records: Vec<MatchRecord>) -> Vec<MatchRecord> {
    let mut schema: Vec<&'static str> = Vec::new();
    for record in &records {
        for key in record.keys() {
            if !schema.contains(&key) {
                schema.push(key);
            }
        }
    }
    if records.iter().all(|r| r.keys().eq(schema.iter().copied())) {
        return records;
    }
    debug!(columns = schema.len(), "widening records to a shared column set");
    records.iter().map(|r| r.conform(&schema)).collect()
}

fn non_empty(leagues: LeagueSpec) -> Result<Vec<String>, CollectError> {
    if leagues.0.is_empty() {
        Err(CollectError::NoLeagues)
    } else {
        Ok(leagues.0)
    }
}

fn unsupported(name: &str, expected: &str) -> CollectError {
    CollectError::UnsupportedLeague {
        name: name.to_string(),
        expected: expected.to_string(),
    }
}

fn kleague_names() -> String {
    KLEAGUES
        .iter()
        .map(|l| l.display_name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn jleague_names() -> String {
    JLEAGUES
        .iter()
        .map(|l| l.display_name)
        .collect::<Vec<_>>()
        .join(", ")
}
