use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc;

use tracing::{debug, info, warn};

use crate::error::CollectError;
use crate::league::{LazySession, LeagueSource};
use crate::record::MatchRecord;
use crate::task::{CollectionResult, CollectionTask, SeasonBatch};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    Sequential,
    /// Fixed pool; every worker owns its own session.
    Parallel { max_workers: usize },
}

impl ExecutionMode {
    pub fn parallel(max_workers: usize) -> Self {
        ExecutionMode::Parallel {
            max_workers: max_workers.max(1),
        }
    }
}

/// Lifecycle of one season batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Enumerating,
    Dispatching,
    Collecting,
    Retrying,
    Done,
}

fn enter(league: &str, year: i32, phase: Phase) {
    debug!(league, year, ?phase, "season phase");
}

/// Enumerates, fetches and retries one (league, year) season.
///
/// Failed first-pass tasks are resubmitted exactly once in the same mode; a
/// second failure drops the task and is only counted.
pub fn collect_season<L: LeagueSource>(
    source: &L,
    year: i32,
    mode: ExecutionMode,
) -> Result<SeasonBatch, CollectError> {
    let league = source.display_name().to_string();
    let mut session = LazySession::new(source);

    enter(&league, year, Phase::Enumerating);
    let tasks = source.enumerate(year, &mut session)?;
    info!(league = %league, year, tasks = tasks.len(), ?mode, "season enumerated");
    if matches!(mode, ExecutionMode::Parallel { .. }) {
        session.close();
    }

    enter(&league, year, Phase::Dispatching);
    let first = run_pass(source, &mut session, &tasks, mode);

    enter(&league, year, Phase::Collecting);
    let mut records: BTreeMap<usize, MatchRecord> = BTreeMap::new();
    let mut failed: Vec<CollectionTask> = Vec::new();
    for (position, outcome) in first {
        match outcome {
            Ok(record) => {
                records.insert(position, record);
            }
            Err(failure) => {
                debug!(failure = %failure, "first pass failure");
                failed.push(failure.task);
            }
        }
    }
    failed.sort_by_key(|task| task.position);

    let retried = failed.len();
    let mut dropped = 0;
    if !failed.is_empty() {
        enter(&league, year, Phase::Retrying);
        warn!(league = %league, year, failed = retried, "retrying failed matches");
        for (position, outcome) in run_pass(source, &mut session, &failed, mode) {
            match outcome {
                Ok(record) => {
                    records.insert(position, record);
                }
                Err(failure) => {
                    dropped += 1;
                    warn!(task = %failure.task, error = %failure.error, kind = failure.error.label(), "match dropped after retry");
                }
            }
        }
    }
    session.close();

    enter(&league, year, Phase::Done);
    info!(
        league = %league,
        year,
        collected = records.len(),
        retried,
        dropped,
        "season collected"
    );
    Ok(SeasonBatch {
        league,
        year,
        records: records.into_values().collect(),
        enumerated: tasks.len(),
        retried,
        dropped,
    })
}

/// One pass over `tasks`, keyed by enumeration position. Map insertion follows
/// completion order.
fn run_pass<L: LeagueSource>(
    source: &L,
    session: &mut LazySession<'_, L>,
    tasks: &[CollectionTask],
    mode: ExecutionMode,
) -> HashMap<usize, CollectionResult> {
    match mode {
        ExecutionMode::Sequential => run_sequential(session, tasks),
        ExecutionMode::Parallel { max_workers } => {
            let workers = max_workers.min(tasks.len()).max(1);
            match rayon::ThreadPoolBuilder::new().num_threads(workers).build() {
                Ok(pool) => run_parallel(&pool, source, tasks, workers),
                Err(err) => {
                    warn!(error = %err, "worker pool unavailable, running sequentially");
                    run_sequential(session, tasks)
                }
            }
        }
    }
}

fn run_sequential<L: LeagueSource>(
    session: &mut LazySession<'_, L>,
    tasks: &[CollectionTask],
) -> HashMap<usize, CollectionResult> {
    let mut outcomes = HashMap::with_capacity(tasks.len());
    for task in tasks {
        outcomes.insert(task.position, session.fetch(task));
    }
    outcomes
}

fn run_parallel<L: LeagueSource>(
    pool: &rayon::ThreadPool,
    source: &L,
    tasks: &[CollectionTask],
    workers: usize,
) -> HashMap<usize, CollectionResult> {
    let cursor = AtomicUsize::new(0);
    let (tx, rx) = mpsc::channel::<(usize, CollectionResult)>();

    pool.scope(|scope| {
        for worker in 0..workers {
            let tx = tx.clone();
            let cursor = &cursor;
            scope.spawn(move |_| {
                let mut session = LazySession::new(source);
                while let Some(task) = tasks.get(cursor.fetch_add(1, Ordering::Relaxed)) {
                    if tx.send((task.position, session.fetch(task))).is_err() {
                        break;
                    }
                }
                debug!(worker, sessions = session.opened(), "worker drained");
            });
        }
    });
    drop(tx);

    rx.into_iter().collect()
}
