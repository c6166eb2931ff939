use tracing::debug;

use crate::error::{CollectError, FetchError, FetchFailure};
use crate::record::MatchRecord;
use crate::task::{CollectionResult, CollectionTask};

/// One league of one source family: knows how to enumerate a season and
/// fetch a single match with a session it owns exclusively.
pub trait LeagueSource: Sync + Sized {
    /// Per-worker connection state (HTTP client, browser).
    type Session;

    fn display_name(&self) -> &str;

    fn open_session(&self) -> Result<Self::Session, FetchError>;

    fn enumerate(
        &self,
        year: i32,
        session: &mut LazySession<'_, Self>,
    ) -> Result<Vec<CollectionTask>, CollectError>;

    fn fetch(
        &self,
        session: &mut Self::Session,
        task: &CollectionTask,
    ) -> Result<MatchRecord, FetchError>;

    /// Whether `session` can serve another task. A fetch may succeed on a
    /// session that broke during an optional step.
    fn session_alive(&self, _session: &Self::Session) -> bool {
        true
    }
}

/// Session opened on first use and released when dropped.
pub struct LazySession<'a, L: LeagueSource> {
    source: &'a L,
    session: Option<L::Session>,
    opened: usize,
}

impl<'a, L: LeagueSource> LazySession<'a, L> {
    pub fn new(source: &'a L) -> Self {
        Self {
            source,
            session: None,
            opened: 0,
        }
    }

    pub fn get(&mut self) -> Result<&mut L::Session, FetchError> {
        if self.session.is_none() {
            let session = self.source.open_session()?;
            self.opened += 1;
            debug!(league = self.source.display_name(), "session opened");
            self.session = Some(session);
        }
        self.session
            .as_mut()
            .ok_or_else(|| FetchError::SessionError("session unavailable".to_string()))
    }

    /// Fetches one task. A session-level failure, or a session the source
    /// reports dead afterwards, is discarded so the next task starts fresh.
    pub fn fetch(&mut self, task: &CollectionTask) -> CollectionResult {
        let source = self.source;
        let (outcome, alive) = match self.get() {
            Ok(session) => {
                let outcome = source.fetch(session, task);
                (outcome, source.session_alive(session))
            }
            Err(err) => (Err(err), false),
        };
        if !alive || matches!(outcome, Err(FetchError::SessionError(_))) {
            self.close();
        }
        outcome.map_err(|error| FetchFailure {
            task: task.clone(),
            error,
        })
    }

    pub fn close(&mut self) {
        if self.session.take().is_some() {
            debug!(league = self.source.display_name(), "session closed");
        }
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Number of sessions this handle has opened so far.
    pub fn opened(&self) -> usize {
        self.opened
    }
}
