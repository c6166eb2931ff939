pub mod browser;
pub mod collect;
pub mod config;
pub mod error;
pub mod extract;
pub mod http_client;
pub mod jleague;
pub mod kleague;
pub mod league;
pub mod orchestrator;
pub mod record;
pub mod store;
pub mod task;

pub use collect::{CollectionOutput, Collector, LeagueSpec, YearSpec};
pub use error::{CollectError, FetchError, FetchFailure};
pub use orchestrator::{ExecutionMode, collect_season};
pub use record::{FieldValue, MatchRecord};
