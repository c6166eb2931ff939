use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use match_collector::browser::BrowserSession;
use match_collector::http_client::HttpSession;
use match_collector::jleague::{JLeagueSource, Waits, resolve_jleague};
use match_collector::kleague::{
    KLeagueSource, MATCH_RECORD_URL, POSSESSION_URL, known_match_count, resolve_kleague,
};
use match_collector::{
    CollectError, ExecutionMode, FetchError, FieldValue, MatchRecord, collect_season,
};

fn read_fixture(name: &str) -> String {
    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("tests");
    path.push("fixtures");
    path.push(name);
    fs::read_to_string(path).expect("fixture file should be readable")
}

fn query_param<T: std::str::FromStr>(url: &str, key: &str) -> Option<T> {
    url.split(&format!("{key}="))
        .nth(1)?
        .split('&')
        .next()?
        .parse()
        .ok()
}

/// Scripted K League site shared by every session a source opens.
#[derive(Default)]
struct SiteScript {
    /// gameId -> number of page loads that fail before one succeeds.
    page_failures: Mutex<HashMap<u32, usize>>,
    stats_down: bool,
    possession_down: bool,
    sessions: AtomicUsize,
}

struct FakeSite {
    script: Arc<SiteScript>,
    page: String,
    record_json: String,
    possession_json: String,
}

impl HttpSession for FakeSite {
    fn get_text(&mut self, url: &str) -> Result<String, FetchError> {
        let id: u32 = query_param(url, "gameId").expect("game id in url");
        let mut failures = self.script.page_failures.lock().expect("lock");
        if let Some(left) = failures.get_mut(&id).filter(|left| **left > 0) {
            *left -= 1;
            return Err(FetchError::NetworkError(format!("scripted failure for {id}")));
        }
        Ok(self.page.clone())
    }

    fn post_form(&mut self, url: &str, form: &[(&str, String)]) -> Result<String, FetchError> {
        assert!(form.iter().any(|(k, _)| *k == "gameId"));
        match url {
            MATCH_RECORD_URL if self.script.stats_down => {
                Err(FetchError::NetworkError("stats down".into()))
            }
            MATCH_RECORD_URL => Ok(self.record_json.clone()),
            POSSESSION_URL if self.script.possession_down => {
                Err(FetchError::PageLoadTimeout(url.into()))
            }
            POSSESSION_URL => Ok(self.possession_json.clone()),
            other => panic!("unexpected post to {other}"),
        }
    }
}

fn kleague_source(
    name: &str,
    script: Arc<SiteScript>,
) -> KLeagueSource<impl Fn() -> Result<FakeSite, FetchError> + Sync> {
    let league = resolve_kleague(name).expect("known league");
    let page = read_fixture("kleague_match.html");
    let record_json = read_fixture("kleague_match_record.json");
    let possession_json = read_fixture("kleague_possession.json");
    KLeagueSource::new(league, move || {
        script.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeSite {
            script: Arc::clone(&script),
            page: page.clone(),
            record_json: record_json.clone(),
            possession_json: possession_json.clone(),
        })
    })
}

fn game_ids(records: &[MatchRecord]) -> Vec<i64> {
    records
        .iter()
        .filter_map(|r| r.get("game_id").and_then(FieldValue::as_i64))
        .collect()
}

#[test]
fn healthy_season_returns_every_match_in_order() {
    let script = Arc::new(SiteScript::default());
    let source = kleague_source("승강PO", Arc::clone(&script));
    let batch = collect_season(&source, 2024, ExecutionMode::Sequential).expect("season");

    let expected = known_match_count("승강PO", 2024).expect("count") as usize;
    assert_eq!(batch.records.len(), expected);
    assert_eq!(game_ids(&batch.records), vec![1, 2, 3, 4]);
    assert_eq!(batch.enumerated, expected);
    assert_eq!((batch.retried, batch.dropped), (0, 0));
    assert_eq!(script.sessions.load(Ordering::SeqCst), 1);
    let first = &batch.records[0];
    assert_eq!(first.get("league_name"), Some(&FieldValue::Text("K리그1".into())));
    assert_eq!(first.get("home_possession"), Some(&FieldValue::Int(58)));
    assert_eq!(
        first.get("home_first_15_possession"),
        Some(&FieldValue::Float(61.2))
    );
}

#[test]
fn task_recovered_on_retry_keeps_its_position() {
    let script = Arc::new(SiteScript {
        page_failures: Mutex::new(HashMap::from([(2, 1)])),
        ..SiteScript::default()
    });
    let source = kleague_source("승강PO", script);
    let batch = collect_season(&source, 2023, ExecutionMode::Sequential).expect("season");

    assert_eq!(game_ids(&batch.records), vec![1, 2, 3, 4]);
    assert_eq!(batch.retried, 1);
    assert_eq!(batch.dropped, 0);
}

#[test]
fn second_failure_drops_the_task_and_counts_it() {
    let script = Arc::new(SiteScript {
        page_failures: Mutex::new(HashMap::from([(3, 2), (1, 1)])),
        ..SiteScript::default()
    });
    let source = kleague_source("승강PO", script);
    let batch = collect_season(&source, 2025, ExecutionMode::parallel(2)).expect("season");

    assert_eq!(game_ids(&batch.records), vec![1, 2, 4]);
    assert_eq!(batch.retried, 2);
    assert_eq!(batch.dropped, 1);
}

#[test]
fn parallel_and_sequential_batches_are_identical() {
    let sequential = collect_season(
        &kleague_source("K리그1", Arc::new(SiteScript::default())),
        2024,
        ExecutionMode::Sequential,
    )
    .expect("sequential season");

    for workers in [1, 3, 8] {
        let script = Arc::new(SiteScript::default());
        let source = kleague_source("K리그1", Arc::clone(&script));
        let parallel =
            collect_season(&source, 2024, ExecutionMode::parallel(workers)).expect("season");
        assert_eq!(parallel.records, sequential.records, "workers = {workers}");
        assert!(script.sessions.load(Ordering::SeqCst) <= workers);
    }
    assert_eq!(sequential.records.len(), 228);
}

#[test]
fn base_statistics_failure_leaves_all_statistics_null() {
    let script = Arc::new(SiteScript {
        stats_down: true,
        ..SiteScript::default()
    });
    let batch = collect_season(
        &kleague_source("승강PO", script),
        2024,
        ExecutionMode::Sequential,
    )
    .expect("season");

    assert_eq!(batch.records.len(), 4);
    for record in &batch.records {
        assert_eq!(record.get("home_team"), Some(&FieldValue::Text("울산".into())));
        assert_eq!(record.get("home_possession"), Some(&FieldValue::Null));
        assert_eq!(record.get("away_offsides"), Some(&FieldValue::Null));
        assert_eq!(record.get("home_first_15_possession"), Some(&FieldValue::Null));
    }
}

#[test]
fn possession_failure_keeps_base_statistics() {
    let script = Arc::new(SiteScript {
        possession_down: true,
        ..SiteScript::default()
    });
    let batch = collect_season(
        &kleague_source("승강PO", script),
        2024,
        ExecutionMode::Sequential,
    )
    .expect("season");

    let record = &batch.records[0];
    assert_eq!(record.get("home_possession"), Some(&FieldValue::Int(58)));
    assert_eq!(record.get("away_attempts"), Some(&FieldValue::Int(9)));
    assert_eq!(record.get("home_first_15_possession"), Some(&FieldValue::Null));
    assert_eq!(record.get("away_second_45_possession"), Some(&FieldValue::Null));
}

#[test]
fn unknown_season_is_unsupported() {
    let source = kleague_source("슈퍼컵", Arc::new(SiteScript::default()));
    let err = collect_season(&source, 2025, ExecutionMode::Sequential).unwrap_err();
    assert_eq!(
        err,
        CollectError::UnsupportedSeason {
            league: "슈퍼컵".into(),
            year: 2025
        }
    );
}

/// Scripted J League site: list pages per month, one detail page for every match.
struct BrowserScript {
    months: HashMap<u32, String>,
    detail: String,
    tracking: Option<String>,
    /// Detail URLs whose next page wait times out.
    slow_once: Mutex<Vec<String>>,
    /// The next tracking-tab click kills the browser it runs in.
    crash_on_click: AtomicBool,
    sessions: AtomicUsize,
}

struct FakeBrowser {
    script: Arc<BrowserScript>,
    current: String,
    tracking_open: bool,
    dead: bool,
}

impl FakeBrowser {
    fn month(&self) -> Option<u32> {
        query_param(&self.current, "month")
    }

    fn ensure_alive(&self) -> Result<(), FetchError> {
        if self.dead {
            return Err(FetchError::SessionError("invalid session id".into()));
        }
        Ok(())
    }
}

impl BrowserSession for FakeBrowser {
    fn navigate(&mut self, url: &str) -> Result<(), FetchError> {
        self.ensure_alive()?;
        self.current = url.to_string();
        self.tracking_open = false;
        Ok(())
    }

    fn wait_for(&mut self, css: &str, _timeout: Duration) -> Result<bool, FetchError> {
        self.ensure_alive()?;
        Ok(match css {
            "section.matchlistWrap" => self
                .month()
                .is_some_and(|m| self.script.months.contains_key(&m)),
            ".liveTopTable" => {
                let mut slow = self.script.slow_once.lock().expect("lock");
                match slow.iter().position(|u| *u == self.current) {
                    Some(idx) => {
                        slow.remove(idx);
                        false
                    }
                    None => true,
                }
            }
            ".total_km" => self.tracking_open,
            other => panic!("unexpected wait for {other}"),
        })
    }

    fn click(&mut self, _css: &str) -> Result<bool, FetchError> {
        self.ensure_alive()?;
        if self.script.crash_on_click.swap(false, Ordering::SeqCst) {
            self.dead = true;
            return Err(FetchError::SessionError("chrome not reachable".into()));
        }
        self.tracking_open = self.script.tracking.is_some();
        Ok(self.tracking_open)
    }

    fn page_source(&mut self) -> Result<String, FetchError> {
        self.ensure_alive()?;
        if let Some(month) = self.month() {
            return Ok(self.script.months.get(&month).cloned().unwrap_or_default());
        }
        match (&self.script.tracking, self.tracking_open) {
            (Some(tracking), true) => Ok(tracking.clone()),
            _ => Ok(self.script.detail.clone()),
        }
    }

    fn is_alive(&self) -> bool {
        !self.dead
    }
}

fn browser_script(tracking: bool, slow_once: Vec<String>) -> Arc<BrowserScript> {
    let april = r#"<section class="matchlistWrap"><table><tr>
        <td class="match"><a href="/match/j1/2025/041201/live/">詳細</a></td>
        </tr></table></section>"#;
    Arc::new(BrowserScript {
        months: HashMap::from([
            (3, read_fixture("jleague_list.html")),
            (4, april.to_string()),
            (5, r#"<section class="matchlistWrap"></section>"#.to_string()),
        ]),
        detail: read_fixture("jleague_detail.html"),
        tracking: tracking.then(|| read_fixture("jleague_tracking.html")),
        slow_once: Mutex::new(slow_once),
        crash_on_click: AtomicBool::new(false),
        sessions: AtomicUsize::new(0),
    })
}

fn jleague_source(
    script: Arc<BrowserScript>,
) -> JLeagueSource<impl Fn() -> Result<FakeBrowser, FetchError> + Sync> {
    let waits = Waits {
        page: Duration::from_millis(10),
        list: Duration::from_millis(10),
        tracking: Duration::from_millis(10),
    };
    JLeagueSource::new(resolve_jleague("J1").expect("J1"), waits, move || {
        script.sessions.fetch_add(1, Ordering::SeqCst);
        Ok(FakeBrowser {
            script: Arc::clone(&script),
            current: String::new(),
            tracking_open: false,
            dead: false,
        })
    })
}

#[test]
fn list_crawl_enumerates_months_in_order() {
    let script = browser_script(true, Vec::new());
    let batch = collect_season(
        &jleague_source(Arc::clone(&script)),
        2025,
        ExecutionMode::Sequential,
    )
    .expect("season");

    assert_eq!(batch.enumerated, 3);
    assert_eq!(batch.records.len(), 3);
    assert_eq!(script.sessions.load(Ordering::SeqCst), 1);
    for record in &batch.records {
        assert_eq!(record.get("league_name"), Some(&FieldValue::Text("J리그1".into())));
        assert_eq!(record.get("home_distance"), Some(&FieldValue::Float(115.2)));
        assert_eq!(record.get("away_sprint"), Some(&FieldValue::Int(38)));
    }
}

#[test]
fn missing_tracking_tab_is_not_a_failure() {
    let batch = collect_season(
        &jleague_source(browser_script(false, Vec::new())),
        2025,
        ExecutionMode::parallel(2),
    )
    .expect("season");

    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.retried, 0);
    for key in ["home_distance", "away_distance", "home_sprint", "away_sprint"] {
        assert_eq!(batch.records[0].get(key), Some(&FieldValue::Null), "{key}");
    }
}

#[test]
fn browser_lost_on_tracking_tab_is_replaced_before_the_next_match() {
    let script = browser_script(true, Vec::new());
    script.crash_on_click.store(true, Ordering::SeqCst);
    let batch = collect_season(
        &jleague_source(Arc::clone(&script)),
        2025,
        ExecutionMode::Sequential,
    )
    .expect("season");

    assert_eq!(batch.records.len(), 3);
    assert_eq!((batch.retried, batch.dropped), (0, 0));
    assert_eq!(script.sessions.load(Ordering::SeqCst), 2);
    assert_eq!(batch.records[0].get("home_team"), batch.records[1].get("home_team"));
    assert_eq!(batch.records[0].get("home_distance"), Some(&FieldValue::Null));
    assert_eq!(batch.records[1].get("home_distance"), Some(&FieldValue::Float(115.2)));
    assert_eq!(batch.records[2].get("away_sprint"), Some(&FieldValue::Int(38)));
}

#[test]
fn detail_timeout_is_retried_once() {
    let slow = "https://www.jleague.jp/match/j1/2025/031502/live/".to_string();
    let batch = collect_season(
        &jleague_source(browser_script(true, vec![slow])),
        2025,
        ExecutionMode::parallel(3),
    )
    .expect("season");

    assert_eq!(batch.records.len(), 3);
    assert_eq!(batch.retried, 1);
    assert_eq!(batch.dropped, 0);
}

#[test]
fn browser_that_never_starts_fails_enumeration() {
    let source = JLeagueSource::new(
        resolve_jleague("J2").expect("J2"),
        Waits {
            page: Duration::ZERO,
            list: Duration::ZERO,
            tracking: Duration::ZERO,
        },
        || Err::<FakeBrowser, _>(FetchError::SessionError("chromedriver down".into())),
    );
    let err = collect_season(&source, 2025, ExecutionMode::Sequential).unwrap_err();
    assert!(matches!(err, CollectError::Enumeration { year: 2025, .. }));
}
