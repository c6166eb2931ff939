use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::HttpConfig;
use crate::error::{CollectError, FetchError};
use crate::extract::{
    extract_value, parse_numeric, parse_points_from_record, parse_rank, parse_slash_kickoff,
    split_matchup, to_snake_case,
};
use crate::http_client::{HttpSession, ReqwestSession, site_client};
use crate::league::{LazySession, LeagueSource};
use crate::record::{FieldValue, MatchRecord};
use crate::task::{CollectionTask, TaskLocator};

pub const KLEAGUE_SITE: &str = "https://www.kleague.com";
pub const MATCH_RECORD_URL: &str = "https://www.kleague.com/api/ddf/match/matchRecord.do";
pub const POSSESSION_URL: &str = "https://www.kleague.com/api/ddf/match/possession.do";
const START_TAB_NUM: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KLeague {
    pub display_name: &'static str,
    pub meet_seq: u32,
    pub slug: &'static str,
    pub alias: &'static str,
}

pub const KLEAGUES: &[KLeague] = &[
    KLeague {
        display_name: "K리그1",
        meet_seq: 1,
        slug: "kleague1",
        alias: "K1",
    },
    KLeague {
        display_name: "K리그2",
        meet_seq: 2,
        slug: "kleague2",
        alias: "K2",
    },
    KLeague {
        display_name: "승강PO",
        meet_seq: 3,
        slug: "kleague_po",
        alias: "KPO",
    },
    KLeague {
        display_name: "슈퍼컵",
        meet_seq: 4,
        slug: "kleague_supercup",
        alias: "KSUPER",
    },
];

pub const FAMILY_SLUG: &str = "kleague";

const MATCH_COUNTS: &[(&str, i32, u32)] = &[
    ("K리그1", 2023, 228),
    ("K리그1", 2024, 228),
    ("K리그1", 2025, 228),
    ("K리그2", 2023, 236),
    ("K리그2", 2024, 236),
    ("K리그2", 2025, 275),
    ("승강PO", 2023, 4),
    ("승강PO", 2024, 4),
    ("승강PO", 2025, 4),
];

/// Statistics API keys, in record order.
pub const BASE_STAT_FIELDS: &[&str] = &[
    "possession",
    "attempts",
    "onTarget",
    "fouls",
    "yellowCards",
    "redCards",
    "doubleYellowCards",
    "corners",
    "freeKicks",
    "offsides",
];

pub const POSSESSION_BUCKETS: &[&str] = &[
    "first_15",
    "first_30",
    "first_45",
    "second_15",
    "second_30",
    "second_45",
];

pub const KLEAGUE_SCHEMA: &[&str] = &[
    "meet_year",
    "league_name",
    "round",
    "game_id",
    "game_datetime",
    "day",
    "home_team",
    "away_team",
    "home_rank",
    "away_rank",
    "home_points",
    "away_points",
    "field_name",
    "audience_qty",
    "weather",
    "temperature",
    "humidity",
    "home_possession",
    "home_attempts",
    "home_on_target",
    "home_fouls",
    "home_yellow_cards",
    "home_red_cards",
    "home_double_yellow_cards",
    "home_corners",
    "home_free_kicks",
    "home_offsides",
    "away_possession",
    "away_attempts",
    "away_on_target",
    "away_fouls",
    "away_yellow_cards",
    "away_red_cards",
    "away_double_yellow_cards",
    "away_corners",
    "away_free_kicks",
    "away_offsides",
    "home_first_15_possession",
    "home_first_30_possession",
    "home_first_45_possession",
    "home_second_15_possession",
    "home_second_30_possession",
    "home_second_45_possession",
    "away_first_15_possession",
    "away_first_30_possession",
    "away_first_45_possession",
    "away_second_15_possession",
    "away_second_30_possession",
    "away_second_45_possession",
];

const SIDES: [&str; 2] = ["home", "away"];

static LEAGUE_SEL: Lazy<Selector> = Lazy::new(|| sel("#meetSeq option[selected]"));
static ROUND_SEL: Lazy<Selector> = Lazy::new(|| sel("#roundId option[selected]"));
static KICKOFF_SEL: Lazy<Selector> = Lazy::new(|| sel("div.versus p"));
static TEAMS_SEL: Lazy<Selector> = Lazy::new(|| sel("#gameId option[selected]"));
static COMPARE_SEL: Lazy<Selector> = Lazy::new(|| sel("#tab03 ul.compare > li"));
static RANK_SEL: Lazy<Selector> = Lazy::new(|| sel("span.font-red"));
static SUB_INFO_SEL: Lazy<Selector> = Lazy::new(|| sel("ul.game-sub-info.sort-box li"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

pub fn resolve_kleague(name: &str) -> Option<&'static KLeague> {
    let name = name.trim();
    KLEAGUES
        .iter()
        .find(|l| l.display_name == name || l.alias.eq_ignore_ascii_case(name))
}

pub fn known_match_count(league: &str, year: i32) -> Option<u32> {
    MATCH_COUNTS
        .iter()
        .find(|(name, y, _)| *name == league && *y == year)
        .map(|(_, _, count)| *count)
}

pub fn match_page_url(year: i32, meet_seq: u32, game_id: u32) -> String {
    format!(
        "{KLEAGUE_SITE}/match.do?year={year}&meetSeq={meet_seq}&gameId={game_id}&leagueId=&startTabNum={START_TAB_NUM}"
    )
}

fn stats_form(year: i32, meet_seq: u32, game_id: u32) -> [(&'static str, String); 3] {
    [
        ("year", year.to_string()),
        ("meetSeq", meet_seq.to_string()),
        ("gameId", game_id.to_string()),
    ]
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

/// Parses the match detail page. Only the matchup line is required; every
/// other missing element leaves its column null.
pub fn parse_match_page(html: &str, year: i32, game_id: u32) -> Result<MatchRecord, FetchError> {
    let doc = Html::parse_document(html);
    let mut record = MatchRecord::with_schema(KLEAGUE_SCHEMA);
    record.set("meet_year", year);
    record.set("game_id", game_id);

    let (home, away) = doc
        .select(&TEAMS_SEL)
        .next()
        .map(text_of)
        .and_then(|text| split_matchup(&text))
        .ok_or_else(|| FetchError::ElementNotFound(format!("matchup for game {game_id}")))?;
    record.set("home_team", home);
    record.set("away_team", away);

    match doc.select(&LEAGUE_SEL).next() {
        Some(el) => {
            record.set("league_name", text_of(el));
        }
        None => warn!(game_id, "league name not found"),
    }

    match doc.select(&ROUND_SEL).next() {
        Some(el) => {
            record.set("round", text_of(el));
        }
        None => warn!(game_id, "round not found"),
    }

    match doc
        .select(&KICKOFF_SEL)
        .next()
        .map(text_of)
        .and_then(|text| parse_slash_kickoff(&text))
    {
        Some(kickoff) => {
            record.set("game_datetime", kickoff.datetime);
            if !kickoff.day.is_empty() {
                record.set("day", kickoff.day);
            }
        }
        None => warn!(game_id, "kickoff not found"),
    }

    if let Some(compare) = doc.select(&COMPARE_SEL).next() {
        let ranks: Vec<String> = compare.select(&RANK_SEL).map(text_of).collect();
        if ranks.len() >= 2 {
            record.set("home_rank", parse_rank(&ranks[0]));
            record.set("away_rank", parse_rank(&ranks[1]));
        }
        let sides: Vec<String> = compare
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|el| el.value().name() == "div")
            .map(text_of)
            .collect();
        if sides.len() >= 2 {
            record.set("home_points", parse_points_from_record(&sides[0]));
            record.set("away_points", parse_points_from_record(&sides[1]));
        }
    }

    for line in doc.select(&SUB_INFO_SEL).map(text_of) {
        if line.contains("관중수") {
            let raw = extract_value(&line, ",");
            record.set("audience_qty", parse_numeric(&raw));
        } else if line.contains("경기장") {
            record.set("field_name", extract_value(&line, ""));
        } else if line.contains("날씨") {
            record.set("weather", extract_value(&line, ""));
        } else if line.contains("온도") {
            record.set("temperature", parse_numeric(&extract_value(&line, "°C")));
        } else if line.contains("습도") {
            record.set("humidity", parse_numeric(&extract_value(&line, "%")));
        } else {
            debug!(game_id, line = %line, "unrecognised sub-info line");
        }
    }

    Ok(record)
}

fn api_data(raw: &str) -> Result<Value, FetchError> {
    let root: Value = serde_json::from_str(raw.trim())
        .map_err(|err| FetchError::NetworkError(format!("invalid statistics json: {err}")))?;
    let code = match root.get("resultCode") {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        _ => String::new(),
    };
    if code != "200" {
        return Err(FetchError::NetworkError(format!(
            "statistics api resultCode {code:?}"
        )));
    }
    match root.get("data") {
        Some(data) if data.is_object() => Ok(data.clone()),
        _ => Err(FetchError::NetworkError(
            "statistics api response without data".to_string(),
        )),
    }
}

fn json_scalar(v: &Value) -> FieldValue {
    match v {
        Value::Number(n) => match n.as_i64() {
            Some(i) => FieldValue::Int(i),
            None => n.as_f64().map(FieldValue::Float).unwrap_or_default(),
        },
        Value::String(s) => parse_numeric(s),
        _ => FieldValue::Null,
    }
}

fn side_object<'a>(data: &'a Value, side: &str) -> Result<&'a Value, FetchError> {
    data.get(side)
        .filter(|team| team.is_object())
        .ok_or_else(|| {
            FetchError::NetworkError(format!("statistics api response without {side}"))
        })
}

/// `matchRecord.do` body -> `home_*`/`away_*` columns. Both side objects are
/// required; missing fields inside one default to 0.
pub fn parse_match_record_json(raw: &str) -> Result<Vec<(String, FieldValue)>, FetchError> {
    let data = api_data(raw)?;
    let mut out = Vec::with_capacity(SIDES.len() * BASE_STAT_FIELDS.len());
    for side in SIDES {
        let team = side_object(&data, side)?;
        for field in BASE_STAT_FIELDS {
            let value = match team.get(*field).map(json_scalar) {
                Some(v) if !v.is_null() => v,
                _ => FieldValue::Int(0),
            };
            out.push((format!("{side}_{}", to_snake_case(field)), value));
        }
    }
    Ok(out)
}

/// `possession.do` body -> `{side}_{bucket}_possession` floats. Empty values count as 0.
pub fn parse_possession_json(raw: &str) -> Result<Vec<(String, FieldValue)>, FetchError> {
    let data = api_data(raw)?;
    let mut out = Vec::with_capacity(SIDES.len() * POSSESSION_BUCKETS.len());
    for side in SIDES {
        let team = data.get(side).unwrap_or(&Value::Null);
        for bucket in POSSESSION_BUCKETS {
            let value = match team.get(*bucket) {
                None | Some(Value::Null) => 0.0,
                Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
                Some(Value::String(s)) if s.trim().is_empty() => 0.0,
                Some(Value::String(s)) => s.trim().parse::<f64>().map_err(|_| {
                    FetchError::NetworkError(format!("{side} {bucket} possession {s:?}"))
                })?,
                Some(other) => {
                    return Err(FetchError::NetworkError(format!(
                        "{side} {bucket} possession {other}"
                    )));
                }
            };
            out.push((format!("{side}_{bucket}_possession"), FieldValue::Float(value)));
        }
    }
    Ok(out)
}

fn apply(record: &mut MatchRecord, columns: Vec<(String, FieldValue)>) {
    for (key, value) in columns {
        if !record.set(&key, value) {
            debug!(key = %key, "statistics column outside schema");
        }
    }
}

/// HTML page + statistics API source for one K League competition.
pub struct KLeagueSource<F> {
    league: &'static KLeague,
    connect: F,
}

impl<F> KLeagueSource<F> {
    pub fn new(league: &'static KLeague, connect: F) -> Self {
        Self { league, connect }
    }

    pub fn league(&self) -> &'static KLeague {
        self.league
    }
}

pub fn live_source(
    league: &'static KLeague,
    config: HttpConfig,
) -> KLeagueSource<impl Fn() -> Result<ReqwestSession, FetchError> + Sync> {
    KLeagueSource::new(league, move || {
        site_client(&config, &format!("{KLEAGUE_SITE}/match.do"), KLEAGUE_SITE)
            .map(ReqwestSession::new)
            .map_err(|err| FetchError::NetworkError(format!("{err:#}")))
    })
}

impl<F, S> LeagueSource for KLeagueSource<F>
where
    F: Fn() -> Result<S, FetchError> + Sync,
    S: HttpSession,
{
    type Session = S;

    fn display_name(&self) -> &str {
        self.league.display_name
    }

    fn open_session(&self) -> Result<S, FetchError> {
        (self.connect)()
    }

    fn enumerate(
        &self,
        year: i32,
        _session: &mut LazySession<'_, Self>,
    ) -> Result<Vec<CollectionTask>, CollectError> {
        let total = known_match_count(self.league.display_name, year).ok_or_else(|| {
            CollectError::UnsupportedSeason {
                league: self.league.display_name.to_string(),
                year,
            }
        })?;
        Ok((1..=total)
            .enumerate()
            .map(|(position, id)| {
                CollectionTask::new(
                    position,
                    TaskLocator::Sequential(id),
                    year,
                    self.league.display_name,
                )
            })
            .collect())
    }

    fn fetch(&self, session: &mut S, task: &CollectionTask) -> Result<MatchRecord, FetchError> {
        let TaskLocator::Sequential(game_id) = task.locator else {
            return Err(FetchError::ElementNotFound(format!(
                "sequential game id in task {task}"
            )));
        };
        let meet_seq = self.league.meet_seq;

        let html = session.get_text(&match_page_url(task.year, meet_seq, game_id))?;
        let mut record = parse_match_page(&html, task.year, game_id)?;
        if record.get("league_name").is_none_or(FieldValue::is_null) {
            record.set("league_name", task.league.as_str());
        }

        let form = stats_form(task.year, meet_seq, game_id);
        let base = session
            .post_form(MATCH_RECORD_URL, &form)
            .and_then(|body| parse_match_record_json(&body));
        match base {
            Ok(columns) => {
                apply(&mut record, columns);
                let possession = session
                    .post_form(POSSESSION_URL, &form)
                    .and_then(|body| parse_possession_json(&body));
                match possession {
                    Ok(columns) => apply(&mut record, columns),
                    Err(err) => {
                        warn!(task = %task, error = %err, "possession splits unavailable")
                    }
                }
            }
            Err(err) => warn!(task = %task, error = %err, "match statistics unavailable"),
        }

        Ok(record)
    }
}
