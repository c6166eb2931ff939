use std::time::Duration;

use once_cell::sync::Lazy;
use scraper::{ElementRef, Html, Selector};
use tracing::{debug, info, warn};

use crate::browser::{BrowserSession, WebDriverSession};
use crate::config::BrowserConfig;
use crate::error::{CollectError, FetchError};
use crate::extract::{
    clean_attendance, parse_japanese_kickoff, parse_numeric, parse_round_number,
    parse_weather_info, strip_unit,
};
use crate::league::{LazySession, LeagueSource};
use crate::record::MatchRecord;
use crate::task::{CollectionTask, TaskLocator};

pub const JLEAGUE_SITE: &str = "https://www.jleague.jp";
pub const FAMILY_SLUG: &str = "jleague";

const LIST_READY: &str = "section.matchlistWrap";
const DETAIL_READY: &str = ".liveTopTable";
const TRACKING_TAB: &str = "a[href*='#trackingdata']";
const TRACKING_READY: &str = ".total_km";
const STADIUM_LABEL: &str = "スタジアム";
const ATTENDANCE_LABEL: &str = "入場者数";
const WEATHER_LABEL: &str = "天候/気温/湿度";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JLeague {
    pub display_name: &'static str,
    /// `category[]` value of the match search page; doubles as the file slug.
    pub category: &'static str,
    pub alias: &'static str,
}

pub const JLEAGUES: &[JLeague] = &[
    JLeague {
        display_name: "J리그1",
        category: "j1",
        alias: "J1",
    },
    JLeague {
        display_name: "J리그2",
        category: "j2",
        alias: "J2",
    },
    JLeague {
        display_name: "J리그3",
        category: "j3",
        alias: "J3",
    },
    JLeague {
        display_name: "J리그1PO",
        category: "playoff",
        alias: "J1PO",
    },
    JLeague {
        display_name: "J리그2PO",
        category: "2playoff",
        alias: "J2PO",
    },
];

pub const JLEAGUE_SCHEMA: &[&str] = &[
    "meet_year",
    "league_name",
    "round",
    "game_datetime",
    "day",
    "home_team",
    "away_team",
    "home_distance",
    "away_distance",
    "home_sprint",
    "away_sprint",
    "audience_qty",
    "weather",
    "temperature",
    "humidity",
];

static MATCH_LINK_SEL: Lazy<Selector> =
    Lazy::new(|| sel("section.matchlistWrap td.match a[href*='/live/']"));
static TABLE_SEL: Lazy<Selector> = Lazy::new(|| sel("table"));
static TD_SEL: Lazy<Selector> = Lazy::new(|| sel("td"));
static ROUND_SEL: Lazy<Selector> = Lazy::new(|| sel(".matchVsTitle__league"));
static DATE_SEL: Lazy<Selector> = Lazy::new(|| sel(".matchVsTitle__date"));
static CLUB_SEL: Lazy<Selector> = Lazy::new(|| sel(".leagAccTeam__clubName"));
static SPAN_SEL: Lazy<Selector> = Lazy::new(|| sel("span"));
static TOTAL_KM_SEL: Lazy<Selector> = Lazy::new(|| sel(".total_km"));

fn sel(css: &str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn text_of(el: ElementRef<'_>) -> String {
    el.text().collect::<String>().trim().to_string()
}

pub fn resolve_jleague(name: &str) -> Option<&'static JLeague> {
    let name = name.trim();
    JLEAGUES
        .iter()
        .find(|l| l.display_name == name || l.alias.eq_ignore_ascii_case(name))
}

pub fn month_list_url(category: &str, year: i32, month: u32) -> String {
    format!("{JLEAGUE_SITE}/match/search/?category[]={category}&year={year}&month={month}")
}

fn absolute_url(href: &str) -> String {
    if href.starts_with("http://") || href.starts_with("https://") {
        href.to_string()
    } else if href.starts_with('/') {
        format!("{JLEAGUE_SITE}{href}")
    } else {
        format!("{JLEAGUE_SITE}/{href}")
    }
}

/// Detail-page URLs of one monthly list page, in page order.
pub fn parse_match_list(html: &str) -> Vec<String> {
    let doc = Html::parse_document(html);
    doc.select(&MATCH_LINK_SEL)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| !href.is_empty())
        .map(absolute_url)
        .collect()
}

/// Base fields of a live page. Fails only when the stadium table is missing.
pub fn parse_match_detail(html: &str, year: i32, league: &str) -> Result<MatchRecord, FetchError> {
    let doc = Html::parse_document(html);
    let table = doc
        .select(&TABLE_SEL)
        .find(|t| t.select(&TD_SEL).any(|td| text_of(td).contains(STADIUM_LABEL)))
        .ok_or_else(|| FetchError::ElementNotFound("stadium table".to_string()))?;

    let mut record = MatchRecord::with_schema(JLEAGUE_SCHEMA);
    record.set("meet_year", year);
    record.set("league_name", league);

    let cells: Vec<String> = table.select(&TD_SEL).map(text_of).collect();
    for pair in cells.chunks_exact(2) {
        let label: String = pair[0].split_whitespace().collect();
        let value = &pair[1];
        if label == ATTENDANCE_LABEL {
            record.set("audience_qty", clean_attendance(value));
        } else if label == WEATHER_LABEL {
            match parse_weather_info(value) {
                Some(info) => {
                    record.set("weather", info.weather);
                    record.set("temperature", parse_numeric(&info.temperature));
                    record.set("humidity", parse_numeric(&info.humidity));
                }
                None => debug!(value = %value, "weather cell not in weather/temp/humidity form"),
            }
        }
    }

    let round = doc
        .select(&ROUND_SEL)
        .next()
        .and_then(|el| parse_round_number(&text_of(el)));
    record.set("round", round);

    if let Some(kickoff) = doc
        .select(&DATE_SEL)
        .next()
        .and_then(|el| parse_japanese_kickoff(&text_of(el)))
    {
        record.set("game_datetime", kickoff.datetime);
        record.set("day", kickoff.day);
    }

    let teams: Vec<String> = doc
        .select(&CLUB_SEL)
        .take(2)
        .filter_map(|club| club.select(&SPAN_SEL).next().map(text_of))
        .collect();
    if let [home, away] = teams.as_slice() {
        record.set("home_team", home.as_str());
        record.set("away_team", away.as_str());
    } else {
        warn!(league, year, "club names not found");
    }

    Ok(record)
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackingStats {
    pub home_distance: Option<f64>,
    pub away_distance: Option<f64>,
    pub home_sprint: Option<i64>,
    pub away_sprint: Option<i64>,
}

/// Reads the `.total_km` cells of an activated tracking tab.
pub fn parse_tracking(html: &str) -> TrackingStats {
    let doc = Html::parse_document(html);
    let cells: Vec<String> = doc.select(&TOTAL_KM_SEL).map(text_of).collect();
    let distance = |cell: &String| strip_unit(cell, "km").parse::<f64>().ok();
    let sprint = |cell: &String| strip_unit(cell, "回").parse::<i64>().ok();

    match cells.as_slice() {
        [home_d, away_d, home_s, away_s, ..] => TrackingStats {
            home_distance: distance(home_d),
            away_distance: distance(away_d),
            home_sprint: sprint(home_s),
            away_sprint: sprint(away_s),
        },
        [home_d, away_d] | [home_d, away_d, _] => {
            debug!("sprint counts missing, distances only");
            TrackingStats {
                home_distance: distance(home_d),
                away_distance: distance(away_d),
                ..TrackingStats::default()
            }
        }
        _ => TrackingStats::default(),
    }
}

fn apply_tracking(record: &mut MatchRecord, stats: TrackingStats) {
    record.set("home_distance", stats.home_distance);
    record.set("away_distance", stats.away_distance);
    record.set("home_sprint", stats.home_sprint);
    record.set("away_sprint", stats.away_sprint);
}

#[derive(Debug, Clone, Copy)]
pub struct Waits {
    pub page: Duration,
    pub list: Duration,
    pub tracking: Duration,
}

impl From<&BrowserConfig> for Waits {
    fn from(config: &BrowserConfig) -> Self {
        Self {
            page: config.page_wait,
            list: config.list_wait,
            tracking: config.tracking_wait,
        }
    }
}

/// Browser-driven source for one J League competition.
pub struct JLeagueSource<F> {
    league: &'static JLeague,
    waits: Waits,
    connect: F,
}

impl<F> JLeagueSource<F> {
    pub fn new(league: &'static JLeague, waits: Waits, connect: F) -> Self {
        Self {
            league,
            waits,
            connect,
        }
    }

    pub fn league(&self) -> &'static JLeague {
        self.league
    }
}

pub fn live_source(
    league: &'static JLeague,
    config: BrowserConfig,
    user_agent: String,
) -> JLeagueSource<impl Fn() -> Result<WebDriverSession, FetchError> + Sync> {
    let waits = Waits::from(&config);
    JLeagueSource::new(league, waits, move || {
        WebDriverSession::start(&config, &user_agent)
    })
}

fn list_month<B: BrowserSession>(
    browser: &mut B,
    url: &str,
    wait: Duration,
) -> Result<Vec<String>, FetchError> {
    browser.navigate(url)?;
    if !browser.wait_for(LIST_READY, wait)? {
        return Err(FetchError::PageLoadTimeout(url.to_string()));
    }
    Ok(parse_match_list(&browser.page_source()?))
}

fn tracking_page<B: BrowserSession>(
    browser: &mut B,
    wait: Duration,
) -> Result<Option<String>, FetchError> {
    if !browser.click(TRACKING_TAB)? {
        return Ok(None);
    }
    if !browser.wait_for(TRACKING_READY, wait)? {
        return Ok(None);
    }
    browser.page_source().map(Some)
}

impl<F, B> LeagueSource for JLeagueSource<F>
where
    F: Fn() -> Result<B, FetchError> + Sync,
    B: BrowserSession,
{
    type Session = B;

    fn display_name(&self) -> &str {
        self.league.display_name
    }

    fn open_session(&self) -> Result<B, FetchError> {
        (self.connect)()
    }

    fn enumerate(
        &self,
        year: i32,
        session: &mut LazySession<'_, Self>,
    ) -> Result<Vec<CollectionTask>, CollectError> {
        let mut urls = Vec::new();
        for month in 1..=12 {
            let browser = session.get().map_err(|source| CollectError::Enumeration {
                league: self.league.display_name.to_string(),
                year,
                source,
            })?;
            let url = month_list_url(self.league.category, year, month);
            match list_month(browser, &url, self.waits.list) {
                Ok(found) => {
                    debug!(league = self.league.display_name, year, month, matches = found.len(), "month listed");
                    urls.extend(found);
                }
                Err(err) => {
                    if matches!(err, FetchError::SessionError(_)) {
                        session.close();
                    }
                    warn!(league = self.league.display_name, year, month, error = %err, "month list unavailable");
                }
            }
        }
        info!(league = self.league.display_name, year, matches = urls.len(), "season listed");

        Ok(urls
            .into_iter()
            .enumerate()
            .map(|(position, url)| {
                CollectionTask::new(position, TaskLocator::Url(url), year, self.league.display_name)
            })
            .collect())
    }

    fn fetch(&self, browser: &mut B, task: &CollectionTask) -> Result<MatchRecord, FetchError> {
        let TaskLocator::Url(url) = &task.locator else {
            return Err(FetchError::ElementNotFound(format!(
                "detail url in task {task}"
            )));
        };

        browser.navigate(url)?;
        if !browser.wait_for(DETAIL_READY, self.waits.page)? {
            return Err(FetchError::PageLoadTimeout(url.clone()));
        }
        let mut record = parse_match_detail(&browser.page_source()?, task.year, &task.league)?;

        match tracking_page(browser, self.waits.tracking) {
            Ok(Some(html)) => apply_tracking(&mut record, parse_tracking(&html)),
            Ok(None) => debug!(task = %task, "tracking data not available"),
            Err(err) => warn!(task = %task, error = %err, "tracking tab failed"),
        }
        Ok(record)
    }

    fn session_alive(&self, browser: &B) -> bool {
        browser.is_alive()
    }
}
