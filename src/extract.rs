use chrono::{NaiveDate, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::record::FieldValue;

static RECORD_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)승\s*(\d+)무\s*(\d+)패").expect("record pattern"));
static ROUND_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r"第(\d+)節").expect("round pattern"));
static JP_DATETIME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(\d{4})[年/.-](\d{1,2})[月/.-](\d{1,2})日?\s*[(（]?([月火水木金土日])[)）]?.*?(\d{1,2}):(\d{2})",
    )
    .expect("datetime pattern")
});
static CAMEL_WORD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(.)([A-Z][a-z]+)").expect("camel word pattern"));
static CAMEL_BOUNDARY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([a-z0-9])([A-Z])").expect("camel boundary pattern"));

// Whole-string entries first; compound forms stay untranslated unless listed.
const WEATHER_TRANSLATION: &[(&str, &str)] = &[
    ("晴", "맑음"),
    ("曇", "흐림"),
    ("雨", "비"),
    ("雪", "눈"),
    ("晴のち曇", "맑음 후 흐림"),
    ("曇のち晴", "흐림 후 맑음"),
    ("曇のち雨", "흐림 후 비"),
    ("雨のち曇", "비 후 흐림"),
    ("晴時々曇", "맑음 때때로 흐림"),
    ("曇時々晴", "흐림 때때로 맑음"),
    ("曇時々雨", "흐림 때때로 비"),
    ("屋内", "실내"),
];

const DAY_TRANSLATION: &[(&str, &str)] = &[
    ("月", "월"),
    ("火", "화"),
    ("水", "수"),
    ("木", "목"),
    ("金", "금"),
    ("土", "토"),
    ("日", "일"),
];

/// Value part of a `"label : value"` line with `remove` stripped and whitespace trimmed.
///
/// Only the text after the last `:` is kept.
pub fn extract_value(text: &str, remove: &str) -> String {
    let value = text.rsplit(':').next().unwrap_or(text);
    let value = if remove.is_empty() {
        value.to_string()
    } else {
        value.replace(remove, "")
    };
    value.trim().to_string()
}

/// `yellowCards` -> `yellow_cards`, `doubleYellowCards` -> `double_yellow_cards`.
pub fn to_snake_case(name: &str) -> String {
    let words = CAMEL_WORD.replace_all(name, "${1}_${2}");
    CAMEL_BOUNDARY
        .replace_all(&words, "${1}_${2}")
        .to_lowercase()
}

/// Translated weather token, or the input unchanged when no entry exists.
pub fn translate_weather(raw: &str) -> String {
    lookup(WEATHER_TRANSLATION, raw.trim())
}

/// Translated weekday token, or the input unchanged when no entry exists.
pub fn translate_day(raw: &str) -> String {
    lookup(DAY_TRANSLATION, raw.trim())
}

fn lookup(table: &[(&str, &str)], token: &str) -> String {
    table
        .iter()
        .find(|(from, _)| *from == token)
        .map(|(_, to)| (*to).to_string())
        .unwrap_or_else(|| token.to_string())
}

/// Points from a `W승 D무 L패` record, `None` when the pattern is absent.
pub fn parse_points_from_record(text: &str) -> Option<u32> {
    let caps = RECORD_PATTERN.captures(text)?;
    let win = caps.get(1)?.as_str().parse::<u32>().ok()?;
    let draw = caps.get(2)?.as_str().parse::<u32>().ok()?;
    Some(win.saturating_mul(3).saturating_add(draw))
}

/// Same as [`parse_points_from_record`] but `0` when the pattern is absent.
pub fn calculate_points_from_record(text: &str) -> u32 {
    parse_points_from_record(text).unwrap_or(0)
}

/// `"3위"` -> 3.
pub fn parse_rank(text: &str) -> Option<u32> {
    let digits = text.replace('위', "");
    let digits = digits.trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// `"10,000人"` -> 10000.
pub fn clean_attendance(raw: &str) -> Option<i64> {
    let digits = raw.replace([',', '人'], "");
    let digits = digits.trim();
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    digits.parse().ok()
}

/// Integer, then float, then the raw text; empty input is null.
pub fn parse_numeric(raw: &str) -> FieldValue {
    let trimmed = raw.trim();
    if trimmed.is_empty() || trimmed == "-" {
        return FieldValue::Null;
    }
    if let Ok(v) = trimmed.parse::<i64>() {
        return FieldValue::Int(v);
    }
    if let Ok(v) = trimmed.parse::<f64>() {
        return FieldValue::Float(v);
    }
    FieldValue::Text(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeatherInfo {
    pub weather: String,
    pub temperature: String,
    pub humidity: String,
}

/// `"晴 / 25℃ / 60%"` -> weather (translated), temperature, humidity.
pub fn parse_weather_info(raw: &str) -> Option<WeatherInfo> {
    let parts: Vec<&str> = raw.split('/').collect();
    if parts.len() < 3 {
        return None;
    }
    Some(WeatherInfo {
        weather: translate_weather(parts[0]),
        temperature: parts[1].replace('℃', "").trim().to_string(),
        humidity: parts[2].replace('%', "").trim().to_string(),
    })
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kickoff {
    /// `YYYY-MM-DD HH:MM:SS`
    pub datetime: String,
    pub day: String,
}

/// `"2025/03/01 (토) 14:00"` as printed on the K League match page.
pub fn parse_slash_kickoff(raw: &str) -> Option<Kickoff> {
    let parts: Vec<&str> = raw.split_whitespace().collect();
    if parts.len() < 2 {
        return None;
    }
    let date = NaiveDate::parse_from_str(parts[0], "%Y/%m/%d").ok()?;
    let time = NaiveTime::parse_from_str(parts[parts.len() - 1], "%H:%M").ok()?;
    let day = if parts.len() >= 3 {
        parts[1].trim_matches(|c| c == '(' || c == ')').to_string()
    } else {
        String::new()
    };
    Some(Kickoff {
        datetime: date.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string(),
        day,
    })
}

/// `"2025年3月15日(土) 14:00"` and its `/`, `.`, `-` separated variants; the
/// weekday is translated.
pub fn parse_japanese_kickoff(raw: &str) -> Option<Kickoff> {
    let caps = JP_DATETIME_PATTERN.captures(raw)?;
    let num = |idx: usize| caps.get(idx).and_then(|m| m.as_str().parse::<u32>().ok());
    let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
    let date = NaiveDate::from_ymd_opt(year, num(2)?, num(3)?)?;
    let time = NaiveTime::from_hms_opt(num(5)?, num(6)?, 0)?;
    Some(Kickoff {
        datetime: date.and_time(time).format("%Y-%m-%d %H:%M:%S").to_string(),
        day: translate_day(caps.get(4)?.as_str()),
    })
}

/// `"明治安田J1リーグ 第10節"` -> 10.
pub fn parse_round_number(text: &str) -> Option<i64> {
    ROUND_PATTERN
        .captures(text)?
        .get(1)?
        .as_str()
        .parse()
        .ok()
}

/// `"울산vs포항 (14:00)"` -> ("울산", "포항").
pub fn split_matchup(text: &str) -> Option<(String, String)> {
    let teams = text.split(['(', ' ']).next()?.trim();
    let (home, away) = teams.split_once("vs")?;
    let (home, away) = (home.trim(), away.trim());
    if home.is_empty() || away.is_empty() {
        return None;
    }
    Some((home.to_string(), away.to_string()))
}

/// Strips a trailing unit (`km`, `回`) from a tracking cell.
pub fn strip_unit(text: &str, unit: &str) -> String {
    text.to_lowercase().replace(unit, "").trim().to_string()
}
