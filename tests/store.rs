use std::fs;

use match_collector::jleague::JLEAGUE_SCHEMA;
use match_collector::store::{IfExists, open_db, save_csv, save_json, save_sqlite};
use match_collector::MatchRecord;

fn sample(round: i64, distance: Option<f64>) -> MatchRecord {
    let mut record = MatchRecord::with_schema(JLEAGUE_SCHEMA);
    record.set("meet_year", 2025);
    record.set("league_name", "J리그1");
    record.set("round", round);
    record.set("home_team", "浦和レッズ");
    record.set("home_distance", distance);
    record
}

#[test]
fn json_sink_writes_schema_ordered_objects() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = vec![sample(1, Some(115.2)), sample(2, None)];
    let path = save_json(&records, dir.path(), "j1_match_2025").expect("save json");

    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("j1_match_2025.json"));
    let raw = fs::read_to_string(&path).expect("read back");
    let parsed: serde_json::Value = serde_json::from_str(&raw).expect("valid json");
    let rows = parsed.as_array().expect("array");
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["home_distance"], serde_json::json!(115.2));
    assert!(rows[1]["home_distance"].is_null());
    assert!(raw.find("\"meet_year\"") < raw.find("\"league_name\""));
    assert!(!dir.path().join("j1_match_2025.json.tmp").exists());
}

#[test]
fn csv_sink_writes_bom_header_and_empty_nulls() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut first = sample(1, Some(115.2));
    first.set("weather", "晴, 微風");
    let records = vec![first, sample(2, None)];
    let path = save_csv(&records, &dir.path().join("out"), "j1_match_2025").expect("save csv");

    assert_eq!(path.file_name().and_then(|n| n.to_str()), Some("j1_match_2025.csv"));
    let bytes = fs::read(&path).expect("read back");
    assert!(bytes.starts_with(&[0xEF, 0xBB, 0xBF]));
    let text = String::from_utf8(bytes[3..].to_vec()).expect("utf-8");
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0], JLEAGUE_SCHEMA.join(","));
    assert_eq!(
        lines[1],
        "2025,J리그1,1,,,浦和レッズ,,115.2,,,,,\"晴, 微風\",,"
    );
    assert_eq!(lines[2], "2025,J리그1,2,,,浦和レッズ,,,,,,,,,");
    assert!(!dir.path().join("out").join("j1_match_2025.csv.tmp").exists());
}

#[test]
fn mismatched_records_are_refused_by_every_sink() {
    let dir = tempfile::tempdir().expect("tempdir");
    let records = vec![
        sample(1, None),
        MatchRecord::with_schema(&["meet_year", "league_name"]),
    ];
    assert!(save_csv(&records, dir.path(), "mixed").is_err());
    let mut conn = open_db(&dir.path().join("matches.db")).expect("open db");
    assert!(save_sqlite(&mut conn, "mixed", &records, IfExists::Replace).is_err());
}

#[test]
fn sqlite_sink_infers_column_types() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = open_db(&dir.path().join("matches.db")).expect("open db");
    let records = vec![sample(1, None), sample(2, Some(110.0))];
    let rows = save_sqlite(&mut conn, "j1_match_2025", &records, IfExists::Replace).expect("save");
    assert_eq!(rows, 2);

    let kind = |column: &str| -> String {
        conn.query_row(
            "SELECT type FROM pragma_table_info('j1_match_2025') WHERE name = ?1",
            [column],
            |row| row.get(0),
        )
        .expect("column type")
    };
    assert_eq!(kind("round"), "INTEGER");
    assert_eq!(kind("home_distance"), "REAL");
    assert_eq!(kind("home_team"), "TEXT");
    assert_eq!(kind("weather"), "TEXT");

    let distance: Option<f64> = conn
        .query_row(
            "SELECT home_distance FROM j1_match_2025 WHERE round = 2",
            [],
            |row| row.get(0),
        )
        .expect("row");
    assert_eq!(distance, Some(110.0));
}

#[test]
fn sqlite_if_exists_modes() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = open_db(&dir.path().join("nested").join("matches.db")).expect("open db");
    let records = vec![sample(1, None)];
    let count = |conn: &rusqlite::Connection| -> i64 {
        conn.query_row("SELECT COUNT(*) FROM \"j1_match_2025\"", [], |row| row.get(0))
            .expect("count")
    };

    save_sqlite(&mut conn, "j1_match_2025", &records, IfExists::Replace).expect("first");
    save_sqlite(&mut conn, "j1_match_2025", &records, IfExists::Append).expect("append");
    assert_eq!(count(&conn), 2);

    save_sqlite(&mut conn, "j1_match_2025", &records, IfExists::Replace).expect("replace");
    assert_eq!(count(&conn), 1);

    assert!(save_sqlite(&mut conn, "j1_match_2025", &records, IfExists::Fail).is_err());
    assert_eq!(count(&conn), 1);
}

#[test]
fn empty_batch_writes_nothing() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut conn = open_db(&dir.path().join("matches.db")).expect("open db");
    assert_eq!(save_sqlite(&mut conn, "empty", &[], IfExists::Fail).expect("noop"), 0);
    let tables: i64 = conn
        .query_row("SELECT COUNT(*) FROM sqlite_master WHERE type = 'table'", [], |row| {
            row.get(0)
        })
        .expect("count");
    assert_eq!(tables, 0);
}

#[test]
fn db_directory_errors_are_reported() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blocker = dir.path().join("blocker");
    fs::write(&blocker, b"not a directory").expect("write blocker");
    let err = open_db(&blocker.join("nested").join("matches.db")).unwrap_err();
    assert!(format!("{err:#}").contains("create db dir"));
}
