use std::borrow::Cow;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use rusqlite::types::{ToSql, ToSqlOutput, Value as SqlValue, ValueRef};
use rusqlite::{Connection, params, params_from_iter};
use tracing::{info, warn};

use crate::record::{FieldValue, MatchRecord};

/// What to do when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IfExists {
    #[default]
    Replace,
    Append,
    Fail,
}

impl ToSql for FieldValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            FieldValue::Null => ToSqlOutput::Owned(SqlValue::Null),
            FieldValue::Int(v) => ToSqlOutput::Owned(SqlValue::Integer(*v)),
            FieldValue::Float(v) => ToSqlOutput::Owned(SqlValue::Real(*v)),
            FieldValue::Text(v) => ToSqlOutput::Borrowed(ValueRef::Text(v.as_bytes())),
        })
    }
}

/// Writes `{dir}/{file_name}.json` through a temporary file.
pub fn save_json(records: &[MatchRecord], dir: &Path, file_name: &str) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
    let path = dir.join(format!("{file_name}.json"));
    let json = serde_json::to_string_pretty(records).context("serialize match records")?;
    let tmp = path.with_extension("json.tmp");
    fs::write(&tmp, json).with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("rename {}", tmp.display()))?;
    info!(path = %path.display(), records = records.len(), "json written");
    Ok(path)
}

fn needs_quotes(cell: &str) -> bool {
    cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r')
}

fn write_csv_row<'a, W: Write>(
    mut w: W,
    cells: impl Iterator<Item = Cow<'a, str>>,
) -> std::io::Result<()> {
    for (i, cell) in cells.enumerate() {
        if i > 0 {
            w.write_all(b",")?;
        }
        if needs_quotes(&cell) {
            write!(w, "\"{}\"", cell.replace('"', "\"\""))?;
        } else {
            w.write_all(cell.as_bytes())?;
        }
    }
    w.write_all(b"\n")
}

fn write_csv<W: Write>(
    mut out: W,
    columns: &[&'static str],
    records: &[MatchRecord],
) -> std::io::Result<()> {
    out.write_all("\u{feff}".as_bytes())?;
    if !columns.is_empty() {
        write_csv_row(&mut out, columns.iter().map(|c| Cow::Borrowed(*c)))?;
    }
    for record in records {
        write_csv_row(&mut out, record.iter().map(|(_, v)| Cow::Owned(v.to_string())))?;
    }
    out.flush()
}

/// Writes `{dir}/{file_name}.csv`: UTF-8 with a byte-order mark, header in
/// schema order, null as an empty cell.
pub fn save_csv(records: &[MatchRecord], dir: &Path, file_name: &str) -> Result<PathBuf> {
    let columns = shared_columns(records)?;
    fs::create_dir_all(dir).with_context(|| format!("create output dir {}", dir.display()))?;
    let path = dir.join(format!("{file_name}.csv"));
    let tmp = path.with_extension("csv.tmp");

    let file = File::create(&tmp).with_context(|| format!("create {}", tmp.display()))?;
    write_csv(BufWriter::new(file), &columns, records)
        .with_context(|| format!("write {}", tmp.display()))?;
    fs::rename(&tmp, &path).with_context(|| format!("rename {}", tmp.display()))?;
    info!(path = %path.display(), records = records.len(), "csv written");
    Ok(path)
}

/// Column set shared by every record; empty for an empty batch.
fn shared_columns(records: &[MatchRecord]) -> Result<Vec<&'static str>> {
    let Some(first) = records.first() else {
        return Ok(Vec::new());
    };
    let columns: Vec<&'static str> = first.keys().collect();
    if let Some(odd) = records.iter().find(|r| !r.keys().eq(columns.iter().copied())) {
        bail!(
            "records do not share one column set (got {} columns, expected {})",
            odd.len(),
            columns.len()
        );
    }
    Ok(columns)
}

pub fn open_db(path: &Path) -> Result<Connection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("create db dir {}", parent.display()))?;
    }
    Connection::open(path).with_context(|| format!("open sqlite db {}", path.display()))
}

/// Column affinity from the values seen in a column; integers widen to REAL
/// when floats appear, anything else (or all-null) is TEXT.
pub fn infer_column_type<'a>(values: impl Iterator<Item = &'a FieldValue>) -> &'static str {
    let mut seen_int = false;
    let mut seen_float = false;
    for value in values {
        match value {
            FieldValue::Null => {}
            FieldValue::Int(_) => seen_int = true,
            FieldValue::Float(_) => seen_float = true,
            FieldValue::Text(_) => return "TEXT",
        }
    }
    match (seen_int, seen_float) {
        (_, true) => "REAL",
        (true, false) => "INTEGER",
        (false, false) => "TEXT",
    }
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type = 'table' AND name = ?1",
            params![table],
            |row| row.get(0),
        )
        .context("look up table")?;
    Ok(count > 0)
}

/// Writes `records` into `table`. Returns the number of rows inserted.
pub fn save_sqlite(
    conn: &mut Connection,
    table: &str,
    records: &[MatchRecord],
    if_exists: IfExists,
) -> Result<usize> {
    if records.is_empty() {
        warn!(table, "no records to store");
        return Ok(0);
    }
    let columns = shared_columns(records)?;

    let quoted = quote_ident(table);
    let exists = table_exists(conn, table)?;
    let tx = conn.transaction().context("begin store transaction")?;
    match (if_exists, exists) {
        (IfExists::Fail, true) => bail!("table {table} already exists"),
        (IfExists::Replace, true) => {
            tx.execute_batch(&format!("DROP TABLE {quoted};"))
                .context("drop existing table")?;
        }
        _ => {}
    }

    let definitions = columns
        .iter()
        .map(|column| {
            let kind = infer_column_type(records.iter().filter_map(|r| r.get(column)));
            format!("{} {kind}", quote_ident(column))
        })
        .collect::<Vec<_>>()
        .join(", ");
    tx.execute_batch(&format!(
        "CREATE TABLE IF NOT EXISTS {quoted} ({definitions});"
    ))
    .context("create match table")?;

    let column_list = columns
        .iter()
        .map(|c| quote_ident(c))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    {
        let mut stmt = tx
            .prepare(&format!(
                "INSERT INTO {quoted} ({column_list}) VALUES ({placeholders})"
            ))
            .context("prepare insert")?;
        for record in records {
            stmt.execute(params_from_iter(record.iter().map(|(_, v)| v)))
                .context("insert match row")?;
        }
    }
    tx.commit().context("commit store transaction")?;

    info!(table, rows = records.len(), ?if_exists, "sqlite table written");
    Ok(records.len())
}
