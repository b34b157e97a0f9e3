//! Merge all persisted period files into one chronological, year-normalized
//! dataset per format (`all.csv` / `all.tsv`).
//!
//! Period files store rows newest-first, dates as bare `MM/DD` with a
//! weekday annotation, and more columns than the ledger keeps. Consolidation
//! reverses each period, resolves the year from the file's start-date key,
//! and projects through the column schema.

use std::fs;

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, info};

use crate::schema;
use crate::storage::{self, DataDirs};
use crate::table::TableFormat;

pub struct ConsolidateStats {
    pub csv_periods: usize,
    pub csv_records: usize,
    pub tsv_periods: usize,
    pub tsv_records: usize,
}

/// Rebuild both consolidated datasets from scratch out of whatever period
/// files are on disk.
pub fn consolidate(dirs: &DataDirs) -> Result<ConsolidateStats> {
    let (csv_periods, csv_records) = merge(dirs, TableFormat::Csv)?;
    let (tsv_periods, tsv_records) = merge(dirs, TableFormat::Tsv)?;
    Ok(ConsolidateStats {
        csv_periods,
        csv_records,
        tsv_periods,
        tsv_records,
    })
}

fn merge(dirs: &DataDirs, format: TableFormat) -> Result<(usize, usize)> {
    let files = dirs.list_periods(format)?;

    let pb = ProgressBar::new(files.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg}")?
            .progress_chars("=> "),
    );

    let mut blocks: Vec<String> = Vec::new();
    let mut records = 0usize;
    for path in &files {
        pb.set_message(format!("{}", path.display()));
        // Listing already filtered to the artifact naming convention.
        let Some(start_key) = storage::period_start_key(path) else {
            pb.inc(1);
            continue;
        };
        let body = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let lines = period_block(&body, &start_key, format);
        if lines.is_empty() {
            debug!("No records in {}", path.display());
            pb.inc(1);
            continue;
        }
        records += lines.len();
        blocks.push(lines.join("\n"));
        pb.inc(1);
    }
    pb.finish_and_clear();

    let out = format!(
        "{}\n{}",
        schema::header_row(format.separator()),
        blocks.join("\n")
    );
    let dest = dirs.consolidated_path(format);
    fs::write(&dest, out).with_context(|| format!("Failed to write {}", dest.display()))?;
    info!(
        "Wrote {} ({} period files, {} records)",
        dest.display(),
        files.len(),
        records
    );
    Ok((files.len(), records))
}

/// Normalized record lines for one period file, oldest-first (the source
/// rows are newest-first). The first line is the captured table header and
/// is dropped.
fn period_block(body: &str, start_key: &str, format: TableFormat) -> Vec<String> {
    let mut records: Vec<String> = body
        .lines()
        .skip(1)
        .filter(|line| !line.is_empty())
        .map(|line| {
            let fields = match format {
                TableFormat::Csv => parse_csv_line(line),
                TableFormat::Tsv => line.split('\t').map(str::to_string).collect(),
            };
            let fields = normalize_date(schema::project(&fields), start_key);
            join_fields(&fields, format)
        })
        .collect();
    records.reverse();
    records
}

/// Rewrite the leading date field from `MM/DD(weekday)` to an unambiguous
/// `YYYY/MM/DD`, resolving the year against the period's start-date key.
fn normalize_date(mut fields: Vec<String>, start_key: &str) -> Vec<String> {
    if !fields.is_empty() {
        let bare = fields[0].split('(').next().unwrap_or("").trim().to_string();
        let year = schema::resolve_year(start_key, &bare);
        let (month, day) = bare.split_once('/').unwrap_or((bare.as_str(), ""));
        fields[0] = format!("{}/{}/{}", year, month, day);
    }
    fields
}

fn join_fields(fields: &[String], format: TableFormat) -> String {
    match format {
        TableFormat::Csv => fields
            .iter()
            .map(|f| format!("\"{}\"", f))
            .collect::<Vec<_>>()
            .join(","),
        TableFormat::Tsv => fields.join("\t"),
    }
}

/// Split one CSV line into unquoted fields. Handles empty quoted fields and
/// doubled-quote escapes; an unquoted field is taken verbatim. This is the
/// inverse of the serializer for everything the serializer can itself
/// round-trip (embedded quotes are not re-escaped on output).
pub fn parse_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut field = String::new();
    let mut in_quotes = false;
    let mut quoted = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes => {
                if chars.peek() == Some(&'"') {
                    chars.next();
                    field.push('"');
                } else {
                    in_quotes = false;
                }
            }
            '"' if !quoted && field.is_empty() => {
                in_quotes = true;
                quoted = true;
            }
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut field));
                quoted = false;
            }
            _ => field.push(c),
        }
    }
    fields.push(field);
    fields
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Extract;

    #[test]
    fn csv_line_parsing() {
        assert_eq!(parse_csv_line(r#""a","b","c""#), vec!["a", "b", "c"]);
        assert_eq!(parse_csv_line(r#""","""#), vec!["", ""]);
        assert_eq!(parse_csv_line(r#""a""b""#), vec![r#"a"b"#]);
        assert_eq!(parse_csv_line("a,b"), vec!["a", "b"]);
        assert_eq!(parse_csv_line(r#""12/25(金)","coffee, large""#), vec![
            "12/25(金)",
            "coffee, large"
        ]);
    }

    #[test]
    fn csv_round_trips_serializer_output() {
        let cells = vec![
            "".to_string(),
            "12/25(金)".to_string(),
            "coffee, large".to_string(),
            "-480".to_string(),
        ];
        let line_set = Extract::from_cells(vec![cells.clone()]).to_csv();
        let line = line_set.lines().next().unwrap();
        assert_eq!(parse_csv_line(line), cells);
    }

    fn period_rows(dates: &[&str], memo: &str) -> Vec<Vec<String>> {
        // 8-column layout matching the live table: the schema carries
        // indices 1, 2, 3, 4 and 7.
        let mut rows = vec![(0..8).map(|i| format!("h{}", i)).collect::<Vec<_>>()];
        for (n, date) in dates.iter().enumerate() {
            rows.push(vec![
                "".into(),
                (*date).into(),
                format!("item{}", n),
                format!("-{}00", n + 1),
                "Bank".into(),
                "".into(),
                "".into(),
                memo.into(),
            ]);
        }
        rows
    }

    fn write_period(dirs: &crate::storage::DataDirs, stem: &str, rows: Vec<Vec<String>>) {
        let extract = Extract::from_cells(rows);
        std::fs::write(dirs.table_path(TableFormat::Csv, stem), extract.to_csv()).unwrap();
        std::fs::write(dirs.table_path(TableFormat::Tsv, stem), extract.to_tsv()).unwrap();
    }

    #[test]
    fn consolidation_end_to_end() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = crate::storage::DataDirs::new(tmp.path());
        dirs.ensure().unwrap();

        // Two periods, written newer-first to prove the output is sorted by
        // start key. Rows inside a period are newest-first on screen.
        write_period(
            &dirs,
            "20201217-20201223",
            period_rows(&["12/19(土)", "12/17(木)"], "memo line1\nline2"),
        );
        write_period(
            &dirs,
            "20201210-20201216",
            period_rows(&["12/12(土)", "12/10(木)"], "plain"),
        );

        let stats = consolidate(&dirs).unwrap();
        assert_eq!(stats.csv_periods, 2);
        assert_eq!(stats.csv_records, 4);
        assert_eq!(stats.tsv_records, 4);

        let all = std::fs::read_to_string(dirs.consolidated_path(TableFormat::Csv)).unwrap();
        let lines: Vec<&str> = all.lines().collect();
        assert_eq!(lines[0], "日付,内容,金額,保有金融機関,メモ");
        // Oldest period first, and within it oldest record first (reversed
        // from on-screen order).
        assert_eq!(
            lines[1],
            r#""2020/12/10","item1","-200","Bank","plain""#
        );
        assert_eq!(
            lines[2],
            r#""2020/12/12","item0","-100","Bank","plain""#
        );
        assert!(lines[3].starts_with(r#""2020/12/17""#));
        assert!(lines[4].starts_with(r#""2020/12/19""#));

        // The embedded line break survived as the two-character escape and
        // decodes back to the original multi-line memo.
        let memo = parse_csv_line(lines[3]).pop().unwrap();
        assert_eq!(memo, "memo line1\\nline2");
        assert_eq!(memo.replace("\\n", "\n"), "memo line1\nline2");
    }

    #[test]
    fn december_period_january_record_rolls_year() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = crate::storage::DataDirs::new(tmp.path());
        dirs.ensure().unwrap();

        write_period(
            &dirs,
            "20201229-20210104",
            period_rows(&["01/01(金)", "12/30(水)"], ""),
        );

        consolidate(&dirs).unwrap();
        let all = std::fs::read_to_string(dirs.consolidated_path(TableFormat::Tsv)).unwrap();
        let lines: Vec<&str> = all.lines().collect();
        assert!(lines[1].starts_with("2020/12/30"));
        assert!(lines[2].starts_with("2021/01/01"));
    }

    #[test]
    fn header_only_period_contributes_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = crate::storage::DataDirs::new(tmp.path());
        dirs.ensure().unwrap();

        write_period(&dirs, "20201210-20201216", period_rows(&["12/12(土)"], ""));
        // Header row only, no transactions.
        write_period(&dirs, "20201203-20201209", period_rows(&[], ""));

        let stats = consolidate(&dirs).unwrap();
        assert_eq!(stats.csv_periods, 2);
        assert_eq!(stats.csv_records, 1);

        let all = std::fs::read_to_string(dirs.consolidated_path(TableFormat::Csv)).unwrap();
        // No spurious blank line from the empty block.
        assert!(!all.contains("\n\n"));
        assert_eq!(all.lines().count(), 2);
    }

    #[test]
    fn empty_store_writes_header_only() {
        let tmp = tempfile::tempdir().unwrap();
        let dirs = crate::storage::DataDirs::new(tmp.path());
        dirs.ensure().unwrap();

        let stats = consolidate(&dirs).unwrap();
        assert_eq!(stats.csv_periods, 0);
        let all = std::fs::read_to_string(dirs.consolidated_path(TableFormat::Csv)).unwrap();
        assert_eq!(all, "日付,内容,金額,保有金融機関,メモ\n");
    }
}
