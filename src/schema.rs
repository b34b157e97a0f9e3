//! Fixed mapping from raw table columns onto ledger fields, plus the period
//! date handling shared by the harvester and the consolidator.
//!
//! The raw table is wider than what the consolidated dataset keeps; the
//! indices below are the only contract with the page's column layout. A
//! layout change shows up here and nowhere else.

use chrono::NaiveDate;

/// One carried column: its index in the raw table and its header label in
/// the source application's locale.
pub struct LedgerColumn {
    pub index: usize,
    pub header: &'static str,
}

/// date, description, amount, institution, memo.
pub const LEDGER_COLUMNS: [LedgerColumn; 5] = [
    LedgerColumn { index: 1, header: "日付" },
    LedgerColumn { index: 2, header: "内容" },
    LedgerColumn { index: 3, header: "金額" },
    LedgerColumn { index: 4, header: "保有金融機関" },
    LedgerColumn { index: 7, header: "メモ" },
];

/// Header line for the consolidated dataset. Left unquoted in both formats.
pub fn header_row(separator: char) -> String {
    LEDGER_COLUMNS
        .iter()
        .map(|c| c.header)
        .collect::<Vec<_>>()
        .join(&separator.to_string())
}

/// Project a raw row onto the carried columns. Rows narrower than the schema
/// simply yield fewer fields; nothing guards against a reshuffled layout.
pub fn project(cells: &[String]) -> Vec<String> {
    LEDGER_COLUMNS
        .iter()
        .filter_map(|c| cells.get(c.index).cloned())
        .collect()
}

/// Resolve the 4-digit year for a record whose raw date is a bare `MM/DD`
/// (optionally trailed by a weekday annotation). `period_start` is the
/// owning period's 8-digit `YYYYMMDD` key.
///
/// The year is the period's own start year, except that a December period
/// can show January records from the following year; only that combination
/// rolls the year forward. A January period showing a trailing December row
/// is not corrected the other way.
pub fn resolve_year(period_start: &str, month_day: &str) -> String {
    let year = &period_start[..4];
    if &period_start[4..6] == "12" && month_day.get(..2) == Some("01") {
        if let Ok(y) = year.parse::<i32>() {
            return (y + 1).to_string();
        }
    }
    year.to_string()
}

/// Inclusive date range of one ledger page, parsed from the UI's range
/// title, e.g. `2020/12/10 - 2020/12/16` (dates may carry a `(weekday)`
/// suffix).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeriodRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl PeriodRange {
    pub fn parse(title: &str) -> Option<Self> {
        let (start, end) = title.split_once(" - ")?;
        Some(Self {
            start: parse_date(start)?,
            end: parse_date(end)?,
        })
    }

    /// Artifact stem shared by all of a period's files:
    /// `<startYYYYMMDD>-<endYYYYMMDD>`.
    pub fn file_stem(&self) -> String {
        format!(
            "{}-{}",
            self.start.format("%Y%m%d"),
            self.end.format("%Y%m%d")
        )
    }
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    let bare = s.split('(').next().unwrap_or("").trim();
    NaiveDate::parse_from_str(bare, "%Y/%m/%d")
        .or_else(|_| NaiveDate::parse_from_str(bare, "%Y-%m-%d"))
        .ok()
}

// ── Tests ──
