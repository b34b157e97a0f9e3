//! Raw transaction-table content for one ledger period and its two
//! delimited-text renderings.

/// Delimited artifact kinds produced for every period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    Csv,
    Tsv,
}

impl TableFormat {
    pub fn ext(self) -> &'static str {
        match self {
            TableFormat::Csv => "csv",
            TableFormat::Tsv => "tsv",
        }
    }

    pub fn separator(self) -> char {
        match self {
            TableFormat::Csv => ',',
            TableFormat::Tsv => '\t',
        }
    }
}

/// One period's table, rows in on-screen order (newest transaction first,
/// header row included). Cell text is verbatim except that embedded line
/// breaks are escaped on ingest, so one logical row is one physical line in
/// every rendering.
#[derive(Debug, Clone)]
pub struct Extract {
    pub rows: Vec<Vec<String>>,
}

impl Extract {
    /// Build from raw cell text as read out of the DOM, escaping embedded
    /// newlines to the literal two-character sequence `\n`.
    pub fn from_cells(rows: Vec<Vec<String>>) -> Self {
        let rows = rows
            .into_iter()
            .map(|row| row.iter().map(|cell| escape_newlines(cell)).collect())
            .collect();
        Self { rows }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Every field double-quoted, comma-separated, one row per line with a
    /// newline after the last field of every row. Embedded quotes are not
    /// escaped; the consolidation parser is the forgiving side of that pair.
    pub fn to_csv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push('"');
                out.push_str(cell);
                out.push('"');
            }
            out.push('\n');
        }
        out
    }

    /// Unquoted tab-separated rendering, same row termination as CSV.
    pub fn to_tsv(&self) -> String {
        let mut out = String::new();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate() {
                if i > 0 {
                    out.push('\t');
                }
                out.push_str(cell);
            }
            out.push('\n');
        }
        out
    }
}

pub fn escape_newlines(s: &str) -> String {
    s.replace('\n', "\\n")
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Extract {
        Extract::from_cells(vec![
            vec!["a".into(), "b".into(), "c".into()],
            vec!["d".into(), "e".into(), "f".into()],
        ])
    }

    #[test]
    fn csv_shape() {
        let csv = sample().to_csv();
        assert_eq!(csv, "\"a\",\"b\",\"c\"\n\"d\",\"e\",\"f\"\n");
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.split(',').count() == 3));
    }

    #[test]
    fn tsv_shape() {
        let tsv = sample().to_tsv();
        assert_eq!(tsv, "a\tb\tc\nd\te\tf\n");
        let lines: Vec<&str> = tsv.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines.iter().all(|l| l.split('\t').count() == 3));
    }

    #[test]
    fn embedded_newline_is_escaped_to_two_chars() {
        let ex = Extract::from_cells(vec![vec!["line1\nline2".into(), "x".into()]]);
        assert_eq!(ex.rows[0][0], "line1\\nline2");
        let csv = ex.to_csv();
        // One logical row stays one physical line.
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.contains("line1\\nline2"));
    }

    #[test]
    fn empty_extract_renders_empty() {
        let ex = Extract::from_cells(vec![]);
        assert!(ex.is_empty());
        assert_eq!(ex.to_csv(), "");
        assert_eq!(ex.to_tsv(), "");
    }
}
