//! On-disk layout for harvested artifacts: per-kind subdirectories for the
//! period files, consolidated datasets at the root.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

use crate::table::TableFormat;

/// `<startYYYYMMDD>-<endYYYYMMDD>.<ext>`; the leading key is the period's
/// start date and drives consolidation order.
static PERIOD_FILE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{8})-\d{8}\.[a-z]+$").unwrap());

#[derive(Debug, Clone)]
pub struct DataDirs {
    pub root: PathBuf,
    pub csv: PathBuf,
    pub tsv: PathBuf,
    pub screenshot: PathBuf,
    pub html: PathBuf,
}

impl DataDirs {
    pub fn new(root: &Path) -> Self {
        Self {
            root: root.to_path_buf(),
            csv: root.join("csv"),
            tsv: root.join("tsv"),
            screenshot: root.join("screenshot"),
            html: root.join("html"),
        }
    }

    pub fn ensure(&self) -> Result<()> {
        for dir in [&self.csv, &self.tsv, &self.screenshot, &self.html] {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }
        Ok(())
    }

    pub fn table_path(&self, format: TableFormat, stem: &str) -> PathBuf {
        let dir = match format {
            TableFormat::Csv => &self.csv,
            TableFormat::Tsv => &self.tsv,
        };
        dir.join(format!("{}.{}", stem, format.ext()))
    }

    pub fn screenshot_path(&self, stem: &str) -> PathBuf {
        self.screenshot.join(format!("{}.png", stem))
    }

    pub fn html_path(&self, stem: &str) -> PathBuf {
        self.html.join(format!("{}.html", stem))
    }

    pub fn consolidated_path(&self, format: TableFormat) -> PathBuf {
        self.root.join(format!("all.{}", format.ext()))
    }

    /// All period files of one kind, sorted by their leading start-date key.
    /// The zero-padded key makes lexical order chronological; sorting here
    /// keeps consolidation independent of whatever order the filesystem
    /// enumerates entries in.
    pub fn list_periods(&self, format: TableFormat) -> Result<Vec<PathBuf>> {
        let dir = match format {
            TableFormat::Csv => &self.csv,
            TableFormat::Tsv => &self.tsv,
        };
        let mut files: Vec<PathBuf> = fs::read_dir(dir)
            .with_context(|| format!("Failed to list {}", dir.display()))?
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.extension().and_then(|e| e.to_str()) == Some(format.ext())
                    && file_name(path).is_some_and(|name| PERIOD_FILE_RE.is_match(name))
            })
            .collect();
        files.sort_by_key(|path| file_name(path).unwrap_or_default().to_string());
        Ok(files)
    }
}

/// Leading 8-digit start-date key of a period file, if the name matches the
/// artifact convention.
pub fn period_start_key(path: &Path) -> Option<String> {
    let name = file_name(path)?;
    let caps = PERIOD_FILE_RE.captures(name)?;
    Some(caps[1].to_string())
}

fn file_name(path: &Path) -> Option<&str> {
    path.file_name().and_then(|n| n.to_str())
}

// ── Tests ──
