//! Backward traversal of the cash-flow ledger: sign in, then step the
//! weekly pager until it stops moving, persisting every period on the way.

use std::fs;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use indicatif::ProgressBar;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::schema::PeriodRange;
use crate::session::Session;
use crate::storage::DataDirs;
use crate::table::{Extract, TableFormat};

const EMAIL_SELECTOR: &str = "#sign_in_session_service_email";
const PASSWORD_SELECTOR: &str = "#sign_in_session_service_password";
const SUBMIT_SELECTOR: &str = "#login-btn-sumit";
const PERIOD_TITLE_SELECTOR: &str = ".fc-header-title h2";
const PREV_BUTTON_SELECTOR: &str = "button.fc-button-prev";

/// In-page reader for the transaction table; `null` when the period has no
/// table at all (distinct from a table with no rows).
const TABLE_EXTRACT_JS: &str = r#"
(() => {
    const table = document.querySelector('table#cf-detail-table');
    if (!table) return null;
    return Array.from(table.rows).map((row) =>
        Array.from(row.cells).map((cell) => cell.innerText));
})()
"#;

/// Settle after login submit and after each pager step. The pager exposes no
/// completion signal (termination is detected by the title *not* changing,
/// which a condition wait cannot observe), so this stays a fixed pause.
const RENDER_SETTLE: Duration = Duration::from_secs(5);
const LOGIN_SETTLE: Duration = Duration::from_secs(3);

/// The one ledger page the traversal is currently positioned on. The loop
/// only talks to this, so it runs against a fake as well as a live session.
#[allow(async_fn_in_trait)]
pub trait LedgerView {
    async fn period_title(&mut self) -> Result<Option<String>>;
    async fn transaction_table(&mut self) -> Result<Option<Extract>>;
    async fn go_previous(&mut self) -> Result<()>;
    async fn screenshot(&mut self, path: &Path) -> Result<()>;
    async fn full_html(&mut self) -> Result<String>;
}

pub struct HarvestStats {
    /// Periods visited, including ones with nothing to save.
    pub periods: usize,
    pub saved: usize,
    pub empty: usize,
}

/// Sign in, open the ledger, and harvest every reachable period.
pub async fn run(session: &mut Session, config: &Config, dirs: &DataDirs) -> Result<HarvestStats> {
    login(session, config).await?;

    let ledger_url = format!("{}/cf", config.base_url());
    info!("Opening cash-flow ledger {}", ledger_url);
    session.navigate(&ledger_url).await?;
    session.settle(RENDER_SETTLE).await;

    harvest_periods(session, dirs, config.base_url()).await
}

async fn login(session: &mut Session, config: &Config) -> Result<()> {
    let url = format!("{}/users/sign_in", config.base_url());
    info!("Signing in at {}", url);
    session.navigate(&url).await?;
    session.settle(LOGIN_SETTLE).await;

    session
        .type_into(EMAIL_SELECTOR, &config.moneyforward.mail_address)
        .await?;
    session
        .type_into(PASSWORD_SELECTOR, &config.moneyforward.password)
        .await?;
    session
        .click(SUBMIT_SELECTOR)
        .await
        .context("Login submit failed")?;
    session.settle(LOGIN_SETTLE).await;
    Ok(())
}

/// Walk periods newest to oldest, one iteration per period. The traversal is
/// done when the previous-period action no longer changes the title; that is
/// the only normal termination, there is no iteration cap.
pub async fn harvest_periods<V: LedgerView>(
    view: &mut V,
    dirs: &DataDirs,
    base_url: &str,
) -> Result<HarvestStats> {
    let pb = ProgressBar::new_spinner();
    let mut stats = HarvestStats {
        periods: 0,
        saved: 0,
        empty: 0,
    };

    loop {
        let before = view.period_title().await?;
        pb.set_message(before.clone().unwrap_or_default());

        match save_period(view, dirs, base_url).await? {
            SaveOutcome::Saved => stats.saved += 1,
            SaveOutcome::NoTable => stats.empty += 1,
            SaveOutcome::NothingToSave => {}
        }
        stats.periods += 1;
        pb.inc(1);

        view.go_previous().await?;
        let after = view.period_title().await?;
        debug!(?before, ?after, "pager step");
        if after == before {
            info!("Earliest period reached");
            break;
        }
    }

    pb.finish_and_clear();
    Ok(stats)
}

enum SaveOutcome {
    Saved,
    /// Period rendered but carries no transaction table.
    NoTable,
    /// Period header missing or unrecognized; nothing to name artifacts by.
    NothingToSave,
}

async fn save_period<V: LedgerView>(
    view: &mut V,
    dirs: &DataDirs,
    base_url: &str,
) -> Result<SaveOutcome> {
    let Some(title) = view.period_title().await? else {
        warn!("Period header not rendered; nothing to save");
        return Ok(SaveOutcome::NothingToSave);
    };
    let Some(range) = PeriodRange::parse(&title) else {
        warn!("Unrecognized period title `{}`; nothing to save", title);
        return Ok(SaveOutcome::NothingToSave);
    };
    let stem = range.file_stem();

    let Some(extract) = view.transaction_table().await? else {
        debug!("No transaction table for {}", stem);
        return Ok(SaveOutcome::NoTable);
    };
    if extract.is_empty() {
        debug!("Transaction table for {} has no rows", stem);
        return Ok(SaveOutcome::NoTable);
    }

    let csv_path = dirs.table_path(TableFormat::Csv, &stem);
    fs::write(&csv_path, extract.to_csv())
        .with_context(|| format!("Failed to write {}", csv_path.display()))?;
    let tsv_path = dirs.table_path(TableFormat::Tsv, &stem);
    fs::write(&tsv_path, extract.to_tsv())
        .with_context(|| format!("Failed to write {}", tsv_path.display()))?;
    info!("Saved period {} ({} rows)", stem, extract.rows.len());

    // Snapshots are best-effort: the table data is already on disk.
    if let Err(e) = view.screenshot(&dirs.screenshot_path(&stem)).await {
        warn!("Screenshot for {} failed: {:#}", stem, e);
    }
    match view.full_html().await {
        Ok(html) => {
            let html_path = dirs.html_path(&stem);
            if let Err(e) = fs::write(&html_path, rewrite_relative_urls(&html, base_url)) {
                warn!("HTML snapshot for {} failed: {}", stem, e);
            }
        }
        Err(e) => warn!("HTML snapshot for {} failed: {:#}", stem, e),
    }

    Ok(SaveOutcome::Saved)
}

/// Point root-relative href/src attributes back at the live origin so a
/// saved page renders standalone.
fn rewrite_relative_urls(html: &str, base_url: &str) -> String {
    html.replace("href=\"/", &format!("href=\"{}/", base_url))
        .replace("src=\"/", &format!("src=\"{}/", base_url))
}

impl LedgerView for Session {
    async fn period_title(&mut self) -> Result<Option<String>> {
        self.inner_text(PERIOD_TITLE_SELECTOR).await
    }

    async fn transaction_table(&mut self) -> Result<Option<Extract>> {
        let cells: Option<Vec<Vec<String>>> = self.evaluate(TABLE_EXTRACT_JS).await?;
        Ok(cells.map(Extract::from_cells))
    }

    async fn go_previous(&mut self) -> Result<()> {
        self.click(PREV_BUTTON_SELECTOR)
            .await
            .context("Previous-period click failed")?;
        self.settle(RENDER_SETTLE).await;
        Ok(())
    }

    async fn screenshot(&mut self, path: &Path) -> Result<()> {
        Session::screenshot(self, path).await
    }

    async fn full_html(&mut self) -> Result<String> {
        self.html().await
    }
}

// ── Tests ──
