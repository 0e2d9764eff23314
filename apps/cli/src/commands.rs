//! CLI command definitions, routing, and tracing setup.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use color_eyre::eyre::{Result, eyre};
use dredger_core::{Dredger, import_file};
use dredger_shared::{
    AppConfig, DredgeConfig, DredgeState, Link, LinkId, LinkStatus, default_db_path, init_config,
    load_config,
};
use dredger_storage::Storage;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// The Dredger: triage bookmarked links and enrich them with titles, summaries and tags.
#[derive(Parser)]
#[command(name = "dredger", version, long_about = None)]
pub(crate) struct Cli {
    /// Log format: text (default) or json.
    #[arg(long, default_value = "text", global = true)]
    pub log_format: LogFormat,

    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Database path (overrides the config file).
    #[arg(long, env = "DREDGER_DB", global = true)]
    pub db: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

/// Log output format.
#[derive(Clone, Debug, clap::ValueEnum)]
pub(crate) enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub(crate) enum Command {
    /// Import every URL found in a text file.
    Import {
        /// File to scan for http(s) URLs.
        file: PathBuf,
    },

    /// Crawl and summarize links that have not been enriched yet.
    Dredge {
        /// Number of concurrent workers.
        #[arg(short, long)]
        workers: Option<usize>,

        /// Dredge at most this many links.
        #[arg(short, long)]
        limit: Option<u32>,
    },

    /// List links, newest first.
    List {
        /// Only links with this status: unprocessed, saved, or pruned.
        #[arg(short, long)]
        status: Option<LinkStatus>,
    },

    /// Show everything known about one link.
    Show { id: LinkId },

    /// Mark a link as saved.
    Save { id: LinkId },

    /// Mark a link as pruned. A pruned link is never touched by the dredger again.
    Prune { id: LinkId },

    /// Clear a link's dredge state so the next `dredge` run picks it up again.
    Retry { id: LinkId },

    /// Permanently delete one link.
    Delete { id: LinkId },

    /// Count links per status.
    Stats,

    /// Permanently delete pruned links.
    Clean,

    /// Delete all links.
    Reset {
        /// Skip the confirmation prompt.
        #[arg(long)]
        yes: bool,
    },

    /// Configuration management.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
pub(crate) enum ConfigAction {
    /// Initialize config file with defaults.
    Init,
    /// Show resolved configuration.
    Show,
}

// ---------------------------------------------------------------------------
// Tracing setup
// ---------------------------------------------------------------------------

/// Initialize tracing based on CLI flags.
pub(crate) fn init_tracing(cli: &Cli) {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = match cli.verbose {
        0 => "dredger=warn",
        1 => "dredger=info",
        2 => "dredger=debug",
        _ => "dredger=trace",
    };

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    match cli.log_format {
        LogFormat::Text => {
            fmt()
                .with_env_filter(env_filter)
                .with_target(false)
                .with_writer(std::io::stderr)
                .init();
        }
        LogFormat::Json => {
            fmt()
                .json()
                .with_env_filter(env_filter)
                .with_writer(std::io::stderr)
                .init();
        }
    }
}

// ---------------------------------------------------------------------------
// Command dispatch
// ---------------------------------------------------------------------------

/// Run the CLI command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    if let Command::Config { action } = &cli.command {
        return match action {
            ConfigAction::Init => cmd_config_init(),
            ConfigAction::Show => cmd_config_show(),
        };
    }

    let config = load_config()?;
    let db_path = match cli.db {
        Some(path) => path,
        None => default_db_path(&config)?,
    };

    match cli.command {
        Command::Import { file } => cmd_import(&db_path, &file).await,
        Command::Dredge { workers, limit } => cmd_dredge(&config, &db_path, workers, limit).await,
        Command::List { status } => cmd_list(&db_path, status).await,
        Command::Show { id } => cmd_show(&db_path, id).await,
        Command::Save { id } => cmd_set_status(&db_path, id, LinkStatus::Saved).await,
        Command::Prune { id } => cmd_set_status(&db_path, id, LinkStatus::Pruned).await,
        Command::Retry { id } => cmd_retry(&db_path, id).await,
        Command::Delete { id } => cmd_delete(&db_path, id).await,
        Command::Stats => cmd_stats(&db_path).await,
        Command::Clean => cmd_clean(&db_path).await,
        Command::Reset { yes } => cmd_reset(&db_path, yes).await,
        Command::Config { .. } => Ok(()),
    }
}

/// Open the database read-only, or `None` if it has not been created yet.
async fn open_existing(db_path: &Path) -> Result<Option<Storage>> {
    if !db_path.exists() {
        println!("No links yet. Run `dredger import <file>` first.");
        return Ok(None);
    }
    Ok(Some(Storage::open_readonly(db_path).await?))
}

// ---------------------------------------------------------------------------
// Command handlers
// ---------------------------------------------------------------------------

async fn cmd_import(db_path: &Path, file: &Path) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let stats = import_file(&storage, file).await?;

    if stats.found == 0 {
        println!("No URLs found in {}.", file.display());
    } else {
        println!(
            "Imported {} new links ({} duplicates skipped)",
            stats.inserted, stats.skipped
        );
    }
    Ok(())
}

async fn cmd_dredge(
    config: &AppConfig,
    db_path: &Path,
    workers: Option<usize>,
    limit: Option<u32>,
) -> Result<()> {
    let mut dredge_config = DredgeConfig::from(config);
    if let Some(workers) = workers {
        dredge_config.workers = workers.max(1);
    }

    let storage = Arc::new(Storage::open(db_path).await?);
    let links = storage.list_unenriched_links(limit).await?;
    if links.is_empty() {
        println!("Nothing to dredge.");
        return Ok(());
    }

    let total = links.len();
    info!(total, workers = dredge_config.workers, "starting dredge");
    let dredger = Dredger::new(Arc::clone(&storage), dredge_config)?;

    let cancel = CancellationToken::new();
    let ctrl_c = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    let bar = ProgressBar::new(total as u64);
    bar.set_style(
        ProgressStyle::with_template("{spinner:.cyan} [{bar:30.cyan/blue}] {pos}/{len} {wide_msg}")?
            .progress_chars("=> "),
    );
    bar.enable_steady_tick(Duration::from_millis(80));
    bar.set_message("Checking summarizer...");

    let mut results = dredger.run(cancel.clone(), links).await;
    bar.set_message("Crawling...");

    let (mut complete, mut capsized) = (0usize, 0usize);
    while let Some(result) = results.recv().await {
        match &result.error {
            None => {
                complete += 1;
                bar.set_message(result.title.clone());
            }
            Some(e) => {
                capsized += 1;
                bar.println(format!("  capsized  {}  {e}", result.url));
            }
        }
        bar.inc(1);
    }
    ctrl_c.abort();
    bar.finish_and_clear();

    println!("Dredged {total} links: {complete} complete, {capsized} capsized.");
    if cancel.is_cancelled() {
        println!(
            "Cancelled; {} links were not processed.",
            total - complete - capsized
        );
    }
    Ok(())
}

async fn cmd_list(db_path: &Path, status: Option<LinkStatus>) -> Result<()> {
    let Some(storage) = open_existing(db_path).await? else {
        return Ok(());
    };
    let links = match status {
        Some(status) => storage.list_links_by_status(status).await?,
        None => storage.list_links().await?,
    };

    if links.is_empty() {
        println!("No links.");
        return Ok(());
    }
    for link in &links {
        println!(
            "{:>6}  {:<11}  {:<12}  {}",
            link.id,
            link.status,
            link.dredge_state.label(),
            link.display_title()
        );
    }
    Ok(())
}

async fn cmd_show(db_path: &Path, id: LinkId) -> Result<()> {
    let Some(storage) = open_existing(db_path).await? else {
        return Ok(());
    };
    let link = storage
        .get_link(id)
        .await?
        .ok_or_else(|| eyre!("no link with id {id}"))?;
    print_link(&link);
    Ok(())
}

fn print_link(link: &Link) {
    println!();
    println!("  ID:          {}", link.id);
    println!("  URL:         {}", link.url);
    println!("  Title:       {}", link.display_title());
    if !link.description.is_empty() {
        println!("  Description: {}", link.description);
    }
    if !link.summary.is_empty() {
        println!("  Summary:     {}", link.summary);
    }
    if !link.tags.is_empty() {
        println!("  Tags:        {}", link.tags.join(", "));
    }
    println!("  Status:      {}", link.status);
    if !link.dredge_state.label().is_empty() {
        println!("  Dredge:      {}", link.dredge_state.label());
    }
    if !link.dredge_error.is_empty() {
        println!("  Error:       {}", link.dredge_error);
    }
    println!(
        "  Added:       {}",
        link.date_added.format("%Y-%m-%d %H:%M UTC")
    );
    println!();
}

async fn cmd_set_status(db_path: &Path, id: LinkId, status: LinkStatus) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    if !storage.set_status(id, status).await? {
        return Err(eyre!("no link with id {id}"));
    }
    println!("Link {id} marked {status}.");
    Ok(())
}

async fn cmd_retry(db_path: &Path, id: LinkId) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    requeue_link(&storage, id).await?;
    println!("Link {id} queued for the next dredge.");
    Ok(())
}

/// Reset the enrichment bookkeeping of a link, keeping whatever was scraped before.
async fn requeue_link(storage: &Storage, id: LinkId) -> Result<Link> {
    let mut link = storage
        .get_link(id)
        .await?
        .ok_or_else(|| eyre!("no link with id {id}"))?;
    if link.status == LinkStatus::Pruned {
        return Err(eyre!("link {id} is pruned and will not be dredged"));
    }

    link.enriched = false;
    link.dredge_state = DredgeState::None;
    link.dredge_error.clear();
    storage.update_link(&link).await?;
    Ok(link)
}

async fn cmd_delete(db_path: &Path, id: LinkId) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    if !storage.delete_link(id).await? {
        return Err(eyre!("no link with id {id}"));
    }
    println!("Link {id} deleted.");
    Ok(())
}

async fn cmd_stats(db_path: &Path) -> Result<()> {
    let Some(storage) = open_existing(db_path).await? else {
        return Ok(());
    };
    let stats = storage.count_links_by_status().await?;
    println!("Pending: {}", stats.unprocessed);
    println!("Saved:   {}", stats.saved);
    println!("Pruned:  {}", stats.pruned);
    println!("Total:   {}", stats.total);
    Ok(())
}

async fn cmd_clean(db_path: &Path) -> Result<()> {
    let storage = Storage::open(db_path).await?;
    let removed = storage.delete_pruned_links().await?;
    println!("Removed {removed} pruned links.");
    Ok(())
}

async fn cmd_reset(db_path: &Path, yes: bool) -> Result<()> {
    if !yes && !confirm("This will delete ALL links. Are you sure? [y/N] ")? {
        println!("Aborted.");
        return Ok(());
    }
    let storage = Storage::open(db_path).await?;
    let removed = storage.delete_all_links().await?;
    println!("Deleted {removed} links. Database is now empty.");
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{prompt}");
    std::io::stdout().flush()?;
    let mut answer = String::new();
    std::io::stdin().read_line(&mut answer)?;
    Ok(matches!(answer.trim(), "y" | "Y"))
}

fn cmd_config_init() -> Result<()> {
    let path = init_config()?;
    println!("Config initialized at: {}", path.display());
    Ok(())
}

fn cmd_config_show() -> Result<()> {
    let config: AppConfig = load_config()?;
    let toml_str = toml::to_string_pretty(&config)?;
    println!("{toml_str}");
    Ok(())
}
