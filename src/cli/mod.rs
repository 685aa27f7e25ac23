//! CLI mode for booru-dl.

mod progress;

use std::sync::Arc;
use std::time::Duration;

use indicatif::ProgressBar;
use tokio::sync::oneshot;

use crate::catalog::HttpCatalog;
use crate::config::AppConfig;
use crate::download::{BatchReport, Downloader};
use crate::error::{Error, Result};
use crate::item::{Rating, SearchFilter};
use crate::media::HttpMediaStore;
use crate::registry::TaskRegistry;
use crate::storage::FileStorage;

use progress::{
    make_search_spinner, make_task_bar, print_summary, print_task_list, update_task_bar,
};

fn print_usage() {
    eprintln!("Usage: booru-dl <COMMAND>");
    eprintln!();
    eprintln!("Commands:");
    eprintln!("  search [OPTIONS] TAG...   Download every post matching the tags");
    eprintln!("  tasks                     List download tasks");
    eprintln!("  remove ID                 Remove a task");
    eprintln!();
    eprintln!("Search options:");
    eprintln!("  -x, --exclude <TAG>       Exclude posts with TAG (repeatable)");
    eprintln!("  -r, --rating <g|s|q|e>    Restrict to one rating");
    eprintln!();
    eprintln!("Press Ctrl-C during a search to cancel the running task.");
}

/// A parsed command line.
#[derive(Debug, PartialEq, Eq)]
enum Command {
    Search(SearchFilter),
    Tasks,
    Remove(u64),
    Help,
}

fn parse_args(args: &[String]) -> std::result::Result<Command, String> {
    let Some((command, rest)) = args.split_first() else {
        return Ok(Command::Help);
    };

    match command.as_str() {
        "search" => {
            let mut filter = SearchFilter::default();
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "-x" | "--exclude" => {
                        i += 1;
                        let tag = rest.get(i).ok_or("--exclude requires a value")?;
                        filter.excluded_tags.push(tag.clone());
                    }
                    "-r" | "--rating" => {
                        i += 1;
                        let value = rest.get(i).ok_or("--rating requires a value")?;
                        filter.rating =
                            Some(Rating::parse(value).ok_or(format!("unknown rating: {value}"))?);
                    }
                    tag => filter.tags.push(tag.to_string()),
                }
                i += 1;
            }
            if filter.tags.is_empty() {
                return Err("search requires at least one tag".to_string());
            }
            Ok(Command::Search(filter))
        }
        "tasks" => Ok(Command::Tasks),
        "remove" => {
            let id = rest.first().ok_or("remove requires a task id")?;
            id.parse()
                .map(Command::Remove)
                .map_err(|_| format!("invalid task id: {id}"))
        }
        "-h" | "--help" | "help" => Ok(Command::Help),
        other => Err(format!("unknown command: {other}")),
    }
}

/// Wires the file-backed storage, HTTP catalog and media store together.
async fn build_downloader(config: &AppConfig) -> Result<Downloader> {
    let storage = Arc::new(FileStorage::open(&config.paths.data_dir).await?);
    let registry = Arc::new(TaskRegistry::rehydrate(&*storage).await?);

    let http = HttpCatalog::build_http_client(Duration::from_secs(config.catalog.timeout_secs))?;
    let catalog = Arc::new(HttpCatalog::new(http.clone(), &config.catalog.base_url));
    let media = Arc::new(HttpMediaStore::new(http, &config.paths.media_dir));

    Ok(Downloader::new(
        storage,
        catalog,
        media,
        registry,
        config.tasks.clone(),
    ))
}

/// Runs a whole-search download, mirroring its task onto a progress bar.
///
/// Ctrl-C cancels the task once it exists, or abandons the search while pages
/// are still being collected.
async fn run_search(downloader: &Downloader, filter: SearchFilter) -> Result<BatchReport> {
    let spinner = make_search_spinner(&filter.query());
    spinner.enable_steady_tick(Duration::from_millis(120));

    let (started, mut started_rx) = oneshot::channel();
    let mut search = tokio::spawn({
        let downloader = downloader.clone();
        async move {
            downloader
                .download_whole_search_notifying(&filter, started)
                .await
        }
    });
    let abort = search.abort_handle();
    let mut task_id = None;
    let mut awaiting_id = true;

    let mut ticker = tokio::time::interval(Duration::from_millis(200));
    let mut bar: Option<ProgressBar> = None;

    let joined = loop {
        tokio::select! {
            joined = &mut search => break joined,
            id = &mut started_rx, if awaiting_id => {
                awaiting_id = false;
                task_id = id.ok();
            }
            _ = tokio::signal::ctrl_c() => {
                if awaiting_id && let Ok(id) = started_rx.try_recv() {
                    awaiting_id = false;
                    task_id = Some(id);
                }
                match task_id {
                    Some(id) => {
                        if downloader.cancel_task(id) {
                            log::info!("Canceling task {id}");
                        }
                    }
                    None => abort.abort(),
                }
            }
            _ = ticker.tick() => {
                if let Some(task) = task_id.and_then(|id| downloader.registry().get(id)) {
                    let bar = bar.get_or_insert_with(|| {
                        spinner.finish_and_clear();
                        make_task_bar(&task)
                    });
                    update_task_bar(bar, &task);
                }
            }
        }
    };

    spinner.finish_and_clear();
    let report = match joined {
        Ok(result) => result,
        Err(e) if e.is_cancelled() => Err(Error::Cancelled),
        Err(e) => Err(Error::Io(std::io::Error::other(e))),
    };

    if let Some(bar) = bar {
        if let Ok(report) = &report
            && let Some(task) = &report.task
        {
            update_task_bar(&bar, task);
        }
        bar.finish();
    }
    report
}

/// Entry point for the `booru-dl` binary.
///
/// # Errors
///
/// Returns an error if the configuration, storage or the requested command
/// fails.
pub async fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = match parse_args(&args) {
        Ok(command) => command,
        Err(message) => {
            eprintln!("Error: {message}");
            eprintln!();
            print_usage();
            std::process::exit(2);
        }
    };

    if command == Command::Help {
        print_usage();
        return Ok(());
    }

    let config = AppConfig::load()?;
    let downloader = build_downloader(&config).await?;

    match command {
        Command::Search(filter) => {
            let report = run_search(&downloader, filter).await?;
            print_summary(&report);
        }
        Command::Tasks => print_task_list(&downloader.tasks()),
        Command::Remove(id) => match downloader.remove_task(id).await? {
            Some(_) => println!("Removed task #{id}"),
            None => println!("No task #{id}"),
        },
        Command::Help => unreachable!("handled above"),
    }
    Ok(())
}
