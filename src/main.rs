//! dictcache - dispatch cache worker events from the command line

use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use dictcache::cache::{CacheManager, GenerationStore, Handled, Mediation};
use dictcache::cli::{Cli, Commands, FetchArgs, Settings, WatchArgs};
use dictcache::events::{EventOutcome, WorkerEvent};
use dictcache::net::{Fetch, HttpFetcher, Response};
use dictcache::refresh::{SyncConfig, SyncHandle, SyncMessage, SyncOutcome};

type BoxError = Box<dyn std::error::Error>;

/// Initialize logging: 0 = warn, 1 = info, 2+ = debug; RUST_LOG overrides
fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| match verbose {
        0 => EnvFilter::new("dictcache=warn"),
        1 => EnvFilter::new("dictcache=info"),
        _ => EnvFilter::new("dictcache=debug"),
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), BoxError> {
    let settings = Settings::from_cli(&cli)?;
    let store = settings.store();
    let fetcher = HttpFetcher::new(&settings.config.app_root);
    let manager = CacheManager::new(settings.config.clone(), fetcher.clone());
    debug!(store = %store.root().display(), generation = manager.generation(), "starting");

    match cli.command {
        Commands::Install => {
            if let EventOutcome::Installed(installed) =
                manager.dispatch(&store, WorkerEvent::Install).await?
            {
                println!(
                    "Installed {} ({} seed entries)",
                    installed.generation, installed.seeded
                );
            }
        }
        Commands::Activate => {
            if let EventOutcome::Activated(activation) =
                manager.dispatch(&store, WorkerEvent::Activate).await?
            {
                for name in &activation.removed {
                    println!("Deleted old cache: {}", name);
                }
                for name in &activation.failed {
                    eprintln!("Could not delete old cache: {}", name);
                }
                println!("Activated {}", activation.generation);
            }
        }
        Commands::Fetch(args) => fetch(&manager, &fetcher, &store, &args).await?,
        Commands::Sync(args) => {
            if let EventOutcome::Synced(outcome) =
                manager.dispatch(&store, WorkerEvent::Sync(args.tag.clone())).await?
            {
                report_sync(&outcome)?;
            }
        }
        Commands::Generations => list_generations(&manager, &store).await?,
        Commands::Watch(args) => watch(manager, store, &args).await?,
    }
    Ok(())
}

async fn fetch<F: Fetch>(
    manager: &CacheManager<F>,
    fetcher: &HttpFetcher,
    store: &GenerationStore,
    args: &FetchArgs,
) -> Result<(), BoxError> {
    let request = args.to_request()?;

    match manager.dispatch(store, WorkerEvent::Fetch(request.clone())).await? {
        EventOutcome::Fetched(Mediation::Respond(Handled {
            response,
            source,
            write_back,
        })) => {
            eprintln!(
                "{} {} {} ({:?})",
                response.status,
                response.response_type,
                response.header("content-type").unwrap_or("-"),
                source
            );
            emit_body(&response, args)?;
            // The process exits after this, so let the write-back finish
            if let Some(task) = write_back {
                let _ = task.await;
            }
        }
        EventOutcome::Fetched(Mediation::PassThrough) => {
            let response = fetcher.fetch(&request).await?;
            eprintln!(
                "{} {} {} (not mediated)",
                response.status,
                response.response_type,
                response.header("content-type").unwrap_or("-")
            );
            emit_body(&response, args)?;
        }
        _ => {}
    }
    Ok(())
}

fn emit_body(response: &Response, args: &FetchArgs) -> io::Result<()> {
    match &args.output {
        Some(path) => std::fs::write(path, &response.body),
        None => {
            let mut stdout = io::stdout().lock();
            stdout.write_all(&response.body)?;
            stdout.flush()
        }
    }
}

fn report_sync(outcome: &SyncOutcome) -> Result<(), BoxError> {
    match outcome {
        SyncOutcome::Refreshed(report) => {
            println!("Refreshed {} ({} bytes)", report.url, report.bytes);
            Ok(())
        }
        SyncOutcome::Ignored => {
            println!("Sync tag not handled; nothing to do");
            Ok(())
        }
        // Non-zero exit lets the external scheduler decide whether to retry
        SyncOutcome::Failed(reason) => Err(format!("sync failed: {}", reason).into()),
    }
}

async fn list_generations<F: Fetch>(
    manager: &CacheManager<F>,
    store: &GenerationStore,
) -> Result<(), BoxError> {
    let controller = store.controller().await?;
    let names = store.keys().await?;
    if names.is_empty() {
        println!("No cache generations in {}", store.root().display());
        return Ok(());
    }

    for name in names {
        let count = store.entry_count(&name).await?;
        let mut marks = Vec::new();
        if controller.as_deref() == Some(name.as_str()) {
            marks.push("controller");
        }
        if name == manager.generation() {
            marks.push("current");
        }
        if marks.is_empty() {
            println!("{}  {} entries", name, count);
        } else {
            println!("{}  {} entries  [{}]", name, count, marks.join(", "));
        }
    }
    Ok(())
}

async fn watch(
    manager: CacheManager<HttpFetcher>,
    store: GenerationStore,
    args: &WatchArgs,
) -> Result<(), BoxError> {
    let config = SyncConfig {
        interval: Duration::from_secs(args.interval_secs),
        ..Default::default()
    };
    info!(interval_secs = args.interval_secs, "watching for dictionary updates");
    let mut handle = SyncHandle::spawn(Arc::new(manager), store, config);
    // Sync once at startup rather than waiting out the first interval
    handle.request_sync().await;

    loop {
        tokio::select! {
            message = handle.receiver.recv() => match message {
                Some(SyncMessage::SyncStarted { tag }) => debug!(tag = %tag, "sync started"),
                Some(SyncMessage::SyncCompleted(outcome)) => {
                    if let Err(e) = report_sync(&outcome) {
                        eprintln!("{}", e);
                    }
                }
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted; stopping");
                break;
            }
        }
    }

    handle.shutdown().await;
    Ok(())
}
