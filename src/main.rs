use samp_directory::{
    CycleOutcome, RefreshConfig, RefreshEngine, STORE_FILE, format_panic_info,
    models::cli::Cli,
    store::JsonFileStore,
    utils::{settings::Settings, subscriber},
};

use std::{process::ExitCode, sync::Arc};

use clap::Parser;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    let prev = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        error!(name: "PANIC", "{}", format_panic_info(info));
        prev(info);
    }));

    let cli = Cli::parse();

    if let Err(err) = std::fs::create_dir_all(&cli.data_dir) {
        eprintln!("{err}, could not create: {}", cli.data_dir.display());
        return ExitCode::FAILURE;
    }

    subscriber::init_subscriber(&cli.data_dir).unwrap_or_else(|err| eprintln!("{err}"));

    let mut settings = Settings::init(&cli.data_dir);
    if !cli.masterlists.is_empty() {
        settings.masterlists = cli.masterlists;
    }

    let store = JsonFileStore::new(cli.data_dir.join(STORE_FILE));
    let engine = match RefreshEngine::new(store, RefreshConfig::from(&settings)) {
        Ok(engine) => Arc::new(engine),
        Err(err) => {
            error!("{err}");
            return ExitCode::FAILURE;
        }
    };

    if cli.once {
        return match engine.run_cycle().await {
            CycleOutcome::Published(_) => {
                let snapshot = engine.current();
                match serde_json::to_writer_pretty(std::io::stdout().lock(), &*snapshot) {
                    Ok(()) => ExitCode::SUCCESS,
                    Err(err) => {
                        error!("{err}");
                        ExitCode::FAILURE
                    }
                }
            }
            CycleOutcome::Failed(_) | CycleOutcome::Skipped => ExitCode::FAILURE,
        };
    }

    if let Err(err) = engine.restore().await {
        error!("{err}");
    }

    if cli.refresh_now {
        engine.trigger_refresh();
    }

    tokio::select! {
        _ = settings.schedule().run(Arc::clone(&engine)) => (),
        res = tokio::signal::ctrl_c() => {
            if let Err(err) = res {
                error!("{err}, failed to listen for shutdown signal");
                return ExitCode::FAILURE;
            }
            info!("Shutting down");
        }
    }

    ExitCode::SUCCESS
}
