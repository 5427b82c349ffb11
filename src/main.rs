use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Result, WrapErr, eyre};
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use imgrelay::application::{RefreshScheduler, SchedulerState};
use imgrelay::domain::entities::LoadedImage;
use imgrelay::infrastructure::relay::{self, RelayState};
use imgrelay::infrastructure::{
    AppConfig, CliArgs, Command, PayloadSink, StorageManager, WatchTarget, build_image_stack,
};

fn init_logging(config: &AppConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.to_string()));

    if let Some(log_path) = &config.log_path {
        if let Some(parent) = log_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(log_path)?;

        let file_layer = fmt::layer()
            .with_writer(file)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(false);

        tracing_subscriber::registry()
            .with(filter)
            .with(file_layer)
            .init();

        info!(path = %log_path.display(), "Logging initialized");
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
            .init();
    }

    Ok(())
}

fn load_config(args: &CliArgs) -> Result<AppConfig> {
    let mut config = match &args.config {
        Some(path) => StorageManager::with_dir(PathBuf::new()).load_config(Some(path))?,
        None => StorageManager::new()?.load_config(None)?,
    };
    config.merge_with_args(args);
    Ok(config)
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutting down");
}

async fn serve(config: &AppConfig, bind: Option<SocketAddr>) -> Result<()> {
    let env = config.environment()?;
    if env.allowed_hosts.is_empty() {
        warn!("No allowed hosts configured; the relay will reject every request");
    }

    let state = RelayState::new(
        env.allowed_hosts.clone(),
        config.relay.timeout(),
        &config.relay.user_agent,
        env.relay_path.clone(),
    )?;
    let app = relay::router(state);

    let addr = bind.unwrap_or(config.relay.bind_addr);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .wrap_err_with(|| format!("failed to bind {addr}"))?;
    info!(
        addr = %addr,
        path = %env.relay_path,
        allowed_hosts = env.allowed_hosts.len(),
        "Relay listening"
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

fn describe(image: &LoadedImage) -> String {
    let strategy = image
        .strategy
        .map_or_else(|| "-".to_string(), |s| s.to_string());
    format!(
        "{} via {strategy}, {} bytes, {}",
        image.source,
        image.payload.len(),
        image.payload.content_type()
    )
}

async fn persist(sink: Option<&PayloadSink>, raw: &str, image: &LoadedImage) {
    if let Some(sink) = sink {
        match sink.write(image).await {
            Ok(path) => println!("    saved {}", path.display()),
            Err(e) => warn!(reference = raw, error = %e, "Failed to save payload"),
        }
    }
}

async fn fetch(
    config: &AppConfig,
    references: &[String],
    out: Option<PathBuf>,
    reload: bool,
) -> Result<()> {
    let env = Arc::new(config.environment()?);
    let stack = build_image_stack(env, &config.loader, &config.relay.user_agent)?;
    let sink = out.map(PayloadSink::new);
    let mut failed = 0usize;

    if reload {
        for raw in references {
            let report = stack.service.reload_with_report(raw).await;
            for attempt in &report.attempts {
                info!(
                    reference = %raw,
                    strategy = %attempt.strategy,
                    success = attempt.is_success(),
                    elapsed_ms = attempt.elapsed.as_millis(),
                    "Strategy attempt"
                );
            }
            match report.result {
                Ok(Some(image)) => {
                    println!("ok   {raw}: {}", describe(&image));
                    persist(sink.as_ref(), raw, &image).await;
                }
                Ok(None) => println!("skip {raw}: nothing to fetch"),
                Err(e) => {
                    failed += 1;
                    println!("fail {raw}: {e} after {} rounds", report.rounds);
                }
            }
        }
    } else {
        let results = stack.batch_loader().load_all(references).await;
        for raw in references {
            match results.get(raw).cloned().flatten() {
                Some(image) => {
                    println!("ok   {raw}: {}", describe(&image));
                    persist(sink.as_ref(), raw, &image).await;
                }
                None if raw.trim().is_empty() => println!("skip {raw:?}: nothing to fetch"),
                None => {
                    failed += 1;
                    println!("fail {raw}");
                }
            }
        }
    }

    info!(stats = %stack.cache.stats(), "Fetch finished");
    if failed > 0 {
        return Err(eyre!("{failed} of {} references failed", references.len()));
    }
    Ok(())
}

async fn watch(config: &AppConfig, references: Vec<String>, out: Option<PathBuf>) -> Result<()> {
    let env = Arc::new(config.environment()?);
    let stack = build_image_stack(env, &config.loader, &config.relay.user_agent)?;
    let sink = out.map(PayloadSink::new);

    let initial = stack.batch_loader().load_all(&references).await;
    for (raw, image) in &initial {
        if let Some(image) = image {
            persist(sink.as_ref(), raw, image).await;
        }
    }
    let loaded = initial.values().filter(|image| image.is_some()).count();
    info!(loaded, total = references.len(), "Initial load finished");

    let target = Arc::new(WatchTarget::new(references, sink));
    let scheduler = RefreshScheduler::new(
        stack.service.clone(),
        target.clone(),
        config.refresh.to_refresh_config(),
    );
    scheduler.start();

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);
    let mut poll = tokio::time::interval(Duration::from_secs(1));
    loop {
        tokio::select! {
            () = &mut shutdown => break,
            _ = poll.tick() => {
                if scheduler.state() == SchedulerState::CircuitOpen {
                    break;
                }
            }
        }
    }
    scheduler.stop();

    info!(applied = target.applied(), stats = %stack.cache.stats(), "Watch finished");
    if scheduler.state() == SchedulerState::CircuitOpen {
        return Err(eyre!(
            "refresh stopped after {} consecutive failed passes",
            scheduler.consecutive_failures()
        ));
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    dotenvy::dotenv().ok();

    let args = CliArgs::parse();
    let config = load_config(&args)?;
    init_logging(&config)?;

    info!(
        version = imgrelay::VERSION,
        environment = %config.environment,
        "Starting {}",
        imgrelay::NAME
    );

    match args.command {
        Command::Serve { bind } => serve(&config, bind).await,
        Command::Fetch {
            references,
            out,
            reload,
        } => fetch(&config, &references, out, reload).await,
        Command::Watch { references, out } => watch(&config, references, out).await,
    }
}
