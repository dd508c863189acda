//! `framefeed` - CLI for the live frame client
//!
//! This binary mounts a feed session against the configured snapshot endpoint
//! and acts as its presentation layer.

#![warn(missing_debug_implementations)]
#![deny(unsafe_code)]

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use clap::Parser;
use tracing::{debug, info};

use framefeed::cli::{
    Cli, Command, ConfigCommand, HealthCommand, OutputFormat, SnapshotCommand, WatchCommand,
};
use framefeed::{
    init_logging, write_frame, Config, FeedOptions, FeedSession, FrameFormat, FrameResult,
    FrameSource, HttpFrameFetcher,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging based on verbosity
    init_logging(cli.verbosity());

    // Load configuration
    let config = Config::load_from(cli.config.clone())?;

    match cli.command {
        Command::Watch(cmd) => handle_watch(&config, &cmd).await,
        Command::Snapshot(cmd) => handle_snapshot(&config, &cmd).await,
        Command::Health(cmd) => handle_health(&config, &cmd).await,
        Command::Config(cmd) => handle_config(&config, cmd),
    }
}

async fn handle_watch(config: &Config, cmd: &WatchCommand) -> anyhow::Result<()> {
    let fetcher = HttpFrameFetcher::from_config(config)?;
    info!(url = %fetcher.snapshot_url(), "Watching camera feed");

    let mut session = FeedSession::new(Arc::new(fetcher), FeedOptions::from_config(config));
    let registry = session.registry().clone();
    let mut views = session.subscribe();
    let started = Instant::now();
    session.mount()?;

    let stop = async {
        match cmd.duration {
            Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
            None => std::future::pending::<()>().await,
        }
    };
    let interrupt = tokio::signal::ctrl_c();
    tokio::pin!(stop, interrupt);

    let mut frames_written = 0u64;
    loop {
        tokio::select! {
            _ = &mut interrupt => {
                info!("Interrupted");
                break;
            }
            () = &mut stop => break,
            changed = views.changed() => {
                if changed.is_err() {
                    break;
                }
                let view = *views.borrow_and_update();
                // A handle can be superseded between the notification and this
                // lookup; resolve() then returns None and we wait for the next.
                let Some(frame) = view.handle().and_then(|id| registry.resolve(id)) else {
                    continue;
                };
                debug!(handle = %frame.id, format = %frame.format, len = frame.data.len(), "New frame");
                if let Some(path) = &cmd.output {
                    write_frame(path, &frame.data).await?;
                    frames_written += 1;
                }
            }
        }
    }

    session.unmount();
    let stats = session.stats();
    let elapsed = started.elapsed();

    match cmd.format {
        OutputFormat::Json => {
            let summary = serde_json::json!({
                "elapsed_ms": u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                "frames_written": frames_written,
                "stats": stats,
            });
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        OutputFormat::Plain => {
            let secs = elapsed.as_secs_f64().max(f64::EPSILON);
            #[allow(clippy::cast_precision_loss)]
            let fps = stats.frames_published as f64 / secs;
            println!("framefeed session");
            println!("-----------------");
            println!("Elapsed:        {secs:.1}s");
            println!("Frames:         {} ({fps:.1}/s)", stats.frames_published);
            println!("Failures:       {}", stats.failures);
            println!("Ticks:          {}", stats.ticks);
            println!("Ticks dropped:  {}", stats.ticks_dropped);
            println!("Late discards:  {}", stats.late_discards);
            if cmd.output.is_some() {
                println!("Frames written: {frames_written}");
            }
        }
    }
    Ok(())
}

async fn handle_snapshot(config: &Config, cmd: &SnapshotCommand) -> anyhow::Result<()> {
    let fetcher = HttpFrameFetcher::from_config(config)?;

    let data = match fetcher.fetch_frame().await {
        FrameResult::Bytes(data) => data,
        FrameResult::Failed(failure) => bail!("snapshot failed: {failure}"),
    };
    let Some(format) = FrameFormat::sniff(&data) else {
        bail!("snapshot is not a displayable image ({} bytes)", data.len());
    };

    write_frame(&cmd.output, &data).await?;
    println!(
        "Wrote {} bytes ({}) to {}",
        data.len(),
        format.mime_type(),
        cmd.output.display()
    );
    Ok(())
}

async fn handle_health(config: &Config, cmd: &HealthCommand) -> anyhow::Result<()> {
    let fetcher = HttpFrameFetcher::from_config(config)?;
    let url = config.health_url()?;
    let result = fetcher.health().await;

    if cmd.json {
        let status = serde_json::json!({
            "url": url.as_str(),
            "ok": result.is_ok(),
            "error": result.as_ref().err().map(ToString::to_string),
        });
        println!("{}", serde_json::to_string_pretty(&status)?);
    } else {
        match &result {
            Ok(()) => println!("{url}: ok"),
            Err(e) => println!("{url}: {e}"),
        }
    }

    result.with_context(|| format!("health check against {url} failed"))
}

fn handle_config(config: &Config, cmd: ConfigCommand) -> anyhow::Result<()> {
    match cmd {
        ConfigCommand::Show { json } => {
            if json {
                let mut shown = config.clone();
                shown.camera.token = config.camera.masked_token();
                println!("{}", serde_json::to_string_pretty(&shown)?);
            } else {
                println!("Current Configuration");
                println!("=====================");
                println!();
                println!("[Camera]");
                println!("  Base URL:           {}", config.camera.base_url);
                println!("  Token:              {}", config.camera.masked_token());
                println!("  Snapshot path:      {}", config.camera.snapshot_path);
                println!("  Health path:        {}", config.camera.health_path);
                println!();
                println!("[Poll]");
                println!("  Interval (ms):      {}", config.poll.interval_ms);
                match config.request_timeout() {
                    Some(timeout) => println!("  Request timeout:    {}ms", timeout.as_millis()),
                    None => println!("  Request timeout:    none"),
                }
            }
        }
        ConfigCommand::Path => {
            println!("{}", Config::default_config_path().display());
        }
        ConfigCommand::Validate { file } => {
            let path = file.unwrap_or_else(Config::default_config_path);
            println!("Validating configuration: {}", path.display());
            match Config::load_from(Some(path)) {
                Ok(_) => println!("Configuration is valid."),
                Err(e) => println!("Configuration error: {e}"),
            }
        }
    }
    Ok(())
}
