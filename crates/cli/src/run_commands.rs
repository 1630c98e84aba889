//! `danmu run`: connect to one room and feed every event through the
//! configured pipelines until Ctrl-C.

use std::{sync::Arc, time::Duration};

use {
    anyhow::{Result, bail},
    clap::Args,
    danmu_client::{Status, StreamClient, StreamConfig},
    danmu_config::{DanmuConfig, ReconnectConfig},
    danmu_pipeline::{PipelineManager, build_pipelines, default_plugin_entries},
    tokio::sync::mpsc,
    tracing::{info, warn},
};

use crate::{registry::build_registry, service_commands::control_client};

const PRINTER_DRAIN_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Args)]
pub struct RunArgs {
    /// Platform name, e.g. `bilibili`.
    #[arg(long)]
    pub platform: String,
    /// Room id on that platform.
    #[arg(long)]
    pub rid: String,
    /// Stream URL (overrides `{server.ws_address}/{platform}/{rid}`).
    #[arg(long)]
    pub url: Option<String>,
    /// Ask the control plane to start capturing the room first.
    #[arg(long)]
    pub start_service: bool,
    /// Login cookie sent with `--start-service`.
    #[arg(long, env = "DANMU_COOKIE")]
    pub cookie: Option<String>,
}

pub fn stream_config(url: String, reconnect: &ReconnectConfig) -> StreamConfig {
    StreamConfig {
        reconnect: reconnect.enabled,
        reconnect_delay: Duration::from_secs(reconnect.delay_secs),
        max_retries: reconnect.max_retries,
        read_timeout: Duration::from_secs(reconnect.read_timeout_secs),
        ..StreamConfig::new(url)
    }
}

pub async fn handle_run(args: RunArgs, config: DanmuConfig) -> Result<()> {
    if args.start_service {
        let service = control_client(&config.server)?
            .start_service(&args.platform, &args.rid, args.cookie.as_deref())
            .await?;
        info!(platform = %service.platform, rid = %service.rid, "capture service started");
    }

    let (lines_tx, mut lines_rx) = mpsc::unbounded_channel::<String>();
    let printer = tokio::spawn(async move {
        while let Some(line) = lines_rx.recv().await {
            println!("{line}");
        }
    });

    let registry = build_registry(Some(lines_tx))?;
    let entries = if config.pipeline.plugins.is_empty() {
        default_plugin_entries(&registry)
    } else {
        config.pipeline.plugins.clone()
    };
    let report = build_pipelines(&registry, &entries).await;
    for failure in &report.failures {
        warn!(plugin = %failure.entry, error = %failure.error, "pipeline skipped");
    }
    let manager = Arc::new(report.manager);
    if manager.is_empty() {
        bail!("no pipeline could be built; check the plugin configuration");
    }
    info!(pipelines = ?manager.names(), "pipelines ready");

    let url = args
        .url
        .unwrap_or_else(|| config.server.stream_url(&args.platform, &args.rid));
    let reconnect = config.reconnect.enabled;
    let dispatcher = Arc::clone(&manager);
    let client = StreamClient::new(stream_config(url, &config.reconnect), move |envelope| {
        dispatcher.dispatch(envelope);
    });

    if let Err(e) = client.start().await {
        manager.shutdown().await;
        return Err(e.into());
    }

    let mut status = client.subscribe();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            },
            changed = status.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = *status.borrow_and_update();
                info!(status = ?current, "stream status changed");
                if current == Status::Closed || (!reconnect && current == Status::Disconnected) {
                    break;
                }
            },
        }
    }

    client.close().await;
    manager.shutdown().await;
    // Dropping every owner of the terminal sink lets the printer drain.
    drop(client);
    drop(manager);
    drop(registry);
    let _ = tokio::time::timeout(PRINTER_DRAIN_TIMEOUT, printer).await;
    Ok(())
}
