mod cli;
mod config;
mod metrics;
mod node;
mod proxy;

use anyhow::{Context, Result};
use clap::Parser;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use cli::{Cli, Commands};
use config::{NodeConfig, ProxyConfig};
use skillscale_core::observability;

fn main() -> Result<()> {
    observability::init_tracing();
    let cli = Cli::parse();

    // One process-wide flag; SIGINT/SIGTERM handlers only set it, every
    // loop notices within its poll interval.
    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = shutdown.clone();
    ctrlc::set_handler(move || {
        tracing::info!("Shutdown signal received");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install signal handler")?;

    match cli.command {
        Commands::Proxy {
            xsub_bind,
            xpub_bind,
            metrics_port,
        } => {
            let mut cfg = ProxyConfig::from_env();
            if let Some(v) = xsub_bind {
                cfg.xsub_bind = v;
            }
            if let Some(v) = xpub_bind {
                cfg.xpub_bind = v;
            }
            if let Some(v) = metrics_port {
                cfg.metrics_port = v;
            }
            run_proxy(cfg, shutdown)
        }
        Commands::Serve {
            topic,
            description,
            skills_dir,
            proxy_xpub,
            proxy_xsub,
            hwm,
            timeout,
            workers,
            matcher,
            prompt_file,
            python,
        } => {
            let mut cfg = NodeConfig::from_env();
            if let Some(v) = topic {
                cfg.topic = v;
            }
            if let Some(v) = description {
                cfg.description = v;
            }
            if let Some(v) = skills_dir {
                cfg.skills_dir = v;
            }
            if let Some(v) = proxy_xpub {
                cfg.proxy_xpub = v;
            }
            if let Some(v) = proxy_xsub {
                cfg.proxy_xsub = v;
            }
            if let Some(v) = hwm {
                cfg.hwm = v;
            }
            if let Some(v) = timeout {
                cfg.timeout_ms = v;
            }
            if let Some(v) = workers {
                cfg.workers = v.max(1);
            }
            if let Some(v) = matcher {
                cfg.matcher = v;
            }
            if prompt_file.is_some() {
                cfg.prompt_file = prompt_file;
            }
            if let Some(v) = python {
                cfg.python = v;
            }
            node::run(cfg, shutdown)
        }
    }
}

/// Bind both proxy endpoints plus the metrics endpoint, then run the
/// forwarder on this thread and metrics on its own. Bind failures are
/// fatal; everything after start-up is best-effort until the signal.
fn run_proxy(cfg: ProxyConfig, shutdown: Arc<AtomicBool>) -> Result<()> {
    let ctx = zmq::Context::new();

    let forwarder = proxy::Proxy::bind(&ctx, &cfg)?;
    let counter = forwarder.counter();

    let metrics_bind = format!("tcp://*:{}", cfg.metrics_port);
    let metrics_server = metrics::MetricsServer::bind(&ctx, &metrics_bind, counter)?;

    tracing::info!(
        xsub = %cfg.xsub_bind,
        xpub = %cfg.xpub_bind,
        metrics = %metrics_bind,
        "Proxy sockets bound, starting forwarder"
    );

    let metrics_shutdown = shutdown.clone();
    let metrics_handle = thread::Builder::new()
        .name("metrics".to_string())
        .spawn(move || {
            if let Err(err) = metrics_server.run(&metrics_shutdown) {
                tracing::error!(%err, "Metrics endpoint failed");
            }
        })
        .context("Failed to spawn metrics thread")?;

    let result = forwarder.run(&shutdown);

    // Whether the forwarder exited cleanly or not, let metrics wind down.
    shutdown.store(true, Ordering::SeqCst);
    let _ = metrics_handle.join();
    tracing::info!("Proxy stopped");
    result
}
