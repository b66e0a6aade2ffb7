//! The skill server: one SUB socket feeding a bounded queue drained by N
//! executor threads.
//!
//! The receiver is the only thread touching the SUB socket; each executor
//! owns its own PUB socket. Back-pressure is structural: when the queue is
//! full the receiver stops reading the socket and the transport's HWM takes
//! over upstream.

pub mod executor;
pub mod matcher;

use anyhow::{Context, Result};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::SendTimeoutError;

use skillscale_core::SkillRegistry;

use crate::config::NodeConfig;

/// A two-frame message as pulled off the SUB socket: (topic, payload).
pub type RawMessage = (Vec<u8>, Vec<u8>);

/// Poll timeout on the SUB socket; bounds shutdown latency.
const POLL_INTERVAL_MS: i64 = 250;

/// How long the subscription is given to propagate to publishers before the
/// node starts draining. Without this a late-joining node can miss the
/// first publications.
const SUBSCRIPTION_SETTLE: Duration = Duration::from_millis(500);

pub fn run(cfg: NodeConfig, shutdown: Arc<AtomicBool>) -> Result<()> {
    let registry = Arc::new(SkillRegistry::load(Path::new(&cfg.skills_dir)));
    if registry.is_empty() {
        tracing::warn!(dir = %cfg.skills_dir, "No skills loaded");
    }
    for (name, description) in registry.summaries() {
        tracing::info!(skill = %name, %description, "Registered skill");
    }

    let ctx = zmq::Context::new();
    let subscriber = connect_subscriber(&ctx, &cfg)?;
    tracing::info!(
        topic = %cfg.topic,
        description = %cfg.description,
        proxy_xpub = %cfg.proxy_xpub,
        proxy_xsub = %cfg.proxy_xsub,
        workers = cfg.workers,
        matcher = %cfg.matcher,
        timeout_ms = cfg.timeout_ms,
        "Skill server subscribed"
    );

    let (tx, rx) = crossbeam_channel::bounded::<RawMessage>(cfg.queue_depth());
    let matcher = matcher::for_config(&cfg, registry.clone());

    let mut executors = Vec::with_capacity(cfg.workers);
    for worker_id in 0..cfg.workers {
        let ctx = ctx.clone();
        let cfg = cfg.clone();
        let registry = registry.clone();
        let matcher = matcher.clone();
        let queue = rx.clone();
        let shutdown = shutdown.clone();
        executors.push(
            thread::Builder::new()
                .name(format!("executor-{}", worker_id))
                .spawn(move || {
                    executor::executor_loop(
                        worker_id, ctx, cfg, registry, matcher, queue, shutdown,
                    )
                })
                .context("Failed to spawn executor thread")?,
        );
    }
    drop(rx);

    // Late-joiner avoidance: give the subscription one beat to travel
    // through the proxy to every publisher.
    thread::sleep(SUBSCRIPTION_SETTLE);
    tracing::info!(topic = %cfg.topic, "Ready, listening for intents");

    receive_loop(&subscriber, &tx, &shutdown);

    // Closing the channel lets executors drain in-flight work and exit.
    drop(tx);
    for handle in executors {
        let _ = handle.join();
    }
    tracing::info!("Skill server stopped");
    Ok(())
}

fn connect_subscriber(ctx: &zmq::Context, cfg: &NodeConfig) -> Result<zmq::Socket> {
    let subscriber = ctx.socket(zmq::SUB).context("Failed to create SUB socket")?;
    subscriber.set_rcvhwm(cfg.hwm)?;
    subscriber.set_tcp_keepalive(1)?;
    subscriber.set_tcp_keepalive_idle(60)?;
    subscriber.set_heartbeat_ivl(cfg.heartbeat_ms)?;
    subscriber.set_heartbeat_ttl(cfg.heartbeat_ms * 3)?;
    subscriber.set_heartbeat_timeout(cfg.heartbeat_ms * 3)?;
    subscriber.set_reconnect_ivl(100)?;
    subscriber.set_reconnect_ivl_max(5_000)?;
    subscriber
        .connect(&cfg.proxy_xpub)
        .with_context(|| format!("Failed to connect to proxy XPUB {}", cfg.proxy_xpub))?;
    subscriber
        .set_subscribe(cfg.topic.as_bytes())
        .context("Failed to subscribe")?;
    Ok(subscriber)
}

/// Drain two-frame messages from the SUB socket into the bounded queue.
fn receive_loop(
    subscriber: &zmq::Socket,
    tx: &crossbeam_channel::Sender<RawMessage>,
    shutdown: &AtomicBool,
) {
    while !shutdown.load(Ordering::SeqCst) {
        let mut items = [subscriber.as_poll_item(zmq::POLLIN)];
        if let Err(err) = zmq::poll(&mut items, POLL_INTERVAL_MS) {
            tracing::error!(%err, "Subscriber poll failed");
            return;
        }
        if !items[0].is_readable() {
            continue;
        }
        drop(items);

        loop {
            let topic = match subscriber.recv_bytes(zmq::DONTWAIT) {
                Ok(frame) => frame,
                Err(zmq::Error::EAGAIN) => break,
                Err(err) => {
                    tracing::error!(%err, "Subscriber recv failed");
                    return;
                }
            };
            // A request is exactly two frames; anything else is dropped.
            let payload = match recv_final_frame(subscriber) {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    tracing::warn!("Dropping message with unexpected frame count");
                    continue;
                }
                Err(err) => {
                    tracing::error!(%err, "Subscriber recv failed");
                    return;
                }
            };

            if !enqueue(tx, (topic, payload), shutdown) {
                return;
            }
        }
    }
}

/// Receive the payload frame; `None` when the message is not exactly two
/// frames (remaining frames are consumed and discarded).
fn recv_final_frame(subscriber: &zmq::Socket) -> Result<Option<Vec<u8>>> {
    if !subscriber.get_rcvmore()? {
        return Ok(None);
    }
    let payload = subscriber.recv_bytes(0)?;
    if !subscriber.get_rcvmore()? {
        return Ok(Some(payload));
    }
    while subscriber.get_rcvmore()? {
        let _ = subscriber.recv_bytes(0)?;
    }
    Ok(None)
}

/// Blocking-send into the bounded queue while staying responsive to the
/// shutdown flag. While this retries, the SUB socket is not read — that is
/// the back-pressure. Returns false when the loop should exit.
fn enqueue(
    tx: &crossbeam_channel::Sender<RawMessage>,
    message: RawMessage,
    shutdown: &AtomicBool,
) -> bool {
    let mut pending = message;
    loop {
        match tx.send_timeout(pending, Duration::from_millis(250)) {
            Ok(()) => return true,
            Err(SendTimeoutError::Timeout(back)) => {
                if shutdown.load(Ordering::SeqCst) {
                    return false;
                }
                pending = back;
            }
            Err(SendTimeoutError::Disconnected(_)) => {
                tracing::error!("Executor queue disconnected");
                return false;
            }
        }
    }
}
