//! Prometheus-style metrics over a REP socket.
//!
//! Any request body gets a plain-text snapshot of the proxy's forwarded
//! message counter. Runs on its own thread with the shared shutdown flag.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// Poll timeout; bounds shutdown latency.
const POLL_INTERVAL_MS: i64 = 500;

/// Render the exposition body for a counter value.
pub fn render_snapshot(forwarded: u64) -> String {
    format!(
        "# HELP skillscale_proxy_messages_total Total messages forwarded\n\
         # TYPE skillscale_proxy_messages_total counter\n\
         skillscale_proxy_messages_total {}\n",
        forwarded
    )
}

pub struct MetricsServer {
    rep: zmq::Socket,
    counter: Arc<AtomicU64>,
}

impl MetricsServer {
    /// Bind the REP endpoint. Failure here is fatal for the process.
    pub fn bind(ctx: &zmq::Context, endpoint: &str, counter: Arc<AtomicU64>) -> Result<Self> {
        let rep = ctx.socket(zmq::REP).context("Failed to create REP socket")?;
        rep.bind(endpoint)
            .with_context(|| format!("Failed to bind metrics endpoint {}", endpoint))?;
        Ok(Self { rep, counter })
    }

    /// Request/reply loop. The request content is ignored.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            let mut items = [self.rep.as_poll_item(zmq::POLLIN)];
            zmq::poll(&mut items, POLL_INTERVAL_MS).context("Metrics poll failed")?;
            if !items[0].is_readable() {
                continue;
            }
            drop(items);

            match self.rep.recv_bytes(zmq::DONTWAIT) {
                Ok(_) => {
                    // REP requires the whole request consumed before replying.
                    while self.rep.get_rcvmore()? {
                        let _ = self.rep.recv_bytes(0)?;
                    }
                    let body = render_snapshot(self.counter.load(Ordering::Relaxed));
                    if let Err(err) = self.rep.send(body.as_bytes(), 0) {
                        tracing::warn!(%err, "Failed to send metrics reply");
                    }
                }
                Err(zmq::Error::EAGAIN) => {}
                Err(err) => return Err(err).context("Metrics recv failed"),
            }
        }
        Ok(())
    }
}
