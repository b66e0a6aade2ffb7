//! The central XPUB/XSUB proxy.
//!
//! A hand-rolled forwarder loop (instead of `zmq::proxy`) so every relayed
//! publication frame can be counted and the shutdown flag observed between
//! polls. Messages flow XSUB→XPUB; subscription frames flow XPUB→XSUB so
//! publishers filter at the source. XPUB verbose mode keeps duplicate
//! subscriptions flowing upstream: publishers see a true reference count
//! and stop sending only when the last subscriber leaves.

use anyhow::{Context, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use crate::config::ProxyConfig;

/// High-water mark on both proxy sockets, in messages.
const PROXY_HWM: i32 = 50_000;

/// Poll timeout; bounds shutdown latency.
const POLL_INTERVAL_MS: i64 = 250;

pub struct Proxy {
    xsub: zmq::Socket,
    xpub: zmq::Socket,
    forwarded: Arc<AtomicU64>,
}

impl Proxy {
    /// Bind both endpoints. Failure here is fatal for the process.
    pub fn bind(ctx: &zmq::Context, cfg: &ProxyConfig) -> Result<Self> {
        let xsub = ctx.socket(zmq::XSUB).context("Failed to create XSUB socket")?;
        xsub.set_rcvhwm(PROXY_HWM)?;
        xsub.set_sndhwm(PROXY_HWM)?;
        xsub.bind(&cfg.xsub_bind)
            .with_context(|| format!("Failed to bind XSUB endpoint {}", cfg.xsub_bind))?;

        let xpub = ctx.socket(zmq::XPUB).context("Failed to create XPUB socket")?;
        xpub.set_rcvhwm(PROXY_HWM)?;
        xpub.set_sndhwm(PROXY_HWM)?;
        // Verbose mode: re-emit duplicate subscriptions instead of coalescing.
        xpub.set_xpub_verbose(true)?;
        xpub.bind(&cfg.xpub_bind)
            .with_context(|| format!("Failed to bind XPUB endpoint {}", cfg.xpub_bind))?;

        Ok(Self {
            xsub,
            xpub,
            forwarded: Arc::new(AtomicU64::new(0)),
        })
    }

    /// Shared handle to the forwarded-frame counter (read by metrics).
    pub fn counter(&self) -> Arc<AtomicU64> {
        self.forwarded.clone()
    }

    /// Forwarder loop. Returns after the shutdown flag is observed.
    pub fn run(&self, shutdown: &AtomicBool) -> Result<()> {
        while !shutdown.load(Ordering::SeqCst) {
            let mut items = [
                self.xsub.as_poll_item(zmq::POLLIN),
                self.xpub.as_poll_item(zmq::POLLIN),
            ];
            zmq::poll(&mut items, POLL_INTERVAL_MS).context("Proxy poll failed")?;
            let (xsub_ready, xpub_ready) = (items[0].is_readable(), items[1].is_readable());
            drop(items);

            // XSUB → XPUB: published messages, counted per frame.
            if xsub_ready {
                shuttle(&self.xsub, &self.xpub, Some(&self.forwarded))?;
            }

            // XPUB → XSUB: subscription frames travel upstream, uncounted.
            if xpub_ready {
                shuttle(&self.xpub, &self.xsub, None)?;
            }
        }
        Ok(())
    }
}

/// Drain every available frame from `from` and re-emit on `to`, carrying
/// each frame's "more" bit so multi-frame boundaries survive the hop.
fn shuttle(from: &zmq::Socket, to: &zmq::Socket, counter: Option<&AtomicU64>) -> Result<()> {
    loop {
        let msg = match from.recv_bytes(zmq::DONTWAIT) {
            Ok(msg) => msg,
            Err(zmq::Error::EAGAIN) => return Ok(()),
            Err(err) => return Err(err).context("Proxy recv failed"),
        };
        let more = from.get_rcvmore()?;
        to.send(msg, if more { zmq::SNDMORE } else { 0 })
            .context("Proxy send failed")?;
        if let Some(counter) = counter {
            counter.fetch_add(1, Ordering::Relaxed);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn spawn_proxy(name: &str) -> (zmq::Context, ProxyConfig, Arc<AtomicU64>, Arc<AtomicBool>, thread::JoinHandle<Result<()>>) {
        let ctx = zmq::Context::new();
        let cfg = ProxyConfig {
            xsub_bind: format!("inproc://{}-xsub", name),
            xpub_bind: format!("inproc://{}-xpub", name),
            metrics_port: 0,
        };
        let proxy = Proxy::bind(&ctx, &cfg).expect("inproc bind should succeed");
        let counter = proxy.counter();
        let shutdown = Arc::new(AtomicBool::new(false));
        let flag = shutdown.clone();
        let handle = thread::spawn(move || proxy.run(&flag));
        (ctx, cfg, counter, shutdown, handle)
    }

    #[test]
    fn test_forwards_two_frame_messages_and_counts() {
        let (ctx, cfg, counter, shutdown, handle) = spawn_proxy("fwd");

        let publisher = ctx.socket(zmq::PUB).unwrap();
        publisher.connect(&cfg.xsub_bind).unwrap();

        let subscriber = ctx.socket(zmq::SUB).unwrap();
        subscriber.set_rcvtimeo(2_000).unwrap();
        subscriber.connect(&cfg.xpub_bind).unwrap();
        subscriber.set_subscribe(b"TOPIC_X").unwrap();

        // Let the subscription reach the publisher through the proxy.
        thread::sleep(Duration::from_millis(300));

        publisher.send("TOPIC_X", zmq::SNDMORE).unwrap();
        publisher.send("payload-1", 0).unwrap();

        let topic = subscriber.recv_bytes(0).expect("topic frame should arrive");
        assert_eq!(topic, b"TOPIC_X");
        assert!(subscriber.get_rcvmore().unwrap());
        let payload = subscriber.recv_bytes(0).unwrap();
        assert_eq!(payload, b"payload-1");
        assert!(!subscriber.get_rcvmore().unwrap());

        // Two publication frames relayed, subscription frames not counted.
        assert_eq!(counter.load(Ordering::Relaxed), 2);

        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap().unwrap();
    }

    #[test]
    fn test_subscriptions_are_forwarded_upstream() {
        let (ctx, cfg, _counter, shutdown, handle) = spawn_proxy("subs");

        // An XPUB "publisher" observes subscription frames arriving upstream.
        let publisher = ctx.socket(zmq::XPUB).unwrap();
        publisher.set_rcvtimeo(2_000).unwrap();
        publisher.connect(&cfg.xsub_bind).unwrap();

        let sub_a = ctx.socket(zmq::SUB).unwrap();
        sub_a.connect(&cfg.xpub_bind).unwrap();
        sub_a.set_subscribe(b"TOPIC_Y").unwrap();

        let frame = publisher.recv_bytes(0).expect("subscription should propagate");
        assert_eq!(frame, b"\x01TOPIC_Y");

        // Verbose mode: a second subscriber to the same topic is re-emitted,
        // not coalesced.
        let sub_b = ctx.socket(zmq::SUB).unwrap();
        sub_b.connect(&cfg.xpub_bind).unwrap();
        sub_b.set_subscribe(b"TOPIC_Y").unwrap();

        let frame = publisher.recv_bytes(0).expect("duplicate subscription should propagate");
        assert_eq!(frame, b"\x01TOPIC_Y");

        shutdown.store(true, Ordering::SeqCst);
        handle.join().unwrap().unwrap();
    }
}
