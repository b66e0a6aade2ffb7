//! Process configuration: environment first, CLI flags on top.

use skillscale_core::config::{env_optional, env_or, env_parse};

pub const DEFAULT_XSUB_BIND: &str = "tcp://*:5444";
pub const DEFAULT_XPUB_BIND: &str = "tcp://*:5555";
pub const DEFAULT_METRICS_PORT: u16 = 9100;

pub const DEFAULT_PROXY_XPUB: &str = "tcp://127.0.0.1:5555";
pub const DEFAULT_PROXY_XSUB: &str = "tcp://127.0.0.1:5444";
pub const DEFAULT_TOPIC: &str = "TOPIC_DEFAULT";
pub const DEFAULT_SKILLS_DIR: &str = "./skills";
/// Skill execution deadline. The deployed fleet ran with 180 s.
pub const DEFAULT_TIMEOUT_MS: u64 = 180_000;
pub const DEFAULT_HWM: i32 = 10_000;
pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_HEARTBEAT_MS: i32 = 5_000;

/// Proxy process configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub xsub_bind: String,
    pub xpub_bind: String,
    pub metrics_port: u16,
}

impl ProxyConfig {
    pub fn from_env() -> Self {
        Self {
            xsub_bind: env_or("SKILLSCALE_XSUB_BIND", DEFAULT_XSUB_BIND),
            xpub_bind: env_or("SKILLSCALE_XPUB_BIND", DEFAULT_XPUB_BIND),
            metrics_port: env_parse("SKILLSCALE_METRICS_PORT", DEFAULT_METRICS_PORT),
        }
    }
}

/// Skill server configuration.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub topic: String,
    pub description: String,
    pub skills_dir: String,
    pub proxy_xpub: String,
    pub proxy_xsub: String,
    pub hwm: i32,
    pub heartbeat_ms: i32,
    pub timeout_ms: u64,
    pub workers: usize,
    pub matcher: String,
    pub prompt_file: Option<String>,
    pub python: String,
}

impl NodeConfig {
    pub fn from_env() -> Self {
        Self {
            topic: env_or("SKILLSCALE_TOPIC", DEFAULT_TOPIC),
            description: env_or("SKILLSCALE_DESCRIPTION", ""),
            skills_dir: env_or("SKILLSCALE_SKILLS_DIR", DEFAULT_SKILLS_DIR),
            proxy_xpub: env_or("SKILLSCALE_PROXY_XPUB", DEFAULT_PROXY_XPUB),
            proxy_xsub: env_or("SKILLSCALE_PROXY_XSUB", DEFAULT_PROXY_XSUB),
            hwm: env_parse("SKILLSCALE_HWM", DEFAULT_HWM),
            heartbeat_ms: DEFAULT_HEARTBEAT_MS,
            timeout_ms: env_parse("SKILLSCALE_TIMEOUT", DEFAULT_TIMEOUT_MS),
            workers: env_parse("SKILLSCALE_WORKERS", DEFAULT_WORKERS).max(1),
            matcher: env_or("SKILLSCALE_MATCHER", "llm"),
            prompt_file: env_optional("SKILLSCALE_PROMPT_FILE"),
            python: env_or("SKILLSCALE_PYTHON", "python3"),
        }
    }

    /// Depth of the bounded receive queue between the subscriber loop and
    /// the executors. Small on purpose: once it fills, back-pressure must
    /// reach the SUB socket quickly.
    pub fn queue_depth(&self) -> usize {
        (self.workers * 2).max(4)
    }
}
