use clap::{Parser, Subcommand};

/// SkillScale — star-topology intent fabric over ZeroMQ
#[derive(Parser, Debug)]
#[command(name = "skillscale")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

/// Every flag mirrors a `SKILLSCALE_*` environment variable and overrides
/// it. Unknown flags are ignored so deployments can carry extra switches.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the central XPUB/XSUB proxy (plus the metrics endpoint)
    #[command(ignore_errors = true)]
    Proxy {
        /// Publisher-facing bind endpoint (SKILLSCALE_XSUB_BIND)
        #[arg(long, value_name = "ENDPOINT")]
        xsub_bind: Option<String>,

        /// Subscriber-facing bind endpoint (SKILLSCALE_XPUB_BIND)
        #[arg(long, value_name = "ENDPOINT")]
        xpub_bind: Option<String>,

        /// Metrics REP port (SKILLSCALE_METRICS_PORT)
        #[arg(long, value_name = "PORT")]
        metrics_port: Option<u16>,
    },

    /// Run a topic-subscribed skill server
    #[command(ignore_errors = true)]
    Serve {
        /// Topic to subscribe to (SKILLSCALE_TOPIC)
        #[arg(long, value_name = "TOPIC")]
        topic: Option<String>,

        /// Human-readable server description (SKILLSCALE_DESCRIPTION)
        #[arg(long)]
        description: Option<String>,

        /// Directory holding skills (SKILLSCALE_SKILLS_DIR)
        #[arg(long, value_name = "DIR")]
        skills_dir: Option<String>,

        /// Proxy XPUB endpoint to subscribe on (SKILLSCALE_PROXY_XPUB)
        #[arg(long, value_name = "ENDPOINT")]
        proxy_xpub: Option<String>,

        /// Proxy XSUB endpoint to publish on (SKILLSCALE_PROXY_XSUB)
        #[arg(long, value_name = "ENDPOINT")]
        proxy_xsub: Option<String>,

        /// Socket high-water mark in messages (SKILLSCALE_HWM)
        #[arg(long)]
        hwm: Option<i32>,

        /// Skill execution deadline in milliseconds (SKILLSCALE_TIMEOUT)
        #[arg(long, value_name = "MS")]
        timeout: Option<u64>,

        /// Number of concurrent executor threads (SKILLSCALE_WORKERS)
        #[arg(long)]
        workers: Option<usize>,

        /// Skill matcher: "llm" or "keyword" (SKILLSCALE_MATCHER)
        #[arg(long)]
        matcher: Option<String>,

        /// Custom prompt template for the llm matcher (SKILLSCALE_PROMPT_FILE)
        #[arg(long, value_name = "FILE")]
        prompt_file: Option<String>,

        /// Python executable for matcher/skill scripts (SKILLSCALE_PYTHON)
        #[arg(long, value_name = "BIN")]
        python: Option<String>,
    },
}
