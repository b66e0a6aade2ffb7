//! Executor: the per-request dispatch pipeline.
//!
//! Each executor thread owns a PUB socket back to the proxy (sockets are
//! never shared across threads) and pulls two-frame messages from the
//! bounded queue until shutdown.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use serde_json::Value;

use skillscale_core::{observability, parse_request, serialize_reply, Reply, Skill, SkillRegistry};
use skillscale_runner::ExecutionResult;

use crate::config::NodeConfig;
use crate::node::matcher::SkillMatcher;
use crate::node::RawMessage;

/// Queue poll timeout; bounds shutdown latency.
const RECV_TIMEOUT: Duration = Duration::from_millis(500);

pub fn executor_loop(
    worker_id: usize,
    ctx: zmq::Context,
    cfg: NodeConfig,
    registry: Arc<SkillRegistry>,
    matcher: Arc<dyn SkillMatcher>,
    queue: Receiver<RawMessage>,
    shutdown: Arc<AtomicBool>,
) {
    let publisher = match connect_publisher(&ctx, &cfg) {
        Ok(socket) => socket,
        Err(err) => {
            tracing::error!(worker_id, %err, "Executor could not connect publisher socket");
            return;
        }
    };

    while !shutdown.load(Ordering::SeqCst) {
        let (topic, payload) = match queue.recv_timeout(RECV_TIMEOUT) {
            Ok(msg) => msg,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        handle_message(&cfg, &registry, matcher.as_ref(), &publisher, &topic, &payload);
    }

    tracing::debug!(worker_id, "Executor stopped");
}

fn connect_publisher(ctx: &zmq::Context, cfg: &NodeConfig) -> anyhow::Result<zmq::Socket> {
    let publisher = ctx.socket(zmq::PUB)?;
    publisher.set_sndhwm(cfg.hwm)?;
    publisher.set_linger(1_000)?;
    publisher.connect(&cfg.proxy_xsub)?;
    Ok(publisher)
}

fn handle_message(
    cfg: &NodeConfig,
    registry: &SkillRegistry,
    matcher: &dyn SkillMatcher,
    publisher: &zmq::Socket,
    topic: &[u8],
    payload: &[u8],
) {
    let request = match parse_request(topic, payload) {
        Ok(request) => request,
        Err(err) => {
            // Invalid requests never get a reply.
            tracing::warn!(%err, "Dropping invalid request");
            return;
        }
    };

    tracing::info!(
        request_id = %request.request_id,
        intent = %truncate(&request.intent, 80),
        "Processing request"
    );

    let reply = dispatch(cfg, registry, matcher, &request.topic, &request);
    publish_reply(publisher, &reply);
}

/// Resolve a skill for the request, execute it, build the reply.
pub fn dispatch(
    cfg: &NodeConfig,
    registry: &SkillRegistry,
    matcher: &dyn SkillMatcher,
    topic: &str,
    request: &skillscale_core::Request,
) -> Reply {
    let (exec_input, hint) = extract_intent(&request.intent);

    let resolved = matcher
        .resolve(&exec_input, hint.as_deref())
        .or_else(|| registry.single_skill());

    let Some(name) = resolved else {
        return Reply::error(
            &request.request_id,
            &request.reply_to,
            format!("No matching skill found for topic: {}", topic),
        );
    };

    // Progressive disclosure: the first request for a skill loads its body.
    let Some(skill) = registry.ensure_details(&name) else {
        return Reply::error(
            &request.request_id,
            &request.reply_to,
            format!("No matching skill found for topic: {}", topic),
        );
    };

    let result = execute_skill(cfg, &skill, &exec_input, &request.request_id);
    tracing::info!(
        skill = %skill.name,
        exit_code = result.exit_code,
        elapsed_ms = result.elapsed.as_millis() as u64,
        "Execution finished"
    );

    if result.success {
        Reply::success(&request.request_id, &request.reply_to, result.stdout)
    } else {
        Reply::error(
            &request.request_id,
            &request.reply_to,
            format!(
                "Skill execution failed (exit={}): {}",
                result.exit_code, result.stderr
            ),
        )
    }
}

/// Pull the child's input out of the intent.
///
/// A JSON-object intent may carry the payload under `data` (preferred) or
/// `task`, plus a `skill` hint. Anything else is treated as plain text.
pub fn extract_intent(intent: &str) -> (String, Option<String>) {
    let Ok(Value::Object(obj)) = serde_json::from_str::<Value>(intent) else {
        return (intent.to_string(), None);
    };

    let input = obj
        .get("data")
        .and_then(Value::as_str)
        .or_else(|| obj.get("task").and_then(Value::as_str))
        .map(str::to_string)
        .unwrap_or_else(|| intent.to_string());
    let hint = obj
        .get("skill")
        .and_then(Value::as_str)
        .map(str::to_string);

    (input, hint)
}

/// Run the skill's entry point as a child process.
///
/// Strategy: `scripts/run.sh` via bash, then `scripts/run.py` via the
/// configured python, then the `openskills` CLI — and when that CLI is not
/// installed (shell exit 127), fall back to returning the loaded SKILL.md
/// instructions verbatim.
fn execute_skill(
    cfg: &NodeConfig,
    skill: &Skill,
    input: &str,
    request_id: &str,
) -> ExecutionResult {
    let command = if skill.base_dir.join("scripts/run.sh").exists() {
        "bash scripts/run.sh".to_string()
    } else if skill.base_dir.join("scripts/run.py").exists() {
        format!("{} scripts/run.py", cfg.python)
    } else {
        format!("npx openskills read {}", skill.name)
    };

    observability::audit_execution_started(
        &skill.name,
        request_id,
        &command,
        skill.base_dir.to_string_lossy().as_ref(),
    );

    let mut result = run_in_skill_dir(&command, &skill.base_dir, input, cfg.timeout_ms);

    // openskills CLI absent: serve the instruction text instead.
    if !result.success && result.exit_code == 127 && command.starts_with("npx openskills") {
        tracing::info!(skill = %skill.name, "openskills CLI not found, returning raw instructions");
        result = ExecutionResult {
            exit_code: 0,
            success: true,
            stdout: skill.instructions.clone(),
            stderr: String::new(),
            elapsed: result.elapsed,
            matched_skill: String::new(),
        };
    }

    result.matched_skill = skill.name.clone();
    observability::audit_execution_completed(
        &skill.name,
        request_id,
        result.exit_code,
        result.elapsed.as_millis() as u64,
        result.stdout.len(),
    );
    result
}

fn run_in_skill_dir(
    command: &str,
    base_dir: &Path,
    input: &str,
    timeout_ms: u64,
) -> ExecutionResult {
    let working_dir = if base_dir.as_os_str().is_empty() {
        None
    } else {
        Some(base_dir)
    };
    skillscale_runner::run_subprocess(command, working_dir, input, timeout_ms, &[])
}

/// Publish the reply: topic frame, then payload. Send failures are logged
/// and swallowed — losing one reply must not take the executor down.
fn publish_reply(publisher: &zmq::Socket, reply: &Reply) {
    let (topic, payload) = serialize_reply(reply);
    let sent = publisher
        .send(topic.as_slice(), zmq::SNDMORE)
        .and_then(|_| publisher.send(payload.as_slice(), 0));
    match sent {
        Ok(()) => {
            tracing::info!(reply_to = %reply.reply_to, request_id = %reply.request_id, "Published reply")
        }
        Err(err) => {
            tracing::error!(%err, request_id = %reply.request_id, "Failed to publish reply")
        }
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
