//! SkillScale core — the shared "currency" between the proxy and skill
//! server binaries: the two-frame envelope codec, the skill registry with
//! progressive disclosure, env-driven configuration helpers, and
//! observability (tracing init + audit log).

pub mod config;
pub mod envelope;
pub mod observability;
pub mod skill;

pub use envelope::{parse_request, serialize_reply, ParseError, Reply, Request, Status};
pub use skill::{Skill, SkillRegistry};
