//! Environment variable helpers.
//!
//! All SkillScale configuration is environment-first (Kubernetes-friendly),
//! with CLI flags layered on top by the binaries. The lookup logic lives
//! here so the fallback chain is written once.

use std::env;
use std::str::FromStr;

/// Read `key`, falling back to `default` when unset or empty.
pub fn env_or(key: &str, default: &str) -> String {
    env::var(key)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

/// Read `key` as an `Option`, treating empty values as unset.
pub fn env_optional(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|s| {
        let s = s.trim().to_string();
        if s.is_empty() {
            None
        } else {
            Some(s)
        }
    })
}

/// Read and parse `key`; unset, empty, or unparseable values yield `default`.
pub fn env_parse<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|s| s.trim().parse::<T>().ok())
        .unwrap_or(default)
}

/// Boolean env var: `1`/`true`/`yes` (case-insensitive) are true.
pub fn env_flag(key: &str) -> bool {
    env::var(key)
        .map(|v| {
            let v = v.trim().to_lowercase();
            v == "1" || v == "true" || v == "yes"
        })
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_env_or_default() {
        assert_eq!(env_or("SKILLSCALE_TEST_UNSET_VAR", "fallback"), "fallback");
    }

    #[test]
    fn test_env_parse_default_on_garbage() {
        std::env::set_var("SKILLSCALE_TEST_PARSE_VAR", "not-a-number");
        assert_eq!(env_parse("SKILLSCALE_TEST_PARSE_VAR", 42u64), 42);
        std::env::remove_var("SKILLSCALE_TEST_PARSE_VAR");
    }

    #[test]
    fn test_env_flag() {
        std::env::set_var("SKILLSCALE_TEST_FLAG_VAR", "YES");
        assert!(env_flag("SKILLSCALE_TEST_FLAG_VAR"));
        std::env::remove_var("SKILLSCALE_TEST_FLAG_VAR");
        assert!(!env_flag("SKILLSCALE_TEST_FLAG_VAR"));
    }
}
