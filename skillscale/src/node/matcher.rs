//! Skill matching: map request text to a registered skill name.
//!
//! Matching is pluggable behind [`SkillMatcher`]. A hint naming a
//! registered skill always wins; past that, the keyword matcher scores
//! token overlap locally while the llm matcher defers to an external
//! Python helper. Returning `None` is not an error — the caller falls back
//! to the registry's single skill, or replies unknown-skill.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;

use skillscale_core::SkillRegistry;

use crate::config::NodeConfig;

/// Deadline for the matcher helper subprocess; independent of the (much
/// longer) skill execution deadline.
const MATCH_DEADLINE_MS: u64 = 30_000;

pub trait SkillMatcher: Send + Sync {
    /// Resolve `intent` (plus an optional caller hint) to a skill name.
    fn resolve(&self, intent: &str, hint: Option<&str>) -> Option<String>;
}

/// Build the matcher selected by `SKILLSCALE_MATCHER`.
pub fn for_config(cfg: &NodeConfig, registry: Arc<SkillRegistry>) -> Arc<dyn SkillMatcher> {
    match cfg.matcher.as_str() {
        "keyword" => Arc::new(KeywordMatcher::new(registry)),
        other => {
            if other != "llm" {
                tracing::warn!(matcher = other, "Unknown matcher, using llm");
            }
            Arc::new(LlmMatcher::new(cfg, registry))
        }
    }
}

fn resolve_hint(registry: &SkillRegistry, hint: Option<&str>) -> Option<String> {
    let hint = hint?.trim();
    if hint.is_empty() {
        return None;
    }
    registry.find(hint).map(|s| s.name)
}

// ─── Keyword matcher ─────────────────────────────────────────────────────────

/// Local scorer: tokenize the request and each skill's name + description,
/// drop stopwords, 3 points per exact token match, 1 per substring match.
/// Highest positive score wins.
pub struct KeywordMatcher {
    registry: Arc<SkillRegistry>,
}

impl KeywordMatcher {
    pub fn new(registry: Arc<SkillRegistry>) -> Self {
        Self { registry }
    }
}

impl SkillMatcher for KeywordMatcher {
    fn resolve(&self, intent: &str, hint: Option<&str>) -> Option<String> {
        if let Some(name) = resolve_hint(&self.registry, hint) {
            return Some(name);
        }

        let text_tokens = tokenize(intent);
        if text_tokens.is_empty() {
            return None;
        }

        let mut best: Option<(String, u32)> = None;
        for (name, description) in self.registry.summaries() {
            let mut keywords = tokenize(&name);
            keywords.extend(tokenize(&description));
            let score = keyword_score(&text_tokens, &keywords);
            tracing::debug!(skill = %name, score, "Keyword match score");
            if score > 0 && best.as_ref().map_or(true, |(_, s)| score > *s) {
                best = Some((name, score));
            }
        }

        best.map(|(name, score)| {
            tracing::info!(skill = %name, score, "Keyword matcher selected skill");
            name
        })
    }
}

const STOPWORDS: &[&str] = &[
    "a", "an", "the", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
    "do", "does", "did", "will", "would", "could", "should", "may", "might", "can", "shall",
    "to", "of", "in", "for", "on", "with", "at", "by", "from", "as", "into", "through",
    "during", "before", "after", "and", "but", "or", "nor", "not", "so", "yet", "both",
    "either", "neither", "each", "every", "all", "any", "few", "more", "most", "other", "some",
    "such", "no", "only", "own", "same", "than", "too", "very", "just", "because", "it", "its",
    "this", "that", "these", "those", "i", "me", "my", "we", "our", "you", "your", "he", "she",
    "they", "them", "what", "which", "who", "whom", "how", "when", "where", "why", "if",
    "then", "else", "about", "up", "out", "off", "over", "under", "again", "further", "once",
    "here", "there", "also", "please", "need", "want", "help", "using",
];

fn tokenize(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut word = String::new();
    for c in text.chars() {
        if c.is_alphanumeric() {
            word.extend(c.to_lowercase());
        } else if !word.is_empty() {
            tokens.push(std::mem::take(&mut word));
        }
    }
    if !word.is_empty() {
        tokens.push(word);
    }
    tokens
}

fn keyword_score(text_tokens: &[String], keyword_tokens: &[String]) -> u32 {
    let stopwords: HashSet<&str> = STOPWORDS.iter().copied().collect();
    let text_set: HashSet<&str> = text_tokens
        .iter()
        .map(String::as_str)
        .filter(|t| !stopwords.contains(t))
        .collect();

    let mut score = 0;
    for kw in keyword_tokens {
        if stopwords.contains(kw.as_str()) {
            continue;
        }
        if text_set.contains(kw.as_str()) {
            score += 3;
            continue;
        }
        if text_set
            .iter()
            .any(|t| t.contains(kw.as_str()) || kw.contains(t))
        {
            score += 1;
        }
    }
    score
}

// ─── LLM matcher ─────────────────────────────────────────────────────────────

/// Defers the decision to `scripts/llm_match.py`, fed
/// `{task, skills, prompt_file?}` on stdin; the helper prints the matched
/// name or `none`. Helper failure degrades to no-match.
pub struct LlmMatcher {
    registry: Arc<SkillRegistry>,
    python: String,
    script: PathBuf,
    prompt_file: Option<String>,
}

impl LlmMatcher {
    pub fn new(cfg: &NodeConfig, registry: Arc<SkillRegistry>) -> Self {
        // The helper ships next to the skills tree, as deployed.
        let script = PathBuf::from(&cfg.skills_dir)
            .join("..")
            .join("scripts")
            .join("llm_match.py");
        Self {
            registry,
            python: cfg.python.clone(),
            script,
            prompt_file: cfg.prompt_file.clone(),
        }
    }
}

impl SkillMatcher for LlmMatcher {
    fn resolve(&self, intent: &str, hint: Option<&str>) -> Option<String> {
        if let Some(name) = resolve_hint(&self.registry, hint) {
            return Some(name);
        }

        let summaries = self.registry.summaries();
        if summaries.is_empty() {
            return None;
        }

        let skills: Vec<_> = summaries
            .iter()
            .map(|(name, description)| {
                serde_json::json!({ "name": name, "description": description })
            })
            .collect();
        let mut request = serde_json::json!({ "task": intent, "skills": skills });
        if let Some(ref prompt_file) = self.prompt_file {
            request["prompt_file"] = serde_json::Value::String(prompt_file.clone());
        }

        let command = format!("{} {}", self.python, self.script.display());
        let result = skillscale_runner::run_subprocess(
            &command,
            None,
            &request.to_string(),
            MATCH_DEADLINE_MS,
            &[],
        );

        if !result.success {
            tracing::warn!(
                exit_code = result.exit_code,
                stderr = %result.stderr.trim(),
                "LLM matcher helper failed"
            );
            return None;
        }

        let answer = result.stdout.trim();
        if answer.is_empty() || answer.eq_ignore_ascii_case("none") {
            return None;
        }
        match self.registry.find(answer) {
            Some(skill) => {
                tracing::info!(skill = %skill.name, "LLM matcher selected skill");
                Some(skill.name)
            }
            None => {
                tracing::warn!(answer, "LLM matcher returned unknown skill name");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::Path;

    fn registry_with(skills: &[(&str, &str)]) -> Arc<SkillRegistry> {
        let tmp = tempfile::tempdir().unwrap();
        for (name, description) in skills {
            let dir = tmp.path().join(name);
            fs::create_dir_all(&dir).unwrap();
            fs::write(
                dir.join("SKILL.md"),
                format!("---\nname: {}\ndescription: {}\n---\nbody\n", name, description),
            )
            .unwrap();
        }
        let registry = Arc::new(SkillRegistry::load(tmp.path()));
        // The tempdir may be dropped; all details were loaded eagerly.
        assert_eq!(registry.len(), skills.len());
        registry
    }

    #[test]
    fn test_tokenize_lowercases_and_splits() {
        assert_eq!(tokenize("Analyze my CSV-file!"), ["analyze", "my", "csv", "file"]);
        assert!(tokenize("  ,.;  ").is_empty());
    }

    #[test]
    fn test_keyword_score_exact_beats_substring() {
        let text = tokenize("summarize this article");
        let exact = keyword_score(&text, &tokenize("summarize text"));
        let partial = keyword_score(&text, &tokenize("summariz"));
        assert!(exact > partial);
        assert!(partial > 0);
    }

    #[test]
    fn test_keyword_matcher_picks_best_skill() {
        let registry = registry_with(&[
            ("csv-analyzer", "Analyzes CSV data files and computes statistics"),
            ("text-summarizer", "Summarizes long text into a few sentences"),
        ]);
        let matcher = KeywordMatcher::new(registry);

        assert_eq!(
            matcher.resolve("please summarize this long text for me", None),
            Some("text-summarizer".to_string())
        );
        assert_eq!(
            matcher.resolve("compute statistics over my csv data", None),
            Some("csv-analyzer".to_string())
        );
    }

    #[test]
    fn test_keyword_matcher_no_overlap_is_none() {
        let registry = registry_with(&[("csv-analyzer", "Analyzes CSV data")]);
        let matcher = KeywordMatcher::new(registry);
        assert_eq!(matcher.resolve("qqqq zzzz", None), None);
    }

    #[test]
    fn test_hint_overrides_scoring() {
        let registry = registry_with(&[
            ("csv-analyzer", "Analyzes CSV data"),
            ("text-summarizer", "Summarizes text"),
        ]);
        let matcher = KeywordMatcher::new(registry);
        assert_eq!(
            matcher.resolve("summarize this text", Some("CSV-Analyzer")),
            Some("csv-analyzer".to_string())
        );
        // Hints that name nothing fall through to scoring.
        assert_eq!(
            matcher.resolve("summarize this text", Some("nope")),
            Some("text-summarizer".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_llm_matcher_helper_round_trip() {
        let tmp = tempfile::tempdir().unwrap();
        let skills_dir = tmp.path().join("skills");
        let dir = skills_dir.join("echo-skill");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            "---\nname: echo-skill\ndescription: Echoes input\n---\nbody\n",
        )
        .unwrap();

        // Stand-in helper: always answers with the first skill name.
        let scripts = tmp.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        write_helper(
            &scripts.join("llm_match.py"),
            "import json,sys\nprint(json.load(sys.stdin)['skills'][0]['name'], end='')\n",
        );

        let registry = Arc::new(SkillRegistry::load(&skills_dir));
        let cfg = test_config(&skills_dir);
        let matcher = LlmMatcher::new(&cfg, registry);

        // Helper requires python3; skip quietly where it is missing.
        if !python_available() {
            return;
        }
        assert_eq!(
            matcher.resolve("anything at all", None),
            Some("echo-skill".to_string())
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_llm_matcher_none_answer_is_no_match() {
        let tmp = tempfile::tempdir().unwrap();
        let skills_dir = tmp.path().join("skills");
        let dir = skills_dir.join("echo-skill");
        fs::create_dir_all(&dir).unwrap();
        fs::write(
            dir.join("SKILL.md"),
            "---\nname: echo-skill\ndescription: Echoes input\n---\nbody\n",
        )
        .unwrap();
        let scripts = tmp.path().join("scripts");
        fs::create_dir_all(&scripts).unwrap();
        write_helper(&scripts.join("llm_match.py"), "print('none', end='')\n");

        let registry = Arc::new(SkillRegistry::load(&skills_dir));
        let cfg = test_config(&skills_dir);
        let matcher = LlmMatcher::new(&cfg, registry);

        if !python_available() {
            return;
        }
        assert_eq!(matcher.resolve("anything", None), None);
    }

    #[cfg(unix)]
    fn write_helper(path: &Path, body: &str) {
        fs::write(path, body).unwrap();
    }

    #[cfg(unix)]
    fn python_available() -> bool {
        skillscale_runner::run_subprocess("python3 -c 'pass'", None, "", 10_000, &[]).success
    }

    #[cfg(unix)]
    fn test_config(skills_dir: &Path) -> NodeConfig {
        let mut cfg = NodeConfig::from_env();
        cfg.skills_dir = skills_dir.to_string_lossy().to_string();
        cfg.python = "python3".to_string();
        cfg
    }
}
