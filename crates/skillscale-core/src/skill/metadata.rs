//! SKILL.md parsing: YAML front matter plus the markdown body.
//!
//! The front matter follows the Agent Skills convention (`name`,
//! `description`, optional `license` / `compatibility`); the body is the
//! skill's instruction text, handed to the child verbatim when no runnable
//! script exists.

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::fs;
use std::path::Path;

#[derive(Deserialize, Debug, Clone, Default)]
struct FrontMatter {
    #[serde(default)]
    name: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    license: Option<String>,
    #[serde(default)]
    compatibility: Option<String>,
}

/// Parsed contents of one SKILL.md file.
#[derive(Debug, Clone)]
pub struct SkillMd {
    pub name: String,
    pub description: String,
    pub license: Option<String>,
    pub compatibility: Option<String>,
    /// Markdown body below the front matter.
    pub instructions: String,
}

/// Parse a SKILL.md file at `path`.
pub fn parse_skill_md(path: &Path) -> Result<SkillMd> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read SKILL.md: {}", path.display()))?;
    parse_skill_md_content(&content)
        .with_context(|| format!("Failed to parse SKILL.md: {}", path.display()))
}

fn parse_skill_md_content(content: &str) -> Result<SkillMd> {
    let re = Regex::new(r"(?s)^---\s*\n(.*?)\n---").expect("front matter regex is valid");

    let captures = re
        .captures(content)
        .ok_or_else(|| anyhow::anyhow!("No YAML front matter found"))?;

    let yaml = captures
        .get(1)
        .ok_or_else(|| anyhow::anyhow!("Failed to extract YAML content"))?
        .as_str();

    let front: FrontMatter =
        serde_yaml::from_str(yaml).context("Failed to parse YAML front matter")?;

    if front.name.is_empty() {
        anyhow::bail!("Skill name is required in SKILL.md");
    }

    let body_start = captures.get(0).map(|m| m.end()).unwrap_or(0);
    let instructions = content[body_start..].trim_start().to_string();

    Ok(SkillMd {
        name: front.name,
        description: front.description.unwrap_or_default(),
        license: front.license,
        compatibility: front.compatibility,
        instructions,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_skill_md_full() {
        let content = r#"---
name: text-summarizer
description: Summarizes long text into a few sentences
compatibility: Requires Python 3.x
---

# Text Summarizer

Feed text on stdin, receive a summary on stdout.
"#;
        let md = parse_skill_md_content(content).expect("front matter should parse");
        assert_eq!(md.name, "text-summarizer");
        assert_eq!(md.description, "Summarizes long text into a few sentences");
        assert_eq!(md.compatibility.as_deref(), Some("Requires Python 3.x"));
        assert!(md.instructions.starts_with("# Text Summarizer"));
    }

    #[test]
    fn test_parse_skill_md_requires_name() {
        let content = "---\ndescription: nameless\n---\nbody\n";
        assert!(parse_skill_md_content(content).is_err());
    }

    #[test]
    fn test_parse_skill_md_requires_front_matter() {
        assert!(parse_skill_md_content("# just markdown\n").is_err());
    }
}
