//! Skill registry: discovery at startup, progressive disclosure afterwards.
//!
//! Discovery prefers an `AGENTS.md` index (an `<available_skills>` block
//! naming each skill and its location) so heavy SKILL.md bodies can be
//! loaded on first use. Without an index, a recursive SKILL.md scan loads
//! everything eagerly. Executors share one registry behind an `Arc`; the
//! inner map is mutex-guarded so lazy detail loads happen at most once per
//! skill.

use anyhow::Result;
use regex::Regex;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use super::metadata::parse_skill_md;

/// One registered skill. Immutable once `details_loaded` is true.
#[derive(Debug, Clone)]
pub struct Skill {
    pub name: String,
    pub description: String,
    /// Directory the skill lives in; the child's working directory.
    pub base_dir: PathBuf,
    /// SKILL.md body. Empty until details are loaded.
    pub instructions: String,
    pub details_loaded: bool,
}

pub struct SkillRegistry {
    skills_dir: PathBuf,
    skills: Mutex<HashMap<String, Skill>>,
}

impl SkillRegistry {
    /// Discover skills under `skills_dir`.
    ///
    /// A missing directory is a warning, not an error — the server still
    /// starts and answers every request with an unknown-skill reply.
    pub fn load(skills_dir: &Path) -> Self {
        let registry = Self {
            skills_dir: skills_dir.to_path_buf(),
            skills: Mutex::new(HashMap::new()),
        };

        if !skills_dir.exists() {
            tracing::warn!(dir = %skills_dir.display(), "Skills directory does not exist");
            return registry;
        }

        let agents_md = skills_dir.join("AGENTS.md");
        let count = if agents_md.exists() {
            registry.load_from_agents_md(&agents_md).unwrap_or(0)
        } else {
            0
        };

        if count > 0 {
            tracing::info!(count, "Discovered skills from AGENTS.md index");
        } else {
            let count = registry.load_from_scan(skills_dir);
            tracing::info!(count, "Loaded skills from recursive SKILL.md scan");
        }

        registry
    }

    /// Parse the `<available_skills>` block of an AGENTS.md index.
    /// Listed skills get their details deferred until first use.
    fn load_from_agents_md(&self, path: &Path) -> Result<usize> {
        let content = fs::read_to_string(path)?;

        let block_re = Regex::new(r"(?s)<available_skills>(.*?)</available_skills>")
            .expect("available_skills regex is valid");
        let skill_re = Regex::new(r"(?s)<skill>(.*?)</skill>").expect("skill regex is valid");

        let Some(block) = block_re.captures(&content).and_then(|c| c.get(1)) else {
            tracing::warn!(path = %path.display(), "No <available_skills> block in AGENTS.md");
            return Ok(0);
        };

        let mut map = self.skills.lock().expect("registry lock poisoned");
        let mut count = 0;

        for cap in skill_re.captures_iter(block.as_str()) {
            let entry = cap.get(1).map(|m| m.as_str()).unwrap_or("");
            let name = extract_xml_tag(entry, "name");
            if name.is_empty() {
                continue;
            }
            let description = extract_xml_tag(entry, "description");
            let location = extract_xml_tag(entry, "location");

            let base_dir = self
                .skills_dir
                .join(location.trim_end_matches('/'))
                .canonicalize()
                .unwrap_or_else(|_| self.skills_dir.join(location.trim_end_matches('/')));

            tracing::debug!(skill = %name, base = %base_dir.display(), "Discovered skill");
            map.insert(
                name.clone(),
                Skill {
                    name,
                    description,
                    base_dir,
                    instructions: String::new(),
                    details_loaded: false,
                },
            );
            count += 1;
        }

        Ok(count)
    }

    /// Recursive scan for SKILL.md files; details load eagerly in this mode.
    fn load_from_scan(&self, dir: &Path) -> usize {
        let mut found = Vec::new();
        collect_skill_md(dir, &mut found);

        let mut map = self.skills.lock().expect("registry lock poisoned");
        let mut count = 0;
        for path in found {
            match parse_skill_md(&path) {
                Ok(md) => {
                    let base_dir = path.parent().unwrap_or(dir).to_path_buf();
                    tracing::debug!(skill = %md.name, path = %path.display(), "Loaded skill");
                    map.insert(
                        md.name.clone(),
                        Skill {
                            name: md.name,
                            description: md.description,
                            base_dir,
                            instructions: md.instructions,
                            details_loaded: true,
                        },
                    );
                    count += 1;
                }
                Err(err) => {
                    tracing::warn!(path = %path.display(), %err, "Skipping unparseable SKILL.md");
                }
            }
        }
        count
    }

    pub fn len(&self) -> usize {
        self.skills.lock().expect("registry lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// (name, description) pairs for matchers.
    pub fn summaries(&self) -> Vec<(String, String)> {
        let map = self.skills.lock().expect("registry lock poisoned");
        let mut out: Vec<_> = map
            .values()
            .map(|s| (s.name.clone(), s.description.clone()))
            .collect();
        out.sort();
        out
    }

    /// The fallback target when the registry holds exactly one skill.
    pub fn single_skill(&self) -> Option<String> {
        let map = self.skills.lock().expect("registry lock poisoned");
        if map.len() == 1 {
            map.keys().next().cloned()
        } else {
            None
        }
    }

    /// Look up by name: exact match first, then case-insensitive.
    pub fn find(&self, name: &str) -> Option<Skill> {
        let map = self.skills.lock().expect("registry lock poisoned");
        if let Some(skill) = map.get(name) {
            return Some(skill.clone());
        }
        let lower = name.to_lowercase();
        map.values().find(|s| s.name.to_lowercase() == lower).cloned()
    }

    /// Progressive disclosure: make sure the skill's SKILL.md body is loaded.
    ///
    /// The check and the load both run under the registry lock, so details
    /// are read at most once per skill even with concurrent executors. Load
    /// errors are non-fatal; the caller gets whatever metadata exists.
    pub fn ensure_details(&self, name: &str) -> Option<Skill> {
        let mut map = self.skills.lock().expect("registry lock poisoned");

        let key = if map.contains_key(name) {
            name.to_string()
        } else {
            let lower = name.to_lowercase();
            map.values()
                .find(|s| s.name.to_lowercase() == lower)
                .map(|s| s.name.clone())?
        };

        let skill = map.get_mut(&key)?;
        if !skill.details_loaded {
            let md_path = skill.base_dir.join("SKILL.md");
            match parse_skill_md(&md_path) {
                Ok(md) => {
                    tracing::info!(skill = %skill.name, "Loaded skill details on first use");
                    if !md.description.is_empty() {
                        skill.description = md.description;
                    }
                    skill.instructions = md.instructions;
                    skill.details_loaded = true;
                }
                Err(err) => {
                    tracing::warn!(skill = %skill.name, %err, "Could not load skill details");
                }
            }
        }
        Some(skill.clone())
    }
}

fn collect_skill_md(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    let mut children: Vec<_> = entries.flatten().collect();
    children.sort_by_key(|e| e.file_name());
    for entry in children {
        let path = entry.path();
        if path.is_dir() {
            collect_skill_md(&path, out);
        } else if path.file_name().is_some_and(|n| n == "SKILL.md") {
            out.push(path);
        }
    }
}

fn extract_xml_tag(xml: &str, tag: &str) -> String {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let Some(start) = xml.find(&open) else {
        return String::new();
    };
    let content_start = start + open.len();
    let Some(end) = xml[content_start..].find(&close) else {
        return String::new();
    };
    xml[content_start..content_start + end].trim().to_string()
}
