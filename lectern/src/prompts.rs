//! Agent prompts from YAML: embedded defaults with a `PROMPTS_DIR` override.
//!
//! **Canonical source**: default prompt text lives in `lectern/prompts/*.yaml`,
//! embedded at compile time. When `PROMPTS_DIR` (or an explicit directory) is
//! set and contains a same-named file, it replaces the embedded default.

use std::path::Path;

use serde::Deserialize;

macro_rules! embed_prompt_yaml {
    ($name:literal) => {
        include_str!(concat!("../prompts/", $name))
    };
}

const EMBED_ROUTER: &str = embed_prompt_yaml!("router.yaml");
const EMBED_PLANNER: &str = embed_prompt_yaml!("planner.yaml");
const EMBED_CHAT: &str = embed_prompt_yaml!("chat.yaml");
const EMBED_PATCH: &str = embed_prompt_yaml!("patch.yaml");

const ROUTER_FILE: &str = "router.yaml";
const PLANNER_FILE: &str = "planner.yaml";
const CHAT_FILE: &str = "chat.yaml";
const PATCH_FILE: &str = "patch.yaml";

/// Error when loading prompts from a directory.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read prompts file {path}: {message}")]
    ReadFile { path: String, message: String },
    #[error("failed to parse YAML in {path}: {message}")]
    ParseYaml { path: String, message: String },
}

/// Router classification prompts.
#[derive(Clone, Debug, Deserialize)]
pub struct RouterPrompts {
    pub initial_system: String,
    pub followup_system: String,
    /// Extra intent bullet injected when content intents are enabled.
    #[serde(default)]
    pub content_intents_extra: String,
}

/// Planner system prompt and the refine/rebuild directives.
#[derive(Clone, Debug, Deserialize)]
pub struct PlannerPrompts {
    pub system: String,
    pub refine_directive: String,
    pub rebuild_directive: String,
}

/// Chat prompts, one per chat kind.
#[derive(Clone, Debug, Deserialize)]
pub struct ChatPrompts {
    pub smalltalk_system: String,
    pub qa_system: String,
    pub page_system: String,
}

/// Patch agent prompt.
#[derive(Clone, Debug, Deserialize)]
pub struct PatchPrompts {
    pub system: String,
}

/// All agent prompts, loaded once at startup.
#[derive(Clone, Debug)]
pub struct PromptSet {
    pub router: RouterPrompts,
    pub planner: PlannerPrompts,
    pub chat: ChatPrompts,
    pub patch: PatchPrompts,
}

fn prompts_dir(dir: Option<&Path>) -> Option<std::path::PathBuf> {
    dir.map(std::path::PathBuf::from).or_else(|| {
        std::env::var("PROMPTS_DIR")
            .ok()
            .map(std::path::PathBuf::from)
    })
}

fn parse<T: for<'de> Deserialize<'de>>(text: &str, path: &str) -> Result<T, LoadError> {
    serde_yaml::from_str(text).map_err(|e| LoadError::ParseYaml {
        path: path.to_string(),
        message: e.to_string(),
    })
}

fn load_one<T: for<'de> Deserialize<'de>>(
    dir: Option<&Path>,
    name: &str,
    embedded: &str,
) -> Result<T, LoadError> {
    if let Some(dir) = prompts_dir(dir) {
        let path = dir.join(name);
        if path.is_file() {
            let text = std::fs::read_to_string(&path).map_err(|e| LoadError::ReadFile {
                path: path.display().to_string(),
                message: e.to_string(),
            })?;
            return parse(&text, &path.display().to_string());
        }
    }
    parse(embedded, name)
}

impl PromptSet {
    /// Loads prompts from `dir` (or `PROMPTS_DIR`), falling back per-file to
    /// the embedded defaults.
    pub fn load(dir: Option<&Path>) -> Result<Self, LoadError> {
        Ok(Self {
            router: load_one(dir, ROUTER_FILE, EMBED_ROUTER)?,
            planner: load_one(dir, PLANNER_FILE, EMBED_PLANNER)?,
            chat: load_one(dir, CHAT_FILE, EMBED_CHAT)?,
            patch: load_one(dir, PATCH_FILE, EMBED_PATCH)?,
        })
    }

    /// Embedded defaults only; panics are impossible because the embedded
    /// files are parsed in tests.
    pub fn load_or_default(dir: Option<&Path>) -> Self {
        Self::load(dir).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "prompt override rejected, using embedded defaults");
            Self {
                router: parse(EMBED_ROUTER, ROUTER_FILE).expect("embedded router.yaml"),
                planner: parse(EMBED_PLANNER, PLANNER_FILE).expect("embedded planner.yaml"),
                chat: parse(EMBED_CHAT, CHAT_FILE).expect("embedded chat.yaml"),
                patch: parse(EMBED_PATCH, PATCH_FILE).expect("embedded patch.yaml"),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_defaults_parse() {
        let set = PromptSet::load(None).unwrap();
        assert!(set.router.initial_system.contains("build_workflow"));
        assert!(set.router.followup_system.contains("refine"));
        assert!(set.planner.system.contains("{tools}"));
        assert!(set.chat.qa_system.contains("teacher"));
        assert!(set.patch.system.contains("patch_layout"));
    }

    #[test]
    fn directory_override_replaces_a_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("chat.yaml"),
            "smalltalk_system: custom small\nqa_system: custom qa\npage_system: custom page\n",
        )
        .unwrap();
        let set = PromptSet::load(Some(dir.path())).unwrap();
        assert_eq!(set.chat.smalltalk_system, "custom small");
        // Files absent from the directory keep their embedded defaults.
        assert!(set.router.initial_system.contains("build_workflow"));
    }

    #[test]
    fn broken_override_falls_back_in_load_or_default() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("router.yaml"), "not: [valid").unwrap();
        let set = PromptSet::load_or_default(Some(dir.path()));
        assert!(set.router.initial_system.contains("build_workflow"));
    }
}
