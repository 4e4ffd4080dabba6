//! Configuration for a Marginalia pipeline.
//!
//! One TOML file with `[llm]`, `[memory]` and `[generation]` tables, all
//! optional. On Unix, [`MarginaliaConfig::from_file`] refuses files other
//! users can modify, and files other users can read when they hold a key.

use std::path::Path;

use marginalia_llm::LlmConfig;
use marginalia_memory::MemoryConfig;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Top-level configuration file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MarginaliaConfig {
    #[serde(default)]
    pub llm: LlmConfig,

    #[serde(default)]
    pub memory: MemoryConfig,

    #[serde(default)]
    pub generation: GenerationOptions,
}

/// Knobs for one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationOptions {
    #[serde(default = "default_max_annotations")]
    pub max_annotations_per_agent: usize,

    /// Hint passed to seed formation. Not enforced.
    #[serde(default = "default_target_seeds")]
    pub target_seeds: usize,

    #[serde(default = "default_turns")]
    pub turns_per_discussion: usize,

    #[serde(default = "default_temperature")]
    pub annotation_temperature: f32,

    #[serde(default = "default_temperature")]
    pub seed_temperature: f32,

    #[serde(default = "default_discussion_temperature")]
    pub discussion_temperature: f32,

    #[serde(default = "default_temperature")]
    pub comment_temperature: f32,
}

fn default_max_annotations() -> usize {
    12
}

fn default_target_seeds() -> usize {
    5
}

fn default_turns() -> usize {
    4
}

fn default_temperature() -> f32 {
    0.7
}

fn default_discussion_temperature() -> f32 {
    0.8
}

impl Default for GenerationOptions {
    fn default() -> Self {
        Self {
            max_annotations_per_agent: default_max_annotations(),
            target_seeds: default_target_seeds(),
            turns_per_discussion: default_turns(),
            annotation_temperature: default_temperature(),
            seed_temperature: default_temperature(),
            discussion_temperature: default_discussion_temperature(),
            comment_temperature: default_temperature(),
        }
    }
}

impl MarginaliaConfig {
    /// Load configuration from a TOML file.
    ///
    /// On Unix the file must be a regular file, must not be world-writable,
    /// and must not be world-readable if it holds an API key.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();

        #[cfg(unix)]
        validate_config_file_permissions(path)?;

        let config = Self::from_file_unchecked(path)?;

        if config.llm.api_key.as_deref().is_some_and(|k| !k.is_empty()) {
            warn!(
                path = %path.display(),
                "API key stored in config file; OPENAI_API_KEY / ANTHROPIC_API_KEY are preferred"
            );
        }

        Ok(config)
    }

    /// Load configuration without permission checks.
    pub fn from_file_unchecked(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }
}

/// Whether a config file line assigns a non-empty `api_key`.
fn holds_api_key(content: &str) -> bool {
    content.lines().any(|line| {
        let Some((key, value)) = line.split_once('=') else {
            return false;
        };
        key.trim() == "api_key" && !matches!(value.trim(), "\"\"" | "''")
    })
}

#[cfg(unix)]
fn validate_config_file_permissions(path: &Path) -> anyhow::Result<()> {
    use anyhow::{bail, Context};
    use std::os::unix::fs::PermissionsExt;

    let shown = path.display();
    let metadata = std::fs::symlink_metadata(path)
        .with_context(|| format!("Cannot stat config file '{shown}'"))?;
    if !metadata.file_type().is_file() {
        bail!("Config path '{shown}' must be a regular file, not a symlink or directory");
    }

    let mode = metadata.permissions().mode() & 0o777;
    if mode & 0o002 != 0 {
        bail!("Config file '{shown}' is writable by any user (mode {mode:03o}); run chmod o-w");
    }

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Cannot read config file '{shown}'"))?;
    if !holds_api_key(&content) {
        return Ok(());
    }
    if mode & 0o004 != 0 {
        bail!(
            "Config file '{shown}' holds an API key and is world-readable (mode {mode:03o}); run chmod 600"
        );
    }
    if mode & 0o040 != 0 {
        warn!(path = %shown, mode = %format!("{mode:03o}"), "Config file with API key is group-readable");
    }
    Ok(())
}
