/*!
common/src/lib.rs

Shared configuration types for Escriba.

This file provides:
- Config data structures (deserialized from TOML)
- An async loader for a TOML config file, with default/override merging
- Validation helpers run once at startup
*/

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Fetching configuration for listing and article requests
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FetchConfig {
    /// Per-request timeout for listing/article fetches, in seconds
    pub timeout_seconds: Option<u64>,
    /// User-Agent header sent on every request
    pub user_agent: Option<String>,
}

/// Remote LLM endpoint configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Base URL of the OpenAI-compatible API, or the full chat-completions URL
    pub api_url: Option<String>,
    /// Name of the environment variable holding the API key
    pub api_key_env: Option<String>,
    pub model: Option<String>,
    pub timeout_seconds: Option<u64>,
}

/// A (tag, class) pair used to locate elements within parsed HTML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorSpec {
    pub tag: String,
    pub class: String,
}

/// Selector roles consumed by the extractor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectorTable {
    pub article_list: SelectorSpec,
    pub article_body: SelectorSpec,
    /// When the article-body selector misses, scrape every <p> on the page
    /// instead of skipping the article.
    #[serde(default)]
    pub fallback_whole_page: bool,
}

/// Where a profile's input text comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputSource {
    /// A single user-supplied URL
    Url,
    /// One or more configured news-site sections
    Section,
    /// A plain-text document (already converted externally)
    Document,
    /// Plain chat, no attached content
    None,
}

/// One assistant variant: system prompt + input source + sampling settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub name: String,
    pub system_prompt: String,
    pub source: InputSource,
    /// Overrides [llm].model when set
    pub model: Option<String>,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

fn default_temperature() -> f64 {
    0.7
}

/// Top-level application configuration (deserialized from config.toml)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub fetch: Option<FetchConfig>,
    pub llm: Option<LlmConfig>,
    pub selectors: Option<SelectorTable>,
    /// Section name -> listing URL
    #[serde(default)]
    pub sections: BTreeMap<String, String>,
    #[serde(default)]
    pub profiles: Vec<ProfileConfig>,
}

impl Config {
    /// Load configuration from a TOML file asynchronously.
    ///
    /// Example:
    ///   let cfg = Config::from_file("config.toml").await?;
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = tokio::fs::read_to_string(path.as_ref())
            .await
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;
        let cfg: Config = toml::from_str(&data).context("Failed to parse TOML configuration")?;
        Ok(cfg)
    }

    /// Load configuration with an optional default file and an optional override file.
    /// If both are present, they are merged (override takes precedence).
    pub async fn load_with_defaults(default_path: Option<&Path>, override_path: Option<&Path>) -> Result<Self> {
        let mut config_value = toml::Value::Table(toml::map::Map::new());

        if let Some(path) = default_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read default config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse default configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        if let Some(path) = override_path {
            if path.exists() {
                let data = tokio::fs::read_to_string(path).await
                    .with_context(|| format!("Failed to read override config: {}", path.display()))?;
                let val: toml::Value = toml::from_str(&data)
                    .context("Failed to parse override configuration")?;
                merge_toml(&mut config_value, val);
            }
        }

        let cfg: Config = config_value.try_into().context("Failed to parse merged configuration")?;
        Ok(cfg)
    }

    /// Validate the parts of the configuration that would otherwise fail
    /// mid-interaction: selector fields must be non-empty, section URLs must
    /// be absolute HTTP(S), profile names must be unique and temperatures in
    /// range. Called once at startup.
    pub fn validate(&self) -> Result<()> {
        if let Some(ref sel) = self.selectors {
            for (role, spec) in [("article_list", &sel.article_list), ("article_body", &sel.article_body)] {
                if spec.tag.trim().is_empty() || spec.class.trim().is_empty() {
                    anyhow::bail!("selector '{}' has an empty tag or class", role);
                }
            }
        }

        for (name, raw) in &self.sections {
            let parsed = url::Url::parse(raw)
                .with_context(|| format!("section '{}' has an invalid URL: {}", name, raw))?;
            if parsed.scheme() != "http" && parsed.scheme() != "https" {
                anyhow::bail!("section '{}' must use an http(s) URL, got '{}'", name, raw);
            }
        }

        let mut seen = std::collections::BTreeSet::new();
        for profile in &self.profiles {
            if !seen.insert(profile.name.as_str()) {
                anyhow::bail!("duplicate profile name '{}'", profile.name);
            }
            if !(0.0..=1.0).contains(&profile.temperature) {
                anyhow::bail!(
                    "profile '{}' has temperature {} outside [0, 1]",
                    profile.name,
                    profile.temperature
                );
            }
        }

        Ok(())
    }
}

fn merge_toml(a: &mut toml::Value, b: toml::Value) {
    match (a, b) {
        (toml::Value::Table(a_map), toml::Value::Table(b_map)) => {
            for (k, v) in b_map {
                if let Some(a_val) = a_map.get_mut(&k) {
                    merge_toml(a_val, v);
                } else {
                    a_map.insert(k, v);
                }
            }
        }
        (a_val, b_val) => *a_val = b_val,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
        [fetch]
        timeout_seconds = 10
        user_agent = "Mozilla/5.0"

        [llm]
        api_url = "https://api.example.com/v1"
        api_key_env = "ESCRIBA_API_KEY"
        model = "gpt-4o-mini"
        timeout_seconds = 60

        [selectors.article_list]
        tag = "div"
        class = "headline"

        [selectors.article_body]
        tag = "div"
        class = "article-body"

        [sections]
        nacional = "https://example.com/nacional/"
        deportes = "https://example.com/deportes/"

        [[profiles]]
        name = "grammar"
        system_prompt = "Review grammar and spelling."
        source = "url"
        temperature = 0.0
    "#;

    #[test]
    fn config_parses_and_validates() {
        let cfg: Config = toml::from_str(SAMPLE).expect("parse config");
        assert_eq!(cfg.sections.len(), 2);
        assert_eq!(cfg.profiles.len(), 1);
        assert_eq!(cfg.profiles[0].name, "grammar");
        assert_eq!(cfg.profiles[0].source, InputSource::Url);
        assert!(!cfg.selectors.as_ref().unwrap().fallback_whole_page);
        cfg.validate().expect("valid config");
    }

    #[test]
    fn validate_rejects_empty_selector_class() {
        let mut cfg: Config = toml::from_str(SAMPLE).expect("parse config");
        cfg.selectors.as_mut().unwrap().article_body.class = " ".into();
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_non_http_section() {
        let mut cfg: Config = toml::from_str(SAMPLE).expect("parse config");
        cfg.sections.insert("bad".into(), "ftp://example.com/".into());
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut cfg: Config = toml::from_str(SAMPLE).expect("parse config");
        cfg.profiles[0].temperature = 1.5;
        assert!(cfg.validate().is_err());
    }

    #[tokio::test]
    async fn override_file_wins_over_default() {
        let dir = tempfile::tempdir().expect("tempdir");

        let default_path = dir.path().join("config.default.toml");
        let mut f = std::fs::File::create(&default_path).expect("create default");
        f.write_all(SAMPLE.as_bytes()).expect("write default");

        let override_path = dir.path().join("config.toml");
        let mut f = std::fs::File::create(&override_path).expect("create override");
        f.write_all(b"[llm]\nmodel = \"gpt-4o\"\n").expect("write override");

        let cfg = Config::load_with_defaults(Some(&default_path), Some(&override_path))
            .await
            .expect("load merged");

        let llm = cfg.llm.expect("llm section");
        assert_eq!(llm.model.as_deref(), Some("gpt-4o"));
        // Untouched keys survive the merge
        assert_eq!(llm.api_key_env.as_deref(), Some("ESCRIBA_API_KEY"));
        assert_eq!(cfg.sections.len(), 2);
    }
}
