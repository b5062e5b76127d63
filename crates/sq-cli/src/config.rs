use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use sq_core::pipeline::{prompts, SEARCH_TOOL_NAME};
use sq_core::{PipelineConfig, StageOptions, Topology};

/// Environment variable the search key has always been read from.
pub const LANGSEARCH_API_KEY_VAR: &str = "LANGSEARCH_API_KEY";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub search: SearchConfig,
    pub models: ModelsConfig,
    pub pipeline: PipelineSection,
    pub http: HttpConfig,
    pub ui: UiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    /// Results requested per search
    pub count: u32,
    pub freshness: String,
    pub summary: bool,
    /// Site every generated query is scoped to
    pub site: String,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: sq_tools::langsearch::DEFAULT_BASE_URL.to_string(),
            count: 1,
            freshness: "noLimit".to_string(),
            summary: true,
            site: prompts::DEFAULT_SITE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelsConfig {
    /// Small model that turns the question into search keywords
    pub query: ModelEntry,
    /// Larger model that writes the answer
    pub answer: ModelEntry,
}

impl Default for ModelsConfig {
    fn default() -> Self {
        Self {
            query: ModelEntry::named("qwen2.5:3b"),
            answer: ModelEntry::named("qwen2.5:7b"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelEntry {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    /// Extra parameters to pass to the API (e.g., num_ctx, top_k)
    pub parameters: HashMap<String, serde_json::Value>,
}

impl ModelEntry {
    fn named(model: &str) -> Self {
        Self {
            base_url: sq_providers::openai::DEFAULT_BASE_URL.to_string(),
            api_key: None,
            model: model.to_string(),
            temperature: None,
            max_tokens: None,
            parameters: HashMap::new(),
        }
    }

    pub fn stage_options(&self) -> StageOptions {
        StageOptions {
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            extra: self.parameters.clone(),
        }
    }
}

impl Default for ModelEntry {
    fn default() -> Self {
        Self::named("qwen2.5:7b")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineSection {
    pub topology: Topology,
    pub recursion_limit: usize,
    pub include_question: bool,
    pub enforce_site: bool,
    pub model_timeout_secs: Option<u64>,
    pub deadline_secs: Option<u64>,
}

impl Default for PipelineSection {
    fn default() -> Self {
        Self {
            topology: Topology::Linear,
            recursion_limit: 10,
            include_question: false,
            enforce_site: true,
            model_timeout_secs: Some(120),
            deadline_secs: Some(300),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub connect_timeout_secs: u64,
    pub timeout_secs: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: 10,
            timeout_secs: 90,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UiConfig {
    /// Reveal answers a few characters at a time
    pub typewriter: bool,
    pub typewriter_delay_ms: u64,
}

impl Default for UiConfig {
    fn default() -> Self {
        Self {
            typewriter: true,
            typewriter_delay_ms: 50,
        }
    }
}

/// Values taken from command-line flags; they win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub query_model: Option<String>,
    pub answer_model: Option<String>,
    pub base_url: Option<String>,
    pub count: Option<u32>,
    pub site: Option<String>,
    pub topology: Option<Topology>,
    pub no_typewriter: bool,
}

impl Config {
    /// Load configuration: defaults, then the TOML file, then the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    anyhow::bail!("Config file not found: {}", p.display());
                }
                p.to_path_buf()
            }
            None => Self::config_path()?,
        };

        let config: Config = Self::figment(&path)
            .extract()
            .with_context(|| format!("Failed to load configuration from {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::file(path))
            .merge(
                Env::raw()
                    .only(&[LANGSEARCH_API_KEY_VAR])
                    .map(|_| "search.api_key".into()),
            )
            .merge(Env::prefixed("SQ_").split("__"))
    }

    pub fn config_path() -> Result<PathBuf> {
        Ok(Self::config_dir()?.join("config.toml"))
    }

    pub fn config_dir() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
        Ok(config_dir.join("sq"))
    }

    pub fn validate(&self) -> Result<()> {
        if self.pipeline.recursion_limit == 0 {
            anyhow::bail!("pipeline.recursion_limit must be at least 1");
        }
        if self.search.count == 0 {
            anyhow::bail!("search.count must be at least 1");
        }
        if self.search.site.trim().is_empty() {
            anyhow::bail!("search.site must not be empty");
        }
        Ok(())
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(model) = &overrides.query_model {
            self.models.query.model = model.clone();
        }
        if let Some(model) = &overrides.answer_model {
            self.models.answer.model = model.clone();
        }
        if let Some(base_url) = &overrides.base_url {
            self.models.query.base_url = base_url.clone();
            self.models.answer.base_url = base_url.clone();
        }
        if let Some(count) = overrides.count {
            self.search.count = count.max(1);
        }
        if let Some(site) = &overrides.site {
            self.search.site = site.clone();
        }
        if let Some(topology) = overrides.topology {
            self.pipeline.topology = topology;
        }
        if overrides.no_typewriter {
            self.ui.typewriter = false;
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            topology: self.pipeline.topology,
            recursion_limit: self.pipeline.recursion_limit,
            search_tool: SEARCH_TOOL_NAME.to_string(),
            search_count: self.search.count,
            site: self.search.site.clone(),
            enforce_site: self.pipeline.enforce_site,
            include_question: self.pipeline.include_question,
            model_timeout: self.pipeline.model_timeout_secs.map(Duration::from_secs),
            deadline: self.pipeline.deadline_secs.map(Duration::from_secs),
            query: self.models.query.stage_options(),
            answer: self.models.answer.stage_options(),
        }
    }

    pub fn search_config(&self) -> sq_tools::LangSearchConfig {
        sq_tools::LangSearchConfig {
            api_key: self.search.api_key.clone(),
            base_url: self.search.base_url.clone(),
            freshness: self.search.freshness.clone(),
            summary: self.search.summary,
        }
    }

    /// Shared HTTP client for the search API and both models.
    pub fn http_client(&self) -> Result<reqwest::Client> {
        reqwest::Client::builder()
            .user_agent(concat!("sq/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(self.http.connect_timeout_secs))
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .build()
            .context("Failed to build HTTP client")
    }

    /// Copy with every secret replaced, for display.
    pub fn redacted(&self) -> Self {
        fn mask(key: &Option<String>) -> Option<String> {
            key.as_ref().map(|_| "(configured)".to_string())
        }

        let mut config = self.clone();
        config.search.api_key = mask(&self.search.api_key);
        config.models.query.api_key = mask(&self.models.query.api_key);
        config.models.answer.api_key = mask(&self.models.answer.api_key);
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use figment::Jail;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.search.count, 1);
        assert_eq!(config.search.site, "support.apple.com");
        assert_eq!(config.models.query.model, "qwen2.5:3b");
        assert_eq!(config.models.answer.model, "qwen2.5:7b");
        assert_eq!(config.models.answer.base_url, "http://localhost:11434/v1");
        assert_eq!(config.pipeline.recursion_limit, 10);
        assert_eq!(config.pipeline.topology, Topology::Linear);
        assert!(!config.pipeline.include_question);
        assert!(config.ui.typewriter);
    }

    #[test]
    fn test_parse_config() {
        let toml = r#"
            [search]
            api_key = "ls-test"
            count = 3

            [models.answer]
            model = "qwen2.5:14b"
            temperature = 0.3

            [models.answer.parameters]
            num_ctx = 16384

            [pipeline]
            topology = "tool_loop"
        "#;

        let config: Config = toml::from_str(toml).unwrap();
        assert_eq!(config.search.api_key.as_deref(), Some("ls-test"));
        assert_eq!(config.search.count, 3);
        assert_eq!(config.search.freshness, "noLimit");
        assert_eq!(config.models.answer.model, "qwen2.5:14b");
        assert_eq!(config.models.answer.parameters["num_ctx"], 16384);
        assert_eq!(config.pipeline.topology, Topology::ToolLoop);
    }

    #[test]
    fn test_load_layers_file_and_env() {
        Jail::expect_with(|jail| {
            jail.create_file(
                "sq.toml",
                r#"
                    [search]
                    count = 2

                    [models.query]
                    model = "llama3.2:3b"
                "#,
            )?;
            jail.set_env("SQ_MODELS__QUERY__MODEL", "phi4-mini");
            jail.set_env("SQ_PIPELINE__INCLUDE_QUESTION", "true");
            jail.set_env("LANGSEARCH_API_KEY", "ls-from-env");

            let config = Config::load(Some(Path::new("sq.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.search.count, 2);
            assert_eq!(config.models.query.model, "phi4-mini");
            assert_eq!(config.models.answer.model, "qwen2.5:7b");
            assert!(config.pipeline.include_question);
            assert_eq!(config.search.api_key.as_deref(), Some("ls-from-env"));
            Ok(())
        });
    }

    #[test]
    fn test_prefixed_env_wins_over_legacy_key() {
        Jail::expect_with(|jail| {
            jail.create_file("sq.toml", "")?;
            jail.set_env("LANGSEARCH_API_KEY", "legacy");
            jail.set_env("SQ_SEARCH__API_KEY", "preferred");

            let config = Config::load(Some(Path::new("sq.toml"))).map_err(|e| e.to_string())?;
            assert_eq!(config.search.api_key.as_deref(), Some("preferred"));
            Ok(())
        });
    }

    #[test]
    fn test_missing_explicit_path_fails() {
        let err = Config::load(Some(Path::new("/nonexistent/sq/config.toml"))).unwrap_err();
        assert!(err.to_string().contains("Config file not found"));
    }

    #[test]
    fn test_validate_rejects_zero_limit() {
        let mut config = Config::default();
        config.pipeline.recursion_limit = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = Config::default();
        config.apply(&Overrides {
            answer_model: Some("qwen2.5:32b".to_string()),
            base_url: Some("http://gpu:11434/v1".to_string()),
            count: Some(0),
            topology: Some(Topology::ToolLoop),
            no_typewriter: true,
            ..Overrides::default()
        });

        assert_eq!(config.models.answer.model, "qwen2.5:32b");
        assert_eq!(config.models.query.base_url, "http://gpu:11434/v1");
        assert_eq!(config.search.count, 1);
        assert_eq!(config.pipeline.topology, Topology::ToolLoop);
        assert!(!config.ui.typewriter);
    }

    #[test]
    fn test_pipeline_config() {
        let mut config = Config::default();
        config.pipeline.model_timeout_secs = None;
        config.models.query.temperature = Some(0.0);

        let pipeline = config.pipeline_config();
        assert_eq!(pipeline.search_tool, "langsearch_websearch_tool");
        assert_eq!(pipeline.search_count, 1);
        assert!(pipeline.model_timeout.is_none());
        assert_eq!(pipeline.deadline, Some(Duration::from_secs(300)));
        assert_eq!(pipeline.query.temperature, Some(0.0));
    }

    #[test]
    fn test_redacted_hides_keys() {
        let mut config = Config::default();
        config.search.api_key = Some("ls-secret".to_string());
        config.models.answer.api_key = Some("sk-secret".to_string());

        let shown = toml::to_string_pretty(&config.redacted()).unwrap();
        assert!(!shown.contains("ls-secret"));
        assert!(!shown.contains("sk-secret"));
        assert!(shown.contains("(configured)"));
    }
}
