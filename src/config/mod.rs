use anyhow::{Context, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::utils::ResearchError;

/// 默认配置文件路径
pub const SETTINGS_PATH: &str = "config/settings.toml";

/// 配置文件中的占位密钥，视为未配置
const PLACEHOLDER_KEY: &str = "your-api-key";

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub search: SearchConfig,
    pub generator: GeneratorConfig,
    pub research: ResearchConfig,
    pub storage: StorageConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// 单次请求的总执行上限
    pub request_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    pub api_url: String,
    pub api_key: String,
    pub freshness: String,
    pub count: u32,
    pub max_attempts: u32,
    /// 线性退避基数：第 n 次失败后等待 n * retry_base_ms
    pub retry_base_ms: u64,
    /// 查询为空时使用的兜底查询
    pub fallback_query: String,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneratorConfig {
    pub api_url: String,
    pub api_key: String,
    pub api_version: String,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: f32,
    pub http_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ResearchConfig {
    /// 搜索阶段的取消计时器，不覆盖生成与存储阶段
    pub search_timeout_secs: u64,
    pub anonymous_email: String,
    /// 拼入提示词的历史对话轮数
    pub history_turns: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    pub database_path: String,
}

impl AppConfig {
    /// 加载配置：默认值 → config/settings.toml → RESEARCHD_ 前缀环境变量
    ///
    /// 密钥另外支持 `SEARCH_API_KEY` 与 `ANTHROPIC_API_KEY`。
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new(SETTINGS_PATH))
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        let mut builder = Config::builder()
            .add_source(Config::try_from(&AppConfig::default()).context("序列化默认配置失败")?);

        if path.exists() {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(
            Environment::with_prefix("RESEARCHD")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        if let Ok(key) = std::env::var("SEARCH_API_KEY") {
            builder = builder
                .set_override("search.api_key", key)
                .context("设置 SEARCH_API_KEY 失败")?;
        }
        if let Ok(key) = std::env::var("ANTHROPIC_API_KEY") {
            builder = builder
                .set_override("generator.api_key", key)
                .context("设置 ANTHROPIC_API_KEY 失败")?;
        }

        let config: AppConfig = builder
            .build()
            .context("读取配置失败")?
            .try_deserialize()
            .context("解析配置失败")?;
        Ok(config)
    }

    pub fn save(&self, path: &str) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// 启动前检查：两个上游密钥缺一不可
    pub fn validate(&self) -> Result<(), ResearchError> {
        if !is_configured(&self.search.api_key) {
            return Err(ResearchError::Config(
                "search API key is missing (set SEARCH_API_KEY)".to_string(),
            ));
        }
        if !is_configured(&self.generator.api_key) {
            return Err(ResearchError::Config(
                "LLM provider API key is missing (set ANTHROPIC_API_KEY)".to_string(),
            ));
        }
        if self.search.max_attempts == 0 {
            return Err(ResearchError::Config(
                "search.max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        format!("sqlite:{}", self.storage.database_path)
    }
}

fn is_configured(key: &str) -> bool {
    let key = key.trim();
    !key.is_empty() && key != PLACEHOLDER_KEY
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 3000,
                request_timeout_secs: 300,
            },
            search: SearchConfig {
                api_url: "https://api.bochaai.com/v1/web-search".to_string(),
                api_key: String::new(),
                freshness: "noLimit".to_string(),
                count: 10,
                max_attempts: 3,
                retry_base_ms: 1000,
                fallback_query: "latest research developments".to_string(),
                http_timeout_secs: 60,
            },
            generator: GeneratorConfig {
                api_url: "https://api.anthropic.com/v1/messages".to_string(),
                api_key: String::new(),
                api_version: "2023-06-01".to_string(),
                model: "claude-3-5-sonnet-latest".to_string(),
                max_tokens: 8192,
                temperature: 0.7,
                http_timeout_secs: 240,
            },
            research: ResearchConfig {
                search_timeout_secs: 270,
                anonymous_email: "anonymous@example.com".to_string(),
                history_turns: 6,
            },
            storage: StorageConfig {
                database_path: "./data/research.db".to_string(),
            },
        }
    }
}
