//! TOML configuration.
//!
//! Every section has defaults, so an empty file gives a working local
//! setup. The file itself must exist; a missing path is an error. Example:
//!
//! ```toml
//! [db]
//! path = "./data/drivechat.sqlite"
//!
//! [storage]
//! index_dir = "./indices"
//!
//! [drive]
//! page_size = 40
//! max_depth = 10
//!
//! [chunking]
//! max_tokens = 700
//!
//! [retrieval]
//! top_k = 4
//!
//! [llm]
//! provider = "openai"        # or "disabled" for extractive answers
//! model = "gpt-3.5-turbo"
//!
//! [server]
//! bind = "127.0.0.1:5000"
//! ```

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub db: DbConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub drive: DriveConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DbConfig {
    pub path: PathBuf,
}

impl Default for DbConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("./data/drivechat.sqlite"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    /// Directory holding one `index-<owner>/` subdirectory per owner.
    pub index_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_dir: PathBuf::from("./indices"),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct DriveConfig {
    #[serde(default = "default_drive_api_base")]
    pub api_base: String,
    #[serde(default = "default_sheets_api_base")]
    pub sheets_api_base: String,
    /// Items requested per folder listing page.
    #[serde(default = "default_page_size")]
    pub page_size: u32,
    /// Folders nested deeper than this contribute no files.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_chunk_bytes")]
    pub download_chunk_bytes: u64,
    #[serde(default = "default_drive_timeout")]
    pub timeout_secs: u64,
    /// Files extracted concurrently within one ingestion.
    #[serde(default = "default_extract_concurrency")]
    pub extract_concurrency: usize,
    /// A1 range read from native spreadsheets.
    #[serde(default = "default_sheet_range")]
    pub sheet_range: String,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            api_base: default_drive_api_base(),
            sheets_api_base: default_sheets_api_base(),
            page_size: default_page_size(),
            max_depth: default_max_depth(),
            download_chunk_bytes: default_chunk_bytes(),
            timeout_secs: default_drive_timeout(),
            extract_concurrency: default_extract_concurrency(),
            sheet_range: default_sheet_range(),
        }
    }
}

fn default_drive_api_base() -> String {
    "https://www.googleapis.com/drive/v3".to_string()
}
fn default_sheets_api_base() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}
fn default_page_size() -> u32 {
    40
}
fn default_max_depth() -> usize {
    10
}
fn default_chunk_bytes() -> u64 {
    4 * 1024 * 1024
}
fn default_drive_timeout() -> u64 {
    30
}
fn default_extract_concurrency() -> usize {
    4
}
fn default_sheet_range() -> String {
    "A1:ZZZ1000".to_string()
}

#[derive(Debug, Deserialize, Clone)]
pub struct ChunkingConfig {
    pub max_tokens: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_tokens: 700 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct RetrievalConfig {
    /// Passages handed to the answer generator.
    pub top_k: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self { top_k: 4 }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LlmConfig {
    #[serde(default = "default_provider")]
    pub provider: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_llm_api_base")]
    pub api_base: String,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: default_provider(),
            model: default_model(),
            api_base: default_llm_api_base(),
            temperature: 0.0,
            max_tokens: default_llm_max_tokens(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

fn default_provider() -> String {
    "disabled".to_string()
}
fn default_model() -> String {
    "gpt-3.5-turbo".to_string()
}
fn default_llm_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_llm_max_tokens() -> u32 {
    256
}
fn default_llm_timeout() -> u64 {
    60
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:5000".to_string(),
        }
    }
}

pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    parse_config(&content)
}

pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).with_context(|| "Failed to parse config file")?;
    validate(&config)?;
    Ok(config)
}

fn validate(config: &Config) -> Result<()> {
    if !(1..=1000).contains(&config.drive.page_size) {
        bail!("drive.page_size must be in [1, 1000]");
    }
    if config.drive.download_chunk_bytes == 0 {
        bail!("drive.download_chunk_bytes must be > 0");
    }
    if config.drive.extract_concurrency == 0 {
        bail!("drive.extract_concurrency must be >= 1");
    }
    if config.chunking.max_tokens == 0 {
        bail!("chunking.max_tokens must be > 0");
    }
    if config.retrieval.top_k == 0 {
        bail!("retrieval.top_k must be >= 1");
    }
    match config.llm.provider.as_str() {
        "disabled" | "openai" => {}
        other => bail!(
            "Unknown llm provider: '{}'. Must be disabled or openai.",
            other
        ),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_gives_defaults() {
        let config = parse_config("").unwrap();
        assert_eq!(config.drive.page_size, 40);
        assert_eq!(config.drive.max_depth, 10);
        assert_eq!(config.drive.sheet_range, "A1:ZZZ1000");
        assert_eq!(config.chunking.max_tokens, 700);
        assert_eq!(config.llm.provider, "disabled");
        assert_eq!(config.llm.max_tokens, 256);
    }

    #[test]
    fn partial_sections_keep_field_defaults() {
        let config = parse_config(
            r#"
[drive]
max_depth = 3

[llm]
provider = "openai"
"#,
        )
        .unwrap();
        assert_eq!(config.drive.max_depth, 3);
        assert_eq!(config.drive.page_size, 40);
        assert_eq!(config.llm.provider, "openai");
        assert_eq!(config.llm.model, "gpt-3.5-turbo");
    }

    #[test]
    fn rejects_out_of_range_page_size() {
        let err = parse_config("[drive]\npage_size = 0\n").unwrap_err();
        assert!(err.to_string().contains("page_size"));
    }

    #[test]
    fn rejects_unknown_provider() {
        let err = parse_config("[llm]\nprovider = \"magic\"\n").unwrap_err();
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(load_config(Path::new("/nonexistent/drivechat.toml")).is_err());
    }

    #[test]
    fn empty_file_on_disk_loads_defaults() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = load_config(file.path()).unwrap();
        assert_eq!(config.drive.max_depth, 10);
    }
}
