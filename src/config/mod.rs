pub mod prompt;

use std::path::PathBuf;

use crate::cli::Args;
use crate::llm::LlmConfig;

/// Identity and upstream settings of the agent, fixed at startup.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    pub name: String,
    pub description: String,
    pub model: String,
    pub base_url: String,
    pub api_key: Option<String>,
}

impl AgentConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            name: args.agent_name.clone(),
            description: args.agent_description.clone(),
            model: args.openrouter_model.clone(),
            base_url: args.openrouter_base_url.clone(),
            api_key: Some(args.openrouter_api_key.clone()).filter(|k| !k.trim().is_empty()),
        }
    }

    pub fn has_api_key(&self) -> bool {
        self.api_key.is_some()
    }
}

pub fn llm_config(args: &Args) -> LlmConfig {
    LlmConfig {
        api_key: Some(args.openrouter_api_key.clone()).filter(|k| !k.trim().is_empty()),
        completion_model: Some(args.openrouter_model.clone()),
        base_url: Some(args.openrouter_base_url.clone()),
        referer: Some(args.openrouter_referer.clone()),
        app_title: Some(args.openrouter_app_title.clone()),
    }
}

#[derive(Debug, Clone)]
pub struct FileStoreConfig {
    pub uploads_dir: PathBuf,
    pub outputs_dir: PathBuf,
    pub max_file_size_bytes: u64,
    /// Lower-cased, each with a leading dot.
    pub allowed_extensions: Vec<String>,
}

impl FileStoreConfig {
    pub fn from_args(args: &Args) -> Self {
        Self {
            uploads_dir: PathBuf::from(&args.uploads_dir),
            outputs_dir: PathBuf::from(&args.outputs_dir),
            max_file_size_bytes: args.max_file_size_mb.saturating_mul(1024 * 1024),
            allowed_extensions: normalize_extensions(&args.allowed_file_extensions),
        }
    }
}

fn normalize_extensions(raw: &[String]) -> Vec<String> {
    raw.iter()
        .map(|ext| ext.trim().to_lowercase())
        .filter(|ext| !ext.is_empty())
        .map(|ext| if ext.starts_with('.') { ext } else { format!(".{}", ext) })
        .collect()
}
