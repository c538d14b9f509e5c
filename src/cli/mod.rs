use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Server Args ---
    /// Host address and port for the HTTP server to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:8000")]
    pub server_addr: String,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,

    /// Origins allowed by CORS. Use "*" to allow any origin.
    #[arg(
        long,
        env = "CORS_ORIGINS",
        value_delimiter = ',',
        default_value = "http://localhost:3000,http://127.0.0.1:3000"
    )]
    pub cors_origins: Vec<String>,

    // --- Upstream Provider Args ---
    /// API key for OpenRouter. Without it the agent reports itself offline.
    #[arg(long, env = "OPENROUTER_API_KEY", default_value = "", hide_env_values = true)]
    pub openrouter_api_key: String,

    /// Model requested from the provider (e.g., anthropic/claude-3-haiku)
    #[arg(long, env = "OPENROUTER_MODEL", default_value = "anthropic/claude-3-haiku")]
    pub openrouter_model: String,

    /// Base URL of the OpenAI-compatible API; /chat/completions is appended.
    #[arg(long, env = "OPENROUTER_BASE_URL", default_value = "https://openrouter.ai/api/v1")]
    pub openrouter_base_url: String,

    /// Value sent as HTTP-Referer for provider attribution.
    #[arg(long, env = "OPENROUTER_REFERER", default_value = "http://localhost:3000")]
    pub openrouter_referer: String,

    /// Value sent as X-Title for provider attribution.
    #[arg(long, env = "OPENROUTER_APP_TITLE", default_value = "Agent UI Challenge")]
    pub openrouter_app_title: String,

    // --- Agent Args ---
    #[arg(long, env = "AGENT_NAME", default_value = "FileProcessorAgent")]
    pub agent_name: String,

    #[arg(
        long,
        env = "AGENT_DESCRIPTION",
        default_value = "AI agent for processing and analyzing text files"
    )]
    pub agent_description: String,

    // --- File Args ---
    /// Maximum accepted upload size in megabytes.
    #[arg(long, env = "MAX_FILE_SIZE_MB", default_value = "10")]
    pub max_file_size_mb: u64,

    /// Accepted upload extensions, including the leading dot.
    #[arg(long, env = "ALLOWED_FILE_EXTENSIONS", value_delimiter = ',', default_value = ".txt")]
    pub allowed_file_extensions: Vec<String>,

    #[arg(long, env = "UPLOADS_DIR", default_value = "./uploads")]
    pub uploads_dir: String,

    #[arg(long, env = "OUTPUTS_DIR", default_value = "./outputs")]
    pub outputs_dir: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lists_and_overrides() {
        let args = Args::try_parse_from([
            "file-agent-relay",
            "--openrouter-api-key",
            "sk-test",
            "--allowed-file-extensions",
            ".txt,.md",
            "--cors-origins",
            "*",
            "--max-file-size-mb",
            "2",
        ]).unwrap();
        assert_eq!(args.openrouter_api_key, "sk-test");
        assert_eq!(args.allowed_file_extensions, vec![".txt".to_string(), ".md".to_string()]);
        assert_eq!(args.cors_origins, vec!["*".to_string()]);
        assert_eq!(args.max_file_size_mb, 2);
    }
}
