pub mod agent;
pub mod cli;
pub mod config;
pub mod files;
pub mod history;
pub mod llm;
pub mod models;
pub mod server;

use agent::ConversationAgent;
use cli::Args;
use config::FileStoreConfig;
use files::FileStore;
use log::{ info, warn };
use server::Server;
use std::error::Error;
use std::sync::Arc;

pub async fn run(args: Args) -> Result<(), Box<dyn Error + Send + Sync>> {
    info!("--- Core Configuration ---");
    info!("Server Address: {}", args.server_addr);
    info!("TLS Enabled: {}", args.enable_tls);
    info!("CORS Origins: {}", args.cors_origins.join(", "));
    info!("Agent Name: {}", args.agent_name);
    info!("Model: {}", args.openrouter_model);
    info!("Provider Base URL: {}", args.openrouter_base_url);
    info!("Uploads Dir: {}", args.uploads_dir);
    info!("Outputs Dir: {}", args.outputs_dir);
    info!("Max File Size: {}MB", args.max_file_size_mb);
    info!("Allowed Extensions: {}", args.allowed_file_extensions.join(", "));
    info!("-------------------------");

    if args.openrouter_api_key.trim().is_empty() {
        warn!("OPENROUTER_API_KEY is not set; the agent will report itself offline.");
    }

    let files = Arc::new(FileStore::new(FileStoreConfig::from_args(&args)));
    files.init().await?;

    let agent = Arc::new(ConversationAgent::from_args(&args)?);
    let addr = args.server_addr.clone();
    info!("Starting server on: {}", addr);
    let server = Server::new(addr, agent, files, args);
    server.run().await?;

    Ok(())
}
