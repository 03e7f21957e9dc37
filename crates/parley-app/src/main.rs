//! Parley application binary - composition root.
//!
//! 1. Resolve configuration (file, env, flags) and validate it
//! 2. Open the SQLite conversation store
//! 3. Wire the agent orchestrator and tool gateway
//! 4. Pick the identity verifier
//! 5. Serve the HTTP API until Ctrl-C

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use parley_agent::{AgentOrchestrator, HttpAgentOrchestrator, HttpToolGateway, UnconfiguredOrchestrator};
use parley_api::auth::{IdentityVerifier, NoAuthVerifier, ProviderVerifier};
use parley_api::routes;
use parley_api::state::AppState;
use parley_chat::ChatService;
use parley_core::config::ParleyConfig;
use parley_storage::{ConversationStore, Database};

use cli::CliArgs;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    // Config: file, then env, then flags.
    let config_file = args.resolve_config_path();
    let mut config = ParleyConfig::load_or_default(&config_file)?;
    config.apply_env()?;
    args.apply_overrides(&mut config);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.general.log_level)),
        )
        .init();

    tracing::info!("Starting Parley v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        path = %config_file.display(),
        found = config_file.exists(),
        environment = %config.general.environment,
        "Configuration resolved"
    );
    config.validate()?;

    // Storage.
    let db = Arc::new(Database::open(&config.database.url)?);
    let store = ConversationStore::new(db);
    match store.stats() {
        Ok(stats) => tracing::info!(
            url = %config.database.url,
            conversations = stats.conversations,
            messages = stats.messages,
            "Conversation store opened"
        ),
        Err(e) => tracing::warn!(error = %e, "Could not read store statistics"),
    }

    let http = reqwest::Client::builder()
        .user_agent(concat!("parley/", env!("CARGO_PKG_VERSION")))
        .build()?;

    // Agent.
    let gateway = Arc::new(HttpToolGateway::new(http.clone(), &config.tools));
    let orchestrator: Arc<dyn AgentOrchestrator> = match config.agent.endpoint.clone() {
        Some(endpoint) => {
            tracing::info!(
                endpoint = %endpoint,
                model = %config.agent.default_model,
                tools = config.tools.len(),
                "Agent orchestrator configured"
            );
            Arc::new(HttpAgentOrchestrator::new(
                http.clone(),
                endpoint,
                config.model_selector()?,
                &config.agent,
                gateway,
            ))
        }
        None => {
            tracing::warn!("No agent endpoint configured; every turn will record an error reply");
            Arc::new(UnconfiguredOrchestrator)
        }
    };

    let chat = ChatService::new(
        store,
        orchestrator,
        config.chat.clone(),
        Duration::from_secs(config.agent.timeout_secs),
    );

    // Auth.
    let verifier: Arc<dyn IdentityVerifier> = match ProviderVerifier::from_config(http, &config.auth) {
        Some(verifier) => {
            tracing::info!(base_uri = %config.auth.base_uri, "Identity provider configured");
            Arc::new(verifier)
        }
        None => {
            tracing::warn!("No identity provider configured; running in no-auth development mode");
            Arc::new(NoAuthVerifier)
        }
    };

    let state = AppState::new(config.clone(), chat, verifier);
    routes::start_server(&config, state, shutdown_signal()).await?;

    tracing::info!("Parley stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
