use anyhow::Context;
use moderation_service::{
    config::Config,
    models::PretrainExample,
    services::{FileStateStore, ModerationAgent, RuleSet, TextModerator},
};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(true)
        .with_level(true)
        .init();

    tracing::info!("Starting moderation service...");

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!(
        service = %config.service_name,
        environment = %config.environment,
        state_path = %config.state_path,
        "Configuration loaded"
    );

    // Initialize text moderator
    let text_moderator = match &config.sensitive_words_path {
        Some(path) => TextModerator::with_terms_file(path)
            .with_context(|| format!("Failed to load sensitive words from {}", path))?,
        None => TextModerator::new(),
    };
    tracing::info!(terms = text_moderator.terms().len(), "Text moderator initialized");

    let rules = RuleSet::new(Arc::new(text_moderator));
    let store = Arc::new(match &config.state_dir {
        Some(dir) => FileStateStore::in_dir(dir, &config.state_path)?,
        None => FileStateStore::new(&config.state_path)?,
    });
    let pretrain_path = config.pretrain_examples_path.clone();

    let agent = ModerationAgent::bootstrap(config, rules, store).await?;

    if let Some(path) = pretrain_path {
        let raw = tokio::fs::read(&path)
            .await
            .with_context(|| format!("Failed to read pretraining examples from {}", path))?;
        let examples: Vec<PretrainExample> = serde_json::from_slice(&raw)
            .with_context(|| format!("Invalid pretraining examples in {}", path))?;
        let applied = agent.pretrain_from_examples(&examples).await;
        tracing::info!(applied, path = %path, "Pretrained from examples");
    }

    let stats = agent.get_statistics().await;
    tracing::info!(
        q_table_size = stats.q_table_size,
        epsilon = stats.epsilon,
        learning_rate = stats.learning_rate,
        discount_factor = stats.discount_factor,
        "Moderation agent ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;
    tracing::info!("Shutdown signal received, saving agent state");

    if let Err(e) = agent.save_state().await {
        tracing::error!("Final state save failed: {}", e);
    }

    Ok(())
}
