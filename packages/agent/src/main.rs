use agent::{Agent, AgentConfig, CommandPrinter};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = AgentConfig::parse();
    let printer = CommandPrinter::from_command(&config.print_command)?;
    let agent = Agent::new(&config, printer);

    let end = agent
        .run(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for interrupt: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;

    tracing::info!("Agent stopped: {:?}", end);
    Ok(())
}
