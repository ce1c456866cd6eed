//! `rivet ask` and `rivet pipeline`: one message, one answer.

use crate::app::App;
use anyhow::bail;
use rivet_config::AgentMode;

pub async fn run(mut app: App, message: &str, pipeline: bool) -> anyhow::Result<()> {
    let message = message.trim();
    if message.is_empty() {
        bail!("message must not be empty");
    }

    let mode = if pipeline { AgentMode::Pipeline } else { app.config.agent.mode };
    app.turn(message, mode).await?;
    println!();
    Ok(())
}
