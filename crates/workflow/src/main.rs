//! `postwise` -- headless run of the content wizard.
//!
//! Analyzes one website, logs streamed progress, picks the first strategy
//! and generates topics. In demo mode (or with a session) it also drafts a
//! post for the first topic and prints it as Markdown.
//!
//! ```text
//! postwise <url> [--demo]
//! ```
//!
//! Backend endpoints and timings come from the environment; see
//! [`WorkflowConfig::from_env`].

use std::sync::Arc;

use anyhow::Context;
use postwise_backend::HttpBackend;
use postwise_core::workflow::ExportFormat;
use postwise_workflow::auth::Gated;
use postwise_workflow::notices::WorkflowNotice;
use postwise_workflow::{WorkflowConfig, WorkflowOrchestrator};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "postwise_workflow=debug,postwise_backend=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut url = None;
    let mut demo = false;
    for arg in std::env::args().skip(1) {
        if arg == "--demo" {
            demo = true;
        } else if url.is_none() {
            url = Some(arg);
        } else {
            anyhow::bail!("unexpected argument '{arg}'");
        }
    }
    let url = url.context("usage: postwise <url> [--demo]")?;

    let mut config = WorkflowConfig::from_env();
    if demo {
        config = config.with_demo_mode(true);
    }
    tracing::info!(
        api_url = %config.api_url,
        ws_url = %config.ws_url,
        demo_mode = config.demo_mode,
        "Starting postwise",
    );

    let backend = HttpBackend::new(&config.api_url, &config.ws_url, config.request_timeout)
        .context("failed to build backend client")?;
    let mut orchestrator = WorkflowOrchestrator::new(Arc::new(backend), config);

    let mut notices = orchestrator.subscribe_notices();
    tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(WorkflowNotice::AnalysisProgress { phase, message, .. }) => {
                    tracing::info!(phase = %phase, "{message}");
                }
                Ok(notice) => tracing::debug!(?notice, "Workflow notice"),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Notice logger fell behind");
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let quality = orchestrator.start_analysis(&url).await?;
    tracing::info!(?quality, "Analysis complete");

    let strategy = orchestrator.select_strategy(0)?;
    tracing::info!(
        customer_problem = strategy.customer_problem.as_deref().unwrap_or("-"),
        "Selected first strategy",
    );

    let topics = orchestrator.continue_to_topics().await?;
    for topic in &topics {
        println!("- {} ({})", topic.title, topic.id);
    }
    let Some(topic) = topics.first() else {
        tracing::warn!("No topics were generated");
        return Ok(());
    };

    let content = match orchestrator.generate_content(&topic.id).await? {
        Gated::Proceed(content) => content,
        Gated::AuthRequired(action) => {
            tracing::warn!(action = %action.label, "Sign-in required; rerun with --demo");
            return Ok(());
        }
    };
    tracing::info!(topic_id = %content.topic_id, "Draft generated");

    match orchestrator.export_as(ExportFormat::Markdown).await? {
        Gated::Proceed(artifact) => {
            tracing::info!(filename = %artifact.filename, "Exported");
            println!("{}", artifact.body);
        }
        Gated::AuthRequired(action) => {
            tracing::warn!(action = %action.label, "Sign-in required; rerun with --demo");
        }
    }

    orchestrator.shutdown();
    Ok(())
}
