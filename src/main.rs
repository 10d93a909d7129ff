//! Mesa daemon: wires the engine to its adapters and drives it from a
//! line-oriented console loop. The HTTP surface lives in a separate
//! routing service; this binary is the engine plus a local driver.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use mesa::adapters::{
    AnthropicConfig, AnthropicProvider, FileConversationStore, FileIdRegistry, FileSessionStore,
};
use mesa::application::handlers::{ProcessTurnHandler, TurnRequest, TurnResponse};
use mesa::config::AppConfig;
use mesa::domain::engine::{Classifier, EscalationPolicy, StageMachine, StepGenerator};
use mesa::ports::AiProvider;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config = AppConfig::load()?;
    config.validate()?;

    let handler = build_handler(&config)?;
    tracing::info!(data_dir = %config.storage.data_dir.display(), "mesa engine ready");

    run_console(handler).await
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("MESA_LOG_JSON").is_ok() {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn build_handler(config: &AppConfig) -> Result<ProcessTurnHandler, Box<dyn std::error::Error>> {
    let api_key = config
        .ai
        .anthropic_api_key
        .clone()
        .ok_or("MESA__AI__ANTHROPIC_API_KEY is not set")?;
    let provider: Arc<dyn AiProvider> = Arc::new(AnthropicProvider::new(
        AnthropicConfig::new(api_key)
            .with_model(&config.ai.model)
            .with_timeout(config.ai.timeout()),
    )?);

    let machine = Arc::new(
        StageMachine::new(
            Classifier::new(provider.clone(), config.ai.timeout()),
            StepGenerator::new(provider, config.ai.timeout(), config.engine.coherence),
            EscalationPolicy::new(config.engine.handoff_base_url.clone()),
            config.engine.clarification_limit,
            config.engine.diagnostic_attempt_limit,
        )
        .with_escalate_risk(config.engine.escalate_risk_level),
    );

    let allocator = FileIdRegistry::new(config.storage.registry_path())
        .with_id_length(config.storage.id_length)
        .with_max_draws(config.storage.id_max_draws)
        .with_lock_retries(config.storage.lock_retries)
        .with_backoff_base(config.storage.lock_backoff());

    Ok(ProcessTurnHandler::new(
        Arc::new(allocator),
        Arc::new(FileSessionStore::new(config.storage.sessions_dir())),
        Arc::new(FileConversationStore::new(config.storage.conversations_dir())),
        machine,
        config.engine.dedup_window(),
    ))
}

/// Console driver: plain lines are user text, `!TOKEN` presses a button,
/// `exit` quits.
async fn run_console(handler: ProcessTurnHandler) -> Result<(), Box<dyn std::error::Error>> {
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    let opening = handler.handle(TurnRequest::default()).await?;
    let mut conversation_id = opening.conversation_id.clone();
    print_turn(&mut stdout, &opening).await?;

    while let Some(line) = lines.next_line().await? {
        let line = line.trim().to_string();
        if line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.is_empty() {
            continue;
        }

        let request = if let Some(token) = line.strip_prefix('!') {
            TurnRequest {
                conversation_id: Some(conversation_id.clone()),
                button: Some(token.trim().to_string()),
                ..TurnRequest::default()
            }
        } else {
            TurnRequest {
                conversation_id: Some(conversation_id.clone()),
                user_text: Some(line),
                ..TurnRequest::default()
            }
        };

        match handler.handle(request).await {
            Ok(response) => {
                let ended = response.end_conversation;
                print_turn(&mut stdout, &response).await?;
                if ended {
                    break;
                }
                conversation_id = response.conversation_id;
            }
            Err(err) if err.is_retryable() => {
                tracing::error!(error = %err, "turn failed, please retry");
            }
            Err(err) => {
                tracing::error!(error = %err, "turn rejected");
            }
        }
    }

    Ok(())
}

async fn print_turn(
    stdout: &mut tokio::io::Stdout,
    response: &TurnResponse,
) -> Result<(), std::io::Error> {
    let mut out = format!("\n[{}] {}\n", response.stage, response.reply);
    for button in &response.buttons {
        out.push_str(&format!("  !{}  ({})\n", button.token, button.label));
    }
    out.push_str("> ");
    stdout.write_all(out.as_bytes()).await?;
    stdout.flush().await
}
