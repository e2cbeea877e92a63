//! `tandem run` - Ask a question and iterate on it with the operator.

use std::sync::Arc;

use tandem_agent::{HumanFeedbackGate, IterationController, ReflectionRunner};
use tandem_config::AppConfig;
use tandem_core::message::ConversationId;
use tandem_core::provider::Provider;
use tandem_providers::OpenAiCompatProvider;
use tandem_store::{FileStore, save_history};
use tandem_telemetry::TraceRecorder;
use tracing::{debug, info, warn};

use crate::console::{ConsoleSink, StdinOperator, banner};

const EXAMPLE_QUESTIONS: [&str; 5] = [
    "List the files in the current directory",
    "Show the contents of main.rs",
    "Check the system's memory usage",
    "Find the lines in main.rs that contain 'fn'",
    "Run a quick system health check",
];

const QUESTION_PROMPT: &str = "Enter your question or task (empty for the default):";

pub async fn run(
    question: Option<String>,
    max_iterations: Option<u32>,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(max) = max_iterations {
        config.control.max_iterations = max;
    }
    config.validate()?;

    // Fail early, before any prompt, without an API key
    if !config.has_api_key() {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    TANDEM_API_KEY=sk-...");
        eprintln!("    OPENAI_API_KEY=sk-...");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let provider: Arc<dyn Provider> = Arc::new(OpenAiCompatProvider::from_config(&config)?);
    let runner = Arc::new(ReflectionRunner::from_config(provider, &config));
    let mut gate = HumanFeedbackGate::new(Box::new(StdinOperator::new()));

    println!("{}", banner("Human-in-the-loop agent loop"));
    println!("An executor answers, a critic reviews, and you decide what happens next.");
    println!();
    println!("Example questions:");
    for (i, q) in EXAMPLE_QUESTIONS.iter().enumerate() {
        println!("  {}. {q}", i + 1);
    }
    println!();

    let question = match question.filter(|q| !q.trim().is_empty()) {
        Some(q) => q,
        None => {
            let q = gate
                .ask(QUESTION_PROMPT, &config.control.default_question)
                .await?;
            if q == config.control.default_question {
                println!("\nUsing the default question: {q}\n");
            }
            q
        }
    };

    let conversation = ConversationId::new();
    let mut controller = IterationController::new(runner, gate, config.control.clone())
        .with_sink(Box::new(ConsoleSink::stdout()));

    let recorder = config.trace.enabled.then(|| {
        let recorder = Arc::new(TraceRecorder::new(config.trace.service_name.as_str()));
        recorder.start_trace(conversation.to_string());
        recorder
    });
    if let Some(recorder) = &recorder {
        controller = controller.with_hook(recorder.clone());
    }

    let cancel = controller.cancellation();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping the loop");
            cancel.cancel();
        }
    });

    let report = controller.run(question).await;

    if config.control.persist_history && !report.history.is_empty() {
        let store = FileStore::new(AppConfig::config_dir().join("checkpoints"));
        match save_history(&store, &conversation, &report.history).await {
            Ok(key) => info!(key = %key, dir = %store.dir().display(), "History saved"),
            Err(e) => warn!(error = %e, "Failed to save history"),
        }
    }

    if let Some(recorder) = recorder {
        recorder.finish();
        let summary = recorder.summary();
        info!(
            turns = summary.turns,
            failed_turns = summary.failed_turns,
            tool_calls = summary.tool_calls,
            duration_ms = summary.total_duration_ms,
            "Trace recorded"
        );
        match recorder.export_json() {
            Ok(json) => debug!(trace = %json, "Trace export"),
            Err(e) => warn!(error = %e, "Failed to export trace"),
        }
    }

    if report.reason.is_failure() {
        return Err(report.reason.describe().into());
    }
    Ok(())
}
