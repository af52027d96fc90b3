//! `codeloop chat`: Interactive or single-message chat mode.

use std::io::Write;

use codeloop_agent::{ChatFailure, ChatReply, ChatRequest, Orchestrator};
use codeloop_config::AppConfig;
use codeloop_core::message::ConversationId;
use codeloop_core::step::{StepKind, StepRecord};
use codeloop_providers::BackendKind;
use tokio::io::{AsyncBufReadExt, BufReader};

use crate::app::App;

pub async fn run(
    message: Option<String>,
    model: String,
    conversation: Option<String>,
) -> Result<(), Box<dyn std::error::Error>> {
    let kind: BackendKind = model.parse()?;
    let app = App::load()?;

    // Check for a key early so the error is clear
    if !app.orchestrator.backends().is_available(kind) {
        let var = match kind {
            BackendKind::Gpt4 => "OPENAI_API_KEY",
            BackendKind::Gemini => "GEMINI_API_KEY",
        };
        eprintln!();
        eprintln!("  ERROR: backend '{kind}' has no API key.");
        eprintln!();
        eprintln!("  Set the {var} environment variable, or add it to:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err(format!("{kind} is not configured").into());
    }

    let conversation_id = conversation
        .map(ConversationId)
        .unwrap_or_default();

    if let Some(msg) = message {
        let ok = send(&app.orchestrator, &conversation_id, kind, msg).await;
        if !ok {
            return Err("chat failed".into());
        }
        return Ok(());
    }

    println!();
    println!("  codeloop interactive mode");
    println!();
    println!("  Backend:       {kind}");
    println!("  Conversation:  {conversation_id}");
    println!("  Tools:         {}", app.orchestrator.tools().names().join(", "));
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+C to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        send(&app.orchestrator, &conversation_id, kind, line.to_string()).await;
    }

    Ok(())
}

/// Run one message and print the result. Returns whether it succeeded.
async fn send(
    orchestrator: &Orchestrator,
    conversation_id: &ConversationId,
    kind: BackendKind,
    message: String,
) -> bool {
    let request = ChatRequest::new(message)
        .with_conversation(conversation_id.as_str())
        .with_model(kind.as_str());

    eprint!("  ...");
    let result = orchestrator.handle(request).await;
    eprint!("\r     \r");

    match result {
        Ok(reply) => {
            print_reply(&reply);
            true
        }
        Err(failure) => {
            print_failure(&failure);
            false
        }
    }
}

fn print_reply(reply: &ChatReply) {
    println!();
    for step in &reply.steps {
        print_step(step);
    }
    println!();
}

fn print_failure(failure: &ChatFailure) {
    println!();
    for step in &failure.steps {
        print_step(step);
    }
    eprintln!("  Error: {}", failure.message);
    println!();
}

fn print_step(step: &StepRecord) {
    match step.kind {
        StepKind::Think => println!("  [think]   {}", step.content),
        StepKind::Action => {
            let input = step
                .input
                .as_ref()
                .map(|v| v.to_string())
                .unwrap_or_default();
            println!("  [action]  {} {input}", step.tool.as_deref().unwrap_or("?"));
        }
        StepKind::Observe => println!("  [observe] {}", step.content),
        StepKind::Error => println!("  [error]   {}", step.content),
        StepKind::Output => {
            for line in step.content.lines() {
                println!("  Agent > {line}");
            }
        }
    }
}
