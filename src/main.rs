//! conductor binary entry point.

use std::io::Write;

use conductor::agent::Agent;
use conductor::agent_loop::AgentEvent;
use conductor::cli::{ChatArgs, Cli, Commands};
use conductor::config::ConductorConfig;
use futures::StreamExt;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() {
    let cli = Cli::parse_args();

    let filter = if cli.verbose() { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let result = match cli.command {
        Commands::Chat(args) => handle_chat(args).await,
        #[cfg(feature = "server")]
        Commands::Serve(args) => handle_serve(args).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

async fn handle_chat(args: ChatArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = ConductorConfig::load(args.config.as_deref())?;
    if let Some(kind) = args.orchestrator {
        config.orchestrator = kind;
    }
    if let Some(system) = args.system {
        config.system_prompt = system;
    }
    if !config.has_api_key() {
        tracing::warn!("no API key set (CONDUCTOR_API_KEY or OPENROUTER_API_KEY)");
    }

    let pool = config.tool_pool()?;
    let agent = Agent::new(config.agent_config(Some(config.backend()), pool, !args.no_delegate));

    for prompt in args.prompts {
        let mut stream = agent.prompt(prompt);
        while let Some(event) = stream.next().await {
            print_event(&event);
        }
        println!();
        stream.result().await?;
    }
    Ok(())
}

fn print_event(event: &AgentEvent) {
    match event {
        AgentEvent::TextDelta { text, .. } => {
            print!("{text}");
            let _ = std::io::stdout().flush();
        }
        AgentEvent::Thinking { text } => eprintln!("~ {text}"),
        AgentEvent::ToolCall {
            tool_call_id,
            tool_name,
            args,
        } => eprintln!("> {tool_name} ({tool_call_id}) {args}"),
        AgentEvent::ToolResult {
            tool_name, result, error, ..
        } => match error {
            Some(error) => eprintln!("< {tool_name} failed: {error}"),
            None => eprintln!("< {tool_name} {}", truncate(&result.to_string(), 200)),
        },
        AgentEvent::PlanCreated { step_count, steps } => {
            eprintln!("plan: {step_count} step(s)");
            for (i, step) in steps.iter().enumerate() {
                eprintln!("  {}. {} {}", i + 1, step.tool, step.args);
            }
        }
        AgentEvent::PlanStepStart {
            index, step_count, tool, ..
        } => eprintln!("step {}/{step_count}: {tool}", index + 1),
        AgentEvent::PlanStepEnd {
            index,
            error: Some(error),
            ..
        } => eprintln!("step {} failed: {error}", index + 1),
        AgentEvent::TurnStart { .. }
        | AgentEvent::SteeringMode { .. }
        | AgentEvent::TurnEnd { .. }
        | AgentEvent::PlanStepEnd { .. } => {}
    }
}

fn truncate(text: &str, max: usize) -> String {
    if text.len() <= max {
        return text.to_string();
    }
    let mut end = max;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &text[..end])
}

#[cfg(feature = "server")]
async fn handle_serve(args: conductor::cli::ServeArgs) -> Result<(), Box<dyn std::error::Error>> {
    let config = ConductorConfig::load(args.config.as_deref())?;
    conductor::server::serve(config, args.addr).await?;
    Ok(())
}
