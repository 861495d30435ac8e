//! Command-line interface for conductor.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::agent_loop::OrchestratorKind;

#[derive(Parser, Debug)]
#[command(name = "conductor", version, about = "Conversational agent orchestration")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run one or more prompts on a single session
    Chat(ChatArgs),
    /// Start the HTTP front end
    #[cfg(feature = "server")]
    Serve(ServeArgs),
}

/// Arguments for the `chat` subcommand.
#[derive(Parser, Debug)]
pub struct ChatArgs {
    /// Turn strategy (reactive, plan-execute)
    #[arg(short, long)]
    pub orchestrator: Option<OrchestratorKind>,

    /// System prompt
    #[arg(short, long)]
    pub system: Option<String>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Leave the delegate tool out of the registry
    #[arg(long)]
    pub no_delegate: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Prompts, run in order as separate turns
    #[arg(required = true)]
    pub prompts: Vec<String>,
}

/// Arguments for the `serve` subcommand.
#[cfg(feature = "server")]
#[derive(Parser, Debug)]
pub struct ServeArgs {
    /// Listen address
    #[arg(short, long, default_value = "127.0.0.1:8080")]
    pub addr: std::net::SocketAddr,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn verbose(&self) -> bool {
        match &self.command {
            Commands::Chat(args) => args.verbose,
            #[cfg(feature = "server")]
            Commands::Serve(args) => args.verbose,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn parse_chat_with_defaults() {
        let cli = Cli::try_parse_from(["conductor", "chat", "hello"]).unwrap();
        match cli.command {
            Commands::Chat(args) => {
                assert!(args.orchestrator.is_none());
                assert!(args.system.is_none());
                assert!(args.config.is_none());
                assert!(!args.no_delegate);
                assert!(!args.verbose);
                assert_eq!(args.prompts, vec!["hello"]);
            }
            #[allow(unreachable_patterns)]
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_chat_with_all_options() {
        let cli = Cli::try_parse_from([
            "conductor",
            "chat",
            "-o",
            "plan-execute",
            "-s",
            "You are terse",
            "--config",
            "/tmp/conductor.toml",
            "--no-delegate",
            "-v",
            "what is 2+2?",
            "and the time?",
        ])
        .unwrap();
        assert!(cli.verbose());
        match cli.command {
            Commands::Chat(args) => {
                assert_eq!(args.orchestrator, Some(OrchestratorKind::PlanExecute));
                assert_eq!(args.system.as_deref(), Some("You are terse"));
                assert_eq!(args.config, Some(PathBuf::from("/tmp/conductor.toml")));
                assert!(args.no_delegate);
                assert_eq!(args.prompts.len(), 2);
            }
            #[allow(unreachable_patterns)]
            other => panic!("expected Chat, got {other:?}"),
        }
    }

    #[test]
    fn parse_unknown_orchestrator_is_error() {
        assert!(Cli::try_parse_from(["conductor", "chat", "-o", "swarm", "hi"]).is_err());
    }

    #[test]
    fn parse_missing_prompt_is_error() {
        assert!(Cli::try_parse_from(["conductor", "chat"]).is_err());
    }

    #[test]
    fn parse_missing_subcommand_is_error() {
        assert!(Cli::try_parse_from(["conductor"]).is_err());
    }

    #[cfg(feature = "server")]
    #[test]
    fn parse_serve_default_addr() {
        let cli = Cli::try_parse_from(["conductor", "serve"]).unwrap();
        match cli.command {
            Commands::Serve(args) => assert_eq!(args.addr.to_string(), "127.0.0.1:8080"),
            other => panic!("expected Serve, got {other:?}"),
        }
    }
}
