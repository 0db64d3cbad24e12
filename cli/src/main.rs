//! Lectern CLI binary: run the conversational analytics service.
//!
//! `lectern serve` loads `.env` / XDG config, wires the service graph, and
//! serves HTTP (+SSE) until ctrl-c. Without an `OPENAI_API_KEY`, LLM agents
//! run against the scripted mock client (loudly logged) so the service stays
//! usable for local demos with `USE_MOCK_DATA=1`.

use std::net::SocketAddr;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use lectern::llm::{ChatOpenAI, LlmClient, MockLlm};
use lectern::{Service, Settings};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "lectern")]
#[command(about = "Lectern — conversational analytics pages for teachers")]
struct Args {
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP server (default).
    Serve {
        /// Bind address.
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        /// Bind port.
        #[arg(long, default_value_t = 8000)]
        port: u16,
    },
    /// Print the registered tool catalog and exit.
    Tools,
}

fn build_llm(settings: &Settings) -> Arc<dyn LlmClient> {
    if std::env::var("OPENAI_API_KEY").is_ok() {
        Arc::new(ChatOpenAI::new(settings.model.clone()).with_temperature(0.1))
    } else {
        warn!("OPENAI_API_KEY not set; LLM agents run on the mock client");
        Arc::new(MockLlm::new(
            "{\"intent\": \"chat_smalltalk\", \"confidence\": 1.0}",
        ))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    match config::apply("lectern", None) {
        Ok(applied) => info!(
            from_dotenv = applied.from_dotenv,
            from_xdg = applied.from_xdg,
            "configuration applied"
        ),
        Err(e) => warn!(error = %e, "configuration load failed, using process env only"),
    }

    let args = Args::parse();
    let settings = Arc::new(Settings::from_env());
    let llm = build_llm(&settings);
    let service = Arc::new(Service::build(settings, llm)?);

    match args.cmd.unwrap_or(Command::Serve {
        host: "127.0.0.1".into(),
        port: 8000,
    }) {
        Command::Serve { host, port } => {
            let addr: SocketAddr = format!("{host}:{port}").parse()?;
            serve::run(addr, service).await?;
        }
        Command::Tools => {
            for spec in service.registry.specs() {
                println!("{}\n    {}", spec.name, spec.description);
            }
        }
    }
    Ok(())
}
