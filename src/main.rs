use anyhow::Context;
use clap::Parser;
use howdoi::context::ContextBuilder;
use howdoi::report::{consume, Reporter};
use howdoi::{Client, ModelSpec, PricingRegistry};
use tracing_subscriber::EnvFilter;

/// CLI tool to interact with LLM APIs. Messages can be written text, text
/// or image files, or web page URLs.
#[derive(Debug, Parser)]
#[command(name = "howdoi", version)]
struct Cli {
    /// Model alias (opus, sonnet, haiku, gpt, mini, flash, pro).
    #[arg(short, long, default_value = "sonnet")]
    model: String,

    /// Maximum number of tokens to generate.
    #[arg(short = 't', long, default_value_t = 4096)]
    max_tokens: u32,

    /// Sampling temperature.
    #[arg(short = 'e', long, default_value_t = 0.1)]
    temperature: f64,

    /// Print usage, cost and throughput after the answer.
    #[arg(short, long)]
    verbose: bool,

    /// Prompt text, context files, images or URLs, in order.
    #[arg(required = true, num_args = 1..)]
    messages: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    // A missing .env is fine.
    let _ = dotenvy::dotenv();
    init_tracing(cli.verbose);

    let spec = ModelSpec::resolve(&cli.model)
        .with_context(|| format!("available models: {}", ModelSpec::aliases()))?;
    let client = Client::from_env().context("failed to build HTTP client")?;
    client.require_credential(spec.provider)?;

    let message = ContextBuilder::with_default_cache(reqwest::Client::new())
        .build_message(&cli.messages)
        .await
        .context("failed to assemble the prompt")?;

    let exchange = client
        .stream(spec.alias, &message)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .send()
        .await?;

    let mut reporter = Reporter::new(std::io::stdout(), std::io::stderr(), cli.verbose);
    let summary = consume(exchange, &mut reporter, &PricingRegistry::new()).await?;
    tracing::debug!(?summary, "exchange finished");
    Ok(())
}

fn init_tracing(verbose: bool) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { "info" } else { "warn" }));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact()
        .init();
}
