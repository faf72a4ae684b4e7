// ABOUTME: CLI binary for the reprint pipeline.
// ABOUTME: Reads adapter credentials from the environment, prompts for a URL, runs one article.

use std::io::{self, BufRead, Write};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use clap::Parser;
use reprint::{ChatRewriter, Pipeline, PipelineReport, WordPressPublisher};

#[derive(Parser, Debug)]
#[command(name = "reprint")]
#[command(about = "Fetch an article, rewrite it, migrate its images, and republish it")]
struct Args {
    /// Source article URL. Prompted for interactively when omitted.
    url: Option<String>,

    /// Output the run report as JSON instead of a text summary
    #[arg(long)]
    json: bool,

    /// Allow fetching from private/local networks
    #[arg(long = "allow-private-networks")]
    allow_private_networks: bool,
}

/// Adapter credentials, read from the environment.
struct Config {
    wordpress_url: String,
    wordpress_user: String,
    wordpress_password: String,
    openai_api_key: String,
    openai_base: String,
    openai_model: String,
}

impl Config {
    fn from_env() -> Result<Self> {
        Ok(Self {
            wordpress_url: require("REPRINT_WORDPRESS_URL")?,
            wordpress_user: require("REPRINT_WORDPRESS_USER")?,
            wordpress_password: require("REPRINT_WORDPRESS_PASSWORD")?,
            openai_api_key: require("REPRINT_OPENAI_API_KEY")?,
            openai_base: std::env::var("REPRINT_OPENAI_BASE")
                .unwrap_or_else(|_| ChatRewriter::DEFAULT_BASE_URL.to_string()),
            openai_model: std::env::var("REPRINT_OPENAI_MODEL")
                .unwrap_or_else(|_| ChatRewriter::DEFAULT_MODEL.to_string()),
        })
    }
}

fn require(name: &str) -> Result<String> {
    std::env::var(name).with_context(|| format!("missing required environment variable {}", name))
}

fn prompt_for_url() -> Result<String> {
    print!("Enter article URL: ");
    io::stdout().flush().context("failed to flush stdout")?;
    let mut line = String::new();
    io::stdin()
        .lock()
        .read_line(&mut line)
        .context("failed to read URL from stdin")?;
    Ok(line.trim().to_string())
}

async fn execute(args: &Args) -> Result<PipelineReport> {
    let config = Config::from_env()?;

    let url = match &args.url {
        Some(url) => url.clone(),
        None => prompt_for_url()?,
    };
    if url.is_empty() {
        bail!("no article URL provided");
    }

    let rewriter =
        ChatRewriter::new(config.openai_base, config.openai_api_key, config.openai_model);
    let publisher = WordPressPublisher::new(
        &config.wordpress_url,
        config.wordpress_user,
        config.wordpress_password,
    )?;

    let pipeline = Pipeline::builder()
        .allow_private_networks(args.allow_private_networks)
        .build(rewriter, publisher);

    Ok(pipeline.run(&url).await?)
}

fn print_report(report: &PipelineReport, json: bool) {
    if json {
        println!("{}", serde_json::to_string_pretty(report).unwrap());
    } else if report.success {
        println!("Success! Post ID: {}", report.post_id.unwrap_or_default());
        println!("Content length: {}", report.final_content_length);
        println!("Images migrated: {}", report.images_migrated);
    } else {
        println!("Process failed. Check the logs.");
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("reprint=info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();

    match execute(&args).await {
        Ok(report) => {
            print_report(&report, args.json);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {:#}", e);
            print_report(&PipelineReport::failure(), args.json);
            ExitCode::from(1)
        }
    }
}
