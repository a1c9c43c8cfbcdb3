/*
escriba - single-binary CLI
One parameterized assistant replaces the family of near-duplicate web apps:
each profile supplies a system prompt, an input source and sampling settings.
*/

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use common::{Config, InputSource, ProfileConfig};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use escriba::conversation::ChatSession;
use escriba::documents::load_document_text;
use escriba::extraction::{Extractor, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_USER_AGENT};
use escriba::llm::remote::RemoteChatClient;

/// Message sent when a one-shot review is triggered without an explicit one
const DEFAULT_REQUEST: &str = "Please apply your instructions to the provided text.";

#[derive(Parser, Debug)]
#[command(name = "escriba", about = "Selector-driven web content extraction + LLM writing assistant")]
struct Args {
    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override log level (info, debug, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List configured sections
    Sections,
    /// List configured assistant profiles
    Profiles,
    /// Run the extractor and print the text
    Extract {
        /// Absolute HTTP(S) URL to extract
        #[arg(long, conflicts_with = "section")]
        url: Option<String>,
        /// Treat --url as a listing page instead of a single article
        #[arg(long, requires = "url")]
        listing: bool,
        /// Configured section name (repeatable)
        #[arg(long = "section")]
        section: Vec<String>,
        /// Write the text to a file instead of stdout
        #[arg(long, value_name = "FILE")]
        output: Option<PathBuf>,
    },
    /// One-shot: gather a profile's input and send a single message
    Review {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long = "section")]
        section: Vec<String>,
        /// Plain-text document (converted externally)
        #[arg(long, value_name = "FILE")]
        document: Option<PathBuf>,
        /// Message to send along with the gathered text
        #[arg(long)]
        message: Option<String>,
    },
    /// Interactive chat with history (/reset clears it, /quit exits)
    Chat {
        #[arg(long)]
        profile: String,
        #[arg(long)]
        url: Option<String>,
        #[arg(long = "section")]
        section: Vec<String>,
        #[arg(long, value_name = "FILE")]
        document: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_new(&args.log_level).unwrap_or_else(|_| EnvFilter::new("info"));
    fmt().with_env_filter(filter).init();

    // Resolve config paths: packaged defaults, overridden by config.toml or --config
    let default_path = PathBuf::from("config.default.toml");
    let override_path = if let Some(p) = args.config {
        if !p.exists() {
            error!(path = ?p, "specified config file not found");
            anyhow::bail!("Config file not found: {}", p.display());
        }
        Some(p)
    } else {
        let p = PathBuf::from("config.toml");
        if p.exists() {
            Some(p)
        } else {
            None
        }
    };

    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    info!(default = ?default_path, override = ?override_path, "configuration loaded");

    match args.command {
        Command::Sections => {
            for (name, url) in &config.sections {
                println!("{}\t{}", name, url);
            }
            Ok(())
        }
        Command::Profiles => {
            for profile in &config.profiles {
                println!(
                    "{}\tsource={:?}\ttemperature={}",
                    profile.name, profile.source, profile.temperature
                );
            }
            Ok(())
        }
        Command::Extract {
            url,
            listing,
            section,
            output,
        } => {
            let extractor = build_extractor(&config)?;
            let doc = match (url, section.as_slice()) {
                (Some(url), []) => {
                    if listing {
                        extractor.extract_listing(&url).await?
                    } else {
                        extractor.extract_page(&url).await?
                    }
                }
                (None, sections) if !sections.is_empty() => {
                    extractor.extract_sections(sections).await?
                }
                _ => anyhow::bail!("pass either --url or at least one --section"),
            };

            info!(visited = ?doc.visited_urls, chars = doc.text.len(), "extraction complete");
            match output {
                Some(path) => {
                    let mut f = tokio::fs::File::create(&path)
                        .await
                        .with_context(|| format!("failed to create {}", path.display()))?;
                    f.write_all(doc.text.as_bytes()).await?;
                    println!("wrote {} chars to {}", doc.text.len(), path.display());
                }
                None => println!("{}", doc.text),
            }
            Ok(())
        }
        Command::Review {
            profile,
            url,
            section,
            document,
            message,
        } => {
            let profile = find_profile(&config, &profile)?;
            let provider = build_client(&config, profile)?;
            let mut session = ChatSession::for_profile(profile);

            if let Some(text) = gather_context(&config, profile, url, &section, document).await? {
                session.attach_context(text);
            }

            let message = message.unwrap_or_else(|| DEFAULT_REQUEST.to_string());
            let reply = session.send(&provider, &message).await?;
            println!("{}", reply);
            Ok(())
        }
        Command::Chat {
            profile,
            url,
            section,
            document,
        } => {
            let profile = find_profile(&config, &profile)?;
            let provider = build_client(&config, profile)?;
            let mut session = ChatSession::for_profile(profile);

            if let Some(text) = gather_context(&config, profile, url, &section, document).await? {
                println!("[attached {} chars of input text]", text.len());
                session.attach_context(text);
            }

            println!(
                "Chatting with profile '{}'. /reset clears history, /quit exits.",
                profile.name
            );

            let stdin = BufReader::new(tokio::io::stdin());
            let mut lines = stdin.lines();
            loop {
                print!("> ");
                use std::io::Write as _;
                std::io::stdout().flush().ok();

                let Some(line) = lines.next_line().await? else {
                    break;
                };
                let line = line.trim().to_string();

                match line.as_str() {
                    "" => continue,
                    "/quit" => break,
                    "/reset" => {
                        session.reset();
                        println!("[history cleared]");
                        continue;
                    }
                    _ => {}
                }

                match session.send(&provider, &line).await {
                    Ok(reply) => println!("\n{}\n", reply),
                    // Recoverable: report and let the user re-trigger
                    Err(e) => eprintln!("error: {}", e),
                }
            }

            info!(turns = session.history().len(), "chat session ended");
            Ok(())
        }
    }
}

fn build_extractor(config: &Config) -> Result<Extractor> {
    let selectors = config
        .selectors
        .clone()
        .context("no [selectors] configured; set selectors.article_list and selectors.article_body")?;

    let timeout = config
        .fetch
        .as_ref()
        .and_then(|f| f.timeout_seconds)
        .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS);
    let user_agent = config
        .fetch
        .as_ref()
        .and_then(|f| f.user_agent.clone())
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Extractor::new(selectors, config.sections.clone(), timeout, &user_agent)
}

fn find_profile<'a>(config: &'a Config, name: &str) -> Result<&'a ProfileConfig> {
    config
        .profiles
        .iter()
        .find(|p| p.name == name)
        .with_context(|| format!("unknown profile '{}'; run `escriba profiles` to list them", name))
}

/// Build the remote chat client. A missing API key is a fatal configuration
/// error, surfaced before any interaction starts.
fn build_client(config: &Config, profile: &ProfileConfig) -> Result<RemoteChatClient> {
    let llm = config.llm.as_ref().context("no [llm] section configured")?;

    let api_url = llm.api_url.as_deref().context("missing llm.api_url")?;
    let api_key_env = llm.api_key_env.as_deref().context("missing llm.api_key_env")?;
    let api_key = std::env::var(api_key_env)
        .with_context(|| format!("LLM API key env var '{}' not set", api_key_env))?;

    let model = profile
        .model
        .clone()
        .or_else(|| llm.model.clone())
        .unwrap_or_else(|| "gpt-4o-mini".to_string());
    let timeout_secs = llm.timeout_seconds.unwrap_or(60);

    Ok(RemoteChatClient::new(api_url, api_key, model).with_timeout(timeout_secs))
}

/// Gather the profile's input text from the CLI arguments matching its
/// declared source.
async fn gather_context(
    config: &Config,
    profile: &ProfileConfig,
    url: Option<String>,
    sections: &[String],
    document: Option<PathBuf>,
) -> Result<Option<String>> {
    match profile.source {
        InputSource::Url => {
            let url = url.with_context(|| {
                format!("profile '{}' takes a page URL; pass --url", profile.name)
            })?;
            let extractor = build_extractor(config)?;
            let doc = extractor.extract_page(&url).await?;
            info!(visited = ?doc.visited_urls, "extracted page for profile input");
            Ok(Some(doc.text))
        }
        InputSource::Section => {
            if sections.is_empty() {
                anyhow::bail!(
                    "profile '{}' reads configured sections; pass at least one --section",
                    profile.name
                );
            }
            let extractor = build_extractor(config)?;
            let doc = extractor.extract_sections(sections).await?;
            info!(visited = ?doc.visited_urls, "extracted sections for profile input");
            Ok(Some(doc.text))
        }
        InputSource::Document => {
            let path = document.with_context(|| {
                format!("profile '{}' reads a document; pass --document", profile.name)
            })?;
            Ok(Some(load_document_text(&path).await?))
        }
        InputSource::None => Ok(None),
    }
}
