// Operator diagnostic: fetch a listing page, report how many elements each
// configured selector matches, and optionally dump the raw HTML for
// debugging selector drift after a site redesign.

use anyhow::{Context, Result};
use clap::Parser;
use scraper::{Html, Selector};
use std::path::PathBuf;

use common::Config;
use escriba::extraction::{Extractor, DEFAULT_FETCH_TIMEOUT_SECS, DEFAULT_USER_AGENT};

#[derive(Parser, Debug)]
#[command(name = "check_selectors", about = "Report selector match counts for a page")]
struct Args {
    /// Page to fetch (listing or article)
    #[arg(long)]
    url: String,

    /// Path to config.toml
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write the raw fetched HTML to this file
    #[arg(long, value_name = "FILE")]
    dump: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();

    let default_path = PathBuf::from("config.default.toml");
    let override_path = args
        .config
        .or_else(|| {
            let p = PathBuf::from("config.toml");
            p.exists().then_some(p)
        });
    let config = Config::load_with_defaults(
        if default_path.exists() { Some(&default_path) } else { None },
        override_path.as_deref(),
    )
    .await
    .context("failed to load configuration")?;

    let selectors = config
        .selectors
        .clone()
        .context("no [selectors] configured")?;

    let extractor = Extractor::new(
        selectors.clone(),
        config.sections.clone(),
        config
            .fetch
            .as_ref()
            .and_then(|f| f.timeout_seconds)
            .unwrap_or(DEFAULT_FETCH_TIMEOUT_SECS),
        config
            .fetch
            .as_ref()
            .and_then(|f| f.user_agent.as_deref())
            .unwrap_or(DEFAULT_USER_AGENT),
    )?;

    println!("Fetching {} ...", args.url);
    let html = extractor.fetch_raw(&args.url).await?;
    println!("Fetched {} bytes", html.len());

    let document = Html::parse_document(&html);
    for (role, spec) in [
        ("article_list", &selectors.article_list),
        ("article_body", &selectors.article_body),
    ] {
        let css = format!("{}[class~=\"{}\"]", spec.tag, spec.class);
        match Selector::parse(&css) {
            Ok(selector) => {
                let count = document.select(&selector).count();
                println!("{:>12}  {}  ->  {} match(es)", role, css, count);
            }
            Err(_) => println!("{:>12}  {}  ->  invalid selector", role, css),
        };
    }

    if let Some(path) = args.dump {
        tokio::fs::write(&path, &html)
            .await
            .with_context(|| format!("failed to write dump to {}", path.display()))?;
        println!("Raw HTML dumped to {}", path.display());
    }

    Ok(())
}
