use anyhow::Context;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use common::{SelectorSpec, SelectorTable};

/// Hard cap on article links followed per listing page
pub const ARTICLE_LIMIT: usize = 5;

/// Default timeout for listing/article fetches, in seconds
pub const DEFAULT_FETCH_TIMEOUT_SECS: u64 = 10;

/// Conventional browser User-Agent. Omitting it gets requests rejected by
/// bot detection on several of the targeted sites.
pub const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0 Safari/537.36";

/// Errors surfaced by the extractor. All are recoverable by the caller;
/// none is retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum ExtractionError {
    #[error("unknown section '{0}'")]
    UnknownSection(String),
    #[error("unsupported URL scheme '{scheme}' for {url} (http/https only)")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("invalid URL '{url}': {source}")]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },
    #[error("selector '{selector}' is not valid CSS")]
    InvalidSelector { selector: String },
    #[error("fetch of {url} failed with status {status}")]
    FetchFailed { url: String, status: u16 },
    #[error("fetch of {url} failed: {source}")]
    FetchError {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("no elements matched selector '{selector}' on {url}")]
    SelectorMismatch { url: String, selector: String },
    #[error("extraction produced no text")]
    NoContent,
}

/// Plain text produced by an extraction, plus the article URLs visited
#[derive(Debug, Clone)]
pub struct ExtractedDocument {
    pub text: String,
    pub visited_urls: Vec<String>,
}

/// Selector-driven content extractor.
///
/// Configured once from the selector table and the section->URL mapping;
/// every operation is a stateless fetch-parse-concatenate pass with no
/// persistence.
pub struct Extractor {
    client: reqwest::Client,
    selectors: SelectorTable,
    sections: BTreeMap<String, String>,
}

impl Extractor {
    pub fn new(
        selectors: SelectorTable,
        sections: BTreeMap<String, String>,
        timeout_secs: u64,
        user_agent: &str,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .user_agent(user_agent)
            .build()
            .context("failed to build reqwest client")?;

        Ok(Self {
            client,
            selectors,
            sections,
        })
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    /// Extract a single page directly: article-body selector if it matches,
    /// otherwise every paragraph on the page. Used for user-supplied URLs.
    pub async fn extract_page(&self, url: &str) -> Result<ExtractedDocument, ExtractionError> {
        let target = parse_target(url)?;
        let body_selector = compile(&self.selectors.article_body)?;
        let html = self.fetch_html(&target).await?;

        // Direct pages always fall back to whole-page paragraphs; the
        // configured body selector is only an optional refinement here.
        let text = article_text(&html, &body_selector, true).ok_or(ExtractionError::NoContent)?;

        Ok(ExtractedDocument {
            text,
            visited_urls: vec![target.to_string()],
        })
    }

    /// Treat `url` as a listing page: locate article links with the
    /// article-list selector, follow at most [`ARTICLE_LIMIT`] of them and
    /// aggregate their body paragraphs in link order.
    pub async fn extract_listing(&self, url: &str) -> Result<ExtractedDocument, ExtractionError> {
        let base = parse_target(url)?;
        let doc = self.extract_listing_inner(&base).await?;
        if doc.text.trim().is_empty() {
            return Err(ExtractionError::NoContent);
        }
        Ok(doc)
    }

    /// Resolve a section key through the configured mapping and extract its
    /// listing page.
    pub async fn extract_section(&self, name: &str) -> Result<ExtractedDocument, ExtractionError> {
        let url = self
            .sections
            .get(name)
            .ok_or_else(|| ExtractionError::UnknownSection(name.to_string()))?;
        self.extract_listing(url).await
    }

    /// Aggregate several sections into one document, separated by a header
    /// line per section. A failing section is skipped and the rest proceed;
    /// the call only fails when every section failed or nothing was
    /// extracted.
    pub async fn extract_sections(
        &self,
        names: &[String],
    ) -> Result<ExtractedDocument, ExtractionError> {
        if names.len() == 1 {
            return self.extract_section(&names[0]).await;
        }

        let mut pieces = Vec::new();
        let mut visited = Vec::new();
        let mut first_error = None;

        for name in names {
            match self.extract_section(name).await {
                Ok(doc) => {
                    pieces.push(format!("===== {} =====\n{}", name, doc.text));
                    visited.extend(doc.visited_urls);
                }
                Err(e) => {
                    warn!(section = %name, error = %e, "skipping failed section");
                    first_error.get_or_insert(e);
                }
            }
        }

        if pieces.is_empty() {
            return Err(first_error.unwrap_or(ExtractionError::NoContent));
        }

        Ok(ExtractedDocument {
            text: pieces.join("\n"),
            visited_urls: visited,
        })
    }

    /// Fetch a page without extraction, for operator selector debugging.
    pub async fn fetch_raw(&self, url: &str) -> Result<String, ExtractionError> {
        let target = parse_target(url)?;
        self.fetch_html(&target).await
    }

    async fn extract_listing_inner(
        &self,
        base: &Url,
    ) -> Result<ExtractedDocument, ExtractionError> {
        let list_selector = compile(&self.selectors.article_list)?;
        let body_selector = compile(&self.selectors.article_body)?;

        let listing_html = self.fetch_html(base).await?;
        let links = collect_article_links(
            &listing_html,
            base,
            &list_selector,
            &selector_css(&self.selectors.article_list),
        )?;
        info!(count = links.len(), listing = %base, "resolved article links");

        let mut visited = Vec::new();
        let mut pieces = Vec::new();

        // Sequential on purpose: one article at a time, a broken link is
        // skipped without aborting the batch.
        for link in links {
            visited.push(link.to_string());
            match self.fetch_html(&link).await {
                Ok(html) => {
                    match article_text(&html, &body_selector, self.selectors.fallback_whole_page) {
                        Some(text) => pieces.push(text),
                        None => {
                            warn!(url = %link, "article body selector matched nothing, skipping")
                        }
                    }
                }
                Err(e) => warn!(url = %link, error = %e, "skipping article after fetch failure"),
            }
        }

        Ok(ExtractedDocument {
            text: pieces.join("\n"),
            visited_urls: visited,
        })
    }

    async fn fetch_html(&self, url: &Url) -> Result<String, ExtractionError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|source| ExtractionError::FetchError {
                url: url.to_string(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ExtractionError::FetchFailed {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response
            .text()
            .await
            .map_err(|source| ExtractionError::FetchError {
                url: url.to_string(),
                source,
            })
    }
}

/// Parse an absolute HTTP(S) URL, rejecting every other scheme.
fn parse_target(url: &str) -> Result<Url, ExtractionError> {
    let parsed = Url::parse(url).map_err(|source| ExtractionError::InvalidUrl {
        url: url.to_string(),
        source,
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        other => Err(ExtractionError::UnsupportedScheme {
            url: url.to_string(),
            scheme: other.to_string(),
        }),
    }
}

/// CSS form of a (tag, class) pair. `[class~=...]` matches the class token
/// anywhere in the attribute, like a class lookup on an HTML parser.
fn selector_css(spec: &SelectorSpec) -> String {
    format!("{}[class~=\"{}\"]", spec.tag.trim(), spec.class.trim())
}

fn compile(spec: &SelectorSpec) -> Result<Selector, ExtractionError> {
    let css = selector_css(spec);
    Selector::parse(&css)
        .ok()
        .ok_or(ExtractionError::InvalidSelector { selector: css })
}

/// Locate article links on a listing page: take at most [`ARTICLE_LIMIT`]
/// elements matching the list selector, pull each one's anchor href and
/// resolve it against the page base URL.
fn collect_article_links(
    html: &str,
    base: &Url,
    list_selector: &Selector,
    css: &str,
) -> Result<Vec<Url>, ExtractionError> {
    let document = Html::parse_document(html);
    let anchor = Selector::parse("a[href]").unwrap();

    let mut matched = false;
    let mut links = Vec::new();
    for element in document.select(list_selector).take(ARTICLE_LIMIT) {
        matched = true;
        let href = if element.value().name() == "a" {
            element.value().attr("href").map(str::to_string)
        } else {
            element
                .select(&anchor)
                .next()
                .and_then(|a| a.value().attr("href"))
                .map(str::to_string)
        };
        let Some(href) = href else {
            warn!(selector = %css, "listing element carries no link, skipping");
            continue;
        };
        match base.join(&href) {
            Ok(resolved) => links.push(resolved),
            Err(e) => warn!(href = %href, error = %e, "failed to resolve article link"),
        }
    }

    if !matched {
        return Err(ExtractionError::SelectorMismatch {
            url: base.to_string(),
            selector: css.to_string(),
        });
    }

    Ok(links)
}

/// Extract paragraph text from the configured article body. When the body
/// selector matches nothing, either fall back to every paragraph on the page
/// or yield nothing, depending on `fallback_whole_page`.
fn article_text(html: &str, body_selector: &Selector, fallback_whole_page: bool) -> Option<String> {
    let document = Html::parse_document(html);
    let paragraph = Selector::parse("p").unwrap();

    let mut lines = Vec::new();
    let mut matched = false;
    for body in document.select(body_selector) {
        matched = true;
        for p in body.select(&paragraph) {
            push_paragraph(&mut lines, p);
        }
    }

    if !matched {
        if !fallback_whole_page {
            return None;
        }
        for p in document.select(&paragraph) {
            push_paragraph(&mut lines, p);
        }
    }

    if lines.is_empty() {
        None
    } else {
        Some(lines.join("\n"))
    }
}

fn push_paragraph(lines: &mut Vec<String>, element: ElementRef<'_>) {
    let text = normalize_whitespace(&element.text().collect::<Vec<_>>().join(" "));
    if !text.is_empty() {
        lines.push(text);
    }
}

fn normalize_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(tag: &str, class: &str) -> SelectorSpec {
        SelectorSpec {
            tag: tag.into(),
            class: class.into(),
        }
    }

    const LISTING: &str = r#"
        <html><body>
            <div class="headline promoted"><a href="/nacional/articulo-1">Uno</a></div>
            <div class="headline"><a href="articulo-2">Dos</a></div>
            <a class="headline" href="https://other.example.org/articulo-3">Tres</a>
            <div class="sidebar"><a href="/ignored">Nope</a></div>
        </body></html>
    "#;

    #[test]
    fn listing_links_resolve_relative_hrefs() {
        let base = Url::parse("https://example.com/nacional/").unwrap();
        let selector = compile(&spec("*", "headline")).unwrap();

        let links = collect_article_links(LISTING, &base, &selector, "*.headline").unwrap();

        assert_eq!(
            links.iter().map(Url::as_str).collect::<Vec<_>>(),
            vec![
                "https://example.com/nacional/articulo-1",
                "https://example.com/nacional/articulo-2",
                "https://other.example.org/articulo-3",
            ]
        );
    }

    #[test]
    fn listing_links_capped_at_limit() {
        let base = Url::parse("https://example.com/").unwrap();
        let mut html = String::from("<html><body>");
        for i in 0..8 {
            html.push_str(&format!(
                "<div class=\"headline\"><a href=\"/a/{}\">x</a></div>",
                i
            ));
        }
        html.push_str("</body></html>");
        let selector = compile(&spec("div", "headline")).unwrap();

        let links = collect_article_links(&html, &base, &selector, "div.headline").unwrap();

        assert_eq!(links.len(), ARTICLE_LIMIT);
        assert_eq!(links[4].as_str(), "https://example.com/a/4");
    }

    #[test]
    fn listing_selector_mismatch_is_an_error() {
        let base = Url::parse("https://example.com/").unwrap();
        let selector = compile(&spec("div", "does-not-exist")).unwrap();

        let result = collect_article_links(LISTING, &base, &selector, "div.does-not-exist");

        assert!(matches!(
            result,
            Err(ExtractionError::SelectorMismatch { .. })
        ));
    }

    #[test]
    fn article_text_joins_body_paragraphs() {
        let html = r#"
            <html><body>
                <p>Chrome junk</p>
                <div class="article-body">
                    <p>First   paragraph.</p>
                    <p>Second <b>bold</b> paragraph.</p>
                    <p>   </p>
                </div>
            </body></html>
        "#;
        let selector = compile(&spec("div", "article-body")).unwrap();

        let text = article_text(html, &selector, false).unwrap();

        assert_eq!(text, "First paragraph.\nSecond bold paragraph.");
    }

    #[test]
    fn article_text_without_fallback_yields_nothing_on_miss() {
        let html = "<html><body><p>Only chrome text</p></body></html>";
        let selector = compile(&spec("div", "article-body")).unwrap();

        assert!(article_text(html, &selector, false).is_none());
        assert_eq!(
            article_text(html, &selector, true).as_deref(),
            Some("Only chrome text")
        );
    }

    #[test]
    fn parse_target_rejects_other_schemes() {
        assert!(parse_target("https://example.com/").is_ok());
        assert!(matches!(
            parse_target("ftp://example.com/"),
            Err(ExtractionError::UnsupportedScheme { .. })
        ));
        assert!(matches!(
            parse_target("not a url"),
            Err(ExtractionError::InvalidUrl { .. })
        ));
    }
}
