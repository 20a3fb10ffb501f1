//! Document import: turning fetched bytes into text, metadata and links
//!
//! The default importer parses HTML with scraper. It extracts:
//! - Outbound links with their tag, text and title
//! - The page title and description
//! - Robots meta directives and the canonical link

use crate::state::CrawlReference;
use crate::url::UrlNormalizer;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use url::Url;

/// Multi-valued document metadata
pub type Metadata = BTreeMap<String, Vec<String>>;

/// Everything an importer gets about a fetched document
#[derive(Debug, Clone, Copy)]
pub struct ImportRequest<'a> {
    pub reference: &'a CrawlReference,
    pub content: &'a [u8],
    pub content_type: Option<&'a str>,
    pub metadata: &'a Metadata,
    /// True when the document is processed as an orphan of a previous run
    pub orphan: bool,
}

/// What the importer decided about a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportDisposition {
    /// Keep the document: follow its links and commit it
    Accept,
    /// Drop the document on purpose
    Reject(String),
    /// The document could not be imported
    Error(String),
}

/// A link found in a document
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedLink {
    /// Absolute URL
    pub url: String,
    /// Where the link was found (e.g., "a.href")
    pub tag: Option<String>,
    pub text: Option<String>,
    pub title: Option<String>,
}

/// Result of importing a document
#[derive(Debug, Clone)]
pub struct ImportResponse {
    pub disposition: ImportDisposition,
    pub content: String,
    pub metadata: Metadata,
    pub links: Vec<ExtractedLink>,
    /// Canonical URL declared by the document when it differs from the reference
    pub canonical: Option<String>,
}

impl ImportResponse {
    pub fn accept(content: String, metadata: Metadata, links: Vec<ExtractedLink>) -> Self {
        Self {
            disposition: ImportDisposition::Accept,
            content,
            metadata,
            links,
            canonical: None,
        }
    }

    pub fn reject(reason: impl Into<String>, metadata: Metadata) -> Self {
        Self {
            disposition: ImportDisposition::Reject(reason.into()),
            content: String::new(),
            metadata,
            links: Vec::new(),
            canonical: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            disposition: ImportDisposition::Error(message.into()),
            content: String::new(),
            metadata: Metadata::new(),
            links: Vec::new(),
            canonical: None,
        }
    }
}

/// Imports fetched documents
///
/// Importers are synchronous and must not block on I/O.
pub trait Importer: Send + Sync {
    fn import(&self, request: &ImportRequest<'_>) -> ImportResponse;
}

/// HTML importer built on scraper
///
/// # Link Extraction Rules
///
/// **Include:**
/// - `<a href="...">` tags, with their text and title
///
/// **Exclude:**
/// - `<a href="..." download>`
/// - `javascript:`, `mailto:`, `tel:` and `data:` links
/// - Fragment-only links
///
/// `rel="nofollow"` on a single link is not honoured; the robots meta
/// `nofollow` directive drops every link of the page.
#[derive(Debug, Clone, Default)]
pub struct HtmlImporter {
    ignore_robots_meta: bool,
    ignore_canonical: bool,
    /// Normalizes canonical links before comparing them with the reference
    normalizer: UrlNormalizer,
}

impl HtmlImporter {
    pub fn new(ignore_robots_meta: bool, ignore_canonical: bool) -> Self {
        Self {
            ignore_robots_meta,
            ignore_canonical,
            normalizer: UrlNormalizer::default(),
        }
    }

    /// Uses the crawl's normalizer, so a canonical link naming the page in
    /// another spelling is recognized as the page itself
    pub fn with_normalizer(mut self, normalizer: UrlNormalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Returns the canonical URL when it names another document
    fn foreign_canonical(&self, canonical: String, reference: &str) -> Option<String> {
        let canonical = self.normalizer.normalize_str(&canonical).unwrap_or(canonical);
        (canonical != reference).then_some(canonical)
    }
}

impl Importer for HtmlImporter {
    fn import(&self, request: &ImportRequest<'_>) -> ImportResponse {
        let mut metadata = request.metadata.clone();
        if let Some(content_type) = request.content_type {
            metadata.insert("content-type".to_string(), vec![content_type.to_string()]);
        }

        let is_html = request
            .content_type
            .map(|ct| ct.to_ascii_lowercase().contains("html"))
            .unwrap_or(true);
        if !is_html {
            let is_text = request
                .content_type
                .is_some_and(|ct| ct.trim_start().starts_with("text/"));
            let content = if is_text {
                String::from_utf8_lossy(request.content).into_owned()
            } else {
                String::new()
            };
            return ImportResponse::accept(content, metadata, Vec::new());
        }

        let base_url = match Url::parse(&request.reference.reference) {
            Ok(url) => url,
            Err(e) => return ImportResponse::error(format!("Invalid reference: {}", e)),
        };

        let html = String::from_utf8_lossy(request.content);
        let document = Html::parse_document(&html);

        let robots = if self.ignore_robots_meta {
            RobotsMeta::default()
        } else {
            RobotsMeta::from_document(&document)
        };

        if let Some(title) = extract_title(&document) {
            metadata.insert("title".to_string(), vec![title]);
        }
        if let Some(description) = meta_content(&document, "description") {
            metadata.insert("description".to_string(), vec![description]);
        }

        if !self.ignore_canonical {
            if let Some(canonical) = extract_canonical(&document, &base_url)
                .and_then(|c| self.foreign_canonical(c, &request.reference.reference))
            {
                let mut response = ImportResponse::reject(
                    format!("Non-canonical, canonical is {}", canonical),
                    metadata,
                );
                response.canonical = Some(canonical);
                return response;
            }
        }

        if robots.noindex {
            return ImportResponse::reject("Robots meta noindex", metadata);
        }

        let links = if robots.nofollow {
            Vec::new()
        } else {
            extract_links(&document, &base_url)
        };

        ImportResponse::accept(extract_text(&document), metadata, links)
    }
}

/// Robots meta directives of a page
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct RobotsMeta {
    noindex: bool,
    nofollow: bool,
}

impl RobotsMeta {
    fn from_document(document: &Html) -> Self {
        let mut robots = Self::default();
        let Some(content) = meta_content(document, "robots") else {
            return robots;
        };
        for directive in content.split(',').map(|d| d.trim().to_ascii_lowercase()) {
            match directive.as_str() {
                "noindex" => robots.noindex = true,
                "nofollow" => robots.nofollow = true,
                "none" => {
                    robots.noindex = true;
                    robots.nofollow = true;
                }
                _ => {}
            }
        }
        robots
    }
}

fn selector(css: &str) -> Option<Selector> {
    Selector::parse(css).ok()
}

fn extract_title(document: &Html) -> Option<String> {
    let title_selector = selector("title")?;
    document
        .select(&title_selector)
        .next()
        .map(|element| collapse_whitespace(&element.text().collect::<String>()))
        .filter(|s| !s.is_empty())
}

/// Returns the content of `<meta name="...">`, matching the name case-insensitively
fn meta_content(document: &Html, name: &str) -> Option<String> {
    let meta_selector = selector("meta[name][content]")?;
    document
        .select(&meta_selector)
        .find(|e| {
            e.value()
                .attr("name")
                .is_some_and(|n| n.eq_ignore_ascii_case(name))
        })
        .and_then(|e| e.value().attr("content"))
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
}

fn extract_canonical(document: &Html, base_url: &Url) -> Option<String> {
    let canonical_selector = selector("link[rel='canonical'][href]")?;
    document
        .select(&canonical_selector)
        .next()
        .and_then(|e| e.value().attr("href"))
        .and_then(|href| resolve_link(href, base_url))
}

fn extract_links(document: &Html, base_url: &Url) -> Vec<ExtractedLink> {
    let Some(a_selector) = selector("a[href]") else {
        return Vec::new();
    };

    document
        .select(&a_selector)
        .filter(|element| element.value().attr("download").is_none())
        .filter_map(|element| {
            let url = resolve_link(element.value().attr("href")?, base_url)?;
            Some(ExtractedLink {
                url,
                tag: Some("a.href".to_string()),
                text: Some(link_text(&element)).filter(|t| !t.is_empty()),
                title: element
                    .value()
                    .attr("title")
                    .map(|t| t.trim().to_string())
                    .filter(|t| !t.is_empty()),
            })
        })
        .collect()
}

fn link_text(element: &ElementRef<'_>) -> String {
    collapse_whitespace(&element.text().collect::<String>())
}

fn extract_text(document: &Html) -> String {
    let Some(body_selector) = selector("body") else {
        return String::new();
    };
    document
        .select(&body_selector)
        .next()
        .map(|body| collapse_whitespace(&body.text().collect::<Vec<_>>().join(" ")))
        .unwrap_or_default()
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Resolves a link href to an absolute URL
///
/// Returns None for special schemes, fragment-only links and anything that
/// is not HTTP(S) once resolved.
fn resolve_link(href: &str, base_url: &Url) -> Option<String> {
    let href = href.trim();

    if href.is_empty() || href.starts_with('#') {
        return None;
    }

    let lower = href.to_ascii_lowercase();
    if lower.starts_with("javascript:")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
    {
        return None;
    }

    match base_url.join(href) {
        Ok(mut absolute_url)
            if absolute_url.scheme() == "http" || absolute_url.scheme() == "https" =>
        {
            absolute_url.set_fragment(None);
            Some(absolute_url.to_string())
        }
        _ => None,
    }
}
