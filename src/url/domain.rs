use url::Url;

/// Extracts the lowercase host from a URL
///
/// # Examples
///
/// ```
/// use url::Url;
/// use ripple_collector::url::extract_domain;
///
/// let url = Url::parse("https://EXAMPLE.COM/path").unwrap();
/// assert_eq!(extract_domain(&url), Some("example.com".to_string()));
/// ```
pub fn extract_domain(url: &Url) -> Option<String> {
    url.host_str().map(|h| h.to_lowercase())
}

/// Returns the root of a URL: scheme, host and non-default port
///
/// Sitemaps and robots.txt are resolved once per root.
///
/// # Examples
///
/// ```
/// use ripple_collector::url::url_root;
///
/// assert_eq!(url_root("https://example.com/a/b?c=d").as_deref(), Some("https://example.com"));
/// assert_eq!(url_root("http://example.com:8080/").as_deref(), Some("http://example.com:8080"));
/// assert_eq!(url_root("not a url"), None);
/// ```
pub fn url_root(url_str: &str) -> Option<String> {
    let url = Url::parse(url_str).ok()?;
    root_of(&url)
}

/// Same as [`url_root`] for an already parsed URL
pub fn root_of(url: &Url) -> Option<String> {
    let host = extract_domain(url)?;
    Some(match url.port() {
        Some(port) => format!("{}://{}:{}", url.scheme(), host, port),
        None => format!("{}://{}", url.scheme(), host),
    })
}
