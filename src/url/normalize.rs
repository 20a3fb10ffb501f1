use crate::config::NormalizerConfig;
use crate::UrlError;
use url::Url;

/// Tracking query parameters removed during normalization
const TRACKING_PARAMS: &[&str] = &[
    "utm_source",
    "utm_medium",
    "utm_campaign",
    "utm_term",
    "utm_content",
    "fbclid",
    "gclid",
    "mc_eid",
];

/// Rewrites references into the canonical form used as store keys
///
/// # Normalization Steps
///
/// 1. Parse the URL; reject if malformed or not HTTP(S)
/// 2. Lowercase the scheme and host; drop the default port
/// 3. Optionally remove the `www.` prefix from the host
/// 4. Normalize the path:
///    - Remove dot segments (`.` and `..`) and empty segments
///    - Optionally remove the trailing slash (never for the root `/`)
///    - Empty path becomes `/`
/// 5. Remove the fragment
/// 6. Optionally remove tracking query parameters and sort the rest
/// 7. Remove an empty query string
#[derive(Debug, Clone, Default)]
pub struct UrlNormalizer {
    config: NormalizerConfig,
}

impl UrlNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    /// Normalizes a URL string
    ///
    /// # Arguments
    ///
    /// * `url_str` - The URL string to normalize
    ///
    /// # Returns
    ///
    /// * `Ok(Url)` - Normalized URL
    /// * `Err(UrlError)` - Failed to parse or normalize the URL
    ///
    /// # Examples
    ///
    /// ```
    /// use ripple_collector::url::UrlNormalizer;
    ///
    /// let normalizer = UrlNormalizer::default();
    /// let url = normalizer.normalize("HTTP://Example.COM:80/a/./b#top").unwrap();
    /// assert_eq!(url.as_str(), "http://example.com/a/b");
    /// ```
    pub fn normalize(&self, url_str: &str) -> Result<Url, UrlError> {
        // The url crate already lowercases scheme and host, drops default
        // ports and resolves dot segments on parse.
        let mut url = Url::parse(url_str.trim()).map_err(|e| UrlError::Parse(e.to_string()))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(UrlError::InvalidScheme(format!(
                "Only HTTP and HTTPS schemes are supported, got: {}",
                url.scheme()
            )));
        }

        let host = url.host_str().ok_or(UrlError::MissingDomain)?.to_lowercase();
        if self.config.remove_www {
            if let Some(stripped) = host.strip_prefix("www.") {
                if !stripped.is_empty() {
                    url.set_host(Some(stripped))
                        .map_err(|e| UrlError::Parse(format!("Failed to set host: {}", e)))?;
                }
            }
        }

        let normalized_path = normalize_path(url.path(), self.config.remove_trailing_slash);
        url.set_path(&normalized_path);

        url.set_fragment(None);

        if url.query().is_some() {
            let params = self.filter_query_params(&url);
            if params.is_empty() {
                url.set_query(None);
            } else {
                url.query_pairs_mut().clear().extend_pairs(params);
            }
        }

        Ok(url)
    }

    /// Normalizes a URL string and returns it as a string
    pub fn normalize_str(&self, url_str: &str) -> Result<String, UrlError> {
        self.normalize(url_str).map(String::from)
    }

    fn filter_query_params(&self, url: &Url) -> Vec<(String, String)> {
        let mut params: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(key, _)| !(self.config.remove_tracking_params && is_tracking_param(key)))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        if self.config.sort_query_params {
            params.sort();
        }

        params
    }
}

/// Normalizes a URL path by removing dot and empty segments
fn normalize_path(path: &str, remove_trailing_slash: bool) -> String {
    let mut segments: Vec<&str> = Vec::new();

    for segment in path.split('/') {
        match segment {
            "" | "." => continue,
            ".." => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    if segments.is_empty() {
        return "/".to_string();
    }

    let mut result = format!("/{}", segments.join("/"));
    if path.ends_with('/') && !remove_trailing_slash {
        result.push('/');
    }
    result
}

fn is_tracking_param(key: &str) -> bool {
    TRACKING_PARAMS.contains(&key) || key.starts_with("utm_")
}
