use crate::config::types::{Config, CrawlerConfig, DomainEntry, FetchConfig, UserAgentConfig};
use crate::ConfigError;
use url::Url;

/// Validates the entire configuration
///
/// Start URLs are not validated here. A malformed start URL is logged and
/// skipped when seeding so one bad line does not abort the crawl.
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_crawler_config(&config.crawler)?;
    validate_fetch_config(&config.fetch)?;
    validate_user_agent_config(&config.user_agent)?;
    validate_paths(config)?;
    validate_exclusions(&config.exclude)?;
    Ok(())
}

fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.num_threads < 1 || config.num_threads > 100 {
        return Err(ConfigError::Validation(format!(
            "num_threads must be between 1 and 100, got {}",
            config.num_threads
        )));
    }

    Ok(())
}

fn validate_fetch_config(config: &FetchConfig) -> Result<(), ConfigError> {
    if config.timeout_ms == 0 {
        return Err(ConfigError::Validation(
            "timeout_ms must be > 0".to_string(),
        ));
    }

    for status in &config.retryable_statuses {
        if !(100..=599).contains(status) {
            return Err(ConfigError::Validation(format!(
                "retryable status {} is not an HTTP status code",
                status
            )));
        }
    }

    Ok(())
}

fn validate_user_agent_config(config: &UserAgentConfig) -> Result<(), ConfigError> {
    if config.crawler_name.is_empty() {
        return Err(ConfigError::Validation(
            "crawler_name cannot be empty".to_string(),
        ));
    }

    if !config
        .crawler_name
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-')
    {
        return Err(ConfigError::Validation(format!(
            "crawler_name must contain only alphanumeric characters and hyphens, got '{}'",
            config.crawler_name
        )));
    }

    Url::parse(&config.contact_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid contact_url: {}", e)))?;

    validate_email(&config.contact_email)?;

    Ok(())
}

fn validate_paths(config: &Config) -> Result<(), ConfigError> {
    if config.store.path.is_empty() {
        return Err(ConfigError::Validation(
            "store path cannot be empty".to_string(),
        ));
    }

    if config.committer.path.is_empty() {
        return Err(ConfigError::Validation(
            "committer path cannot be empty".to_string(),
        ));
    }

    Ok(())
}

fn validate_exclusions(domains: &[DomainEntry]) -> Result<(), ConfigError> {
    for entry in domains {
        validate_domain_pattern(&entry.domain)?;
    }
    Ok(())
}

/// Validates a domain pattern (supports a leading `*.` wildcard)
fn validate_domain_pattern(pattern: &str) -> Result<(), ConfigError> {
    if pattern.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain pattern cannot be empty".to_string(),
        ));
    }

    validate_domain_string(pattern.strip_prefix("*.").unwrap_or(pattern))
}

fn validate_domain_string(domain: &str) -> Result<(), ConfigError> {
    if domain.is_empty() {
        return Err(ConfigError::InvalidPattern(
            "Domain cannot be empty".to_string(),
        ));
    }

    if !domain
        .chars()
        .all(|c| c.is_alphanumeric() || c == '.' || c == '-')
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' contains invalid characters",
            domain
        )));
    }

    if domain.starts_with('.')
        || domain.ends_with('.')
        || domain.starts_with('-')
        || domain.ends_with('-')
        || domain.contains("..")
    {
        return Err(ConfigError::InvalidPattern(format!(
            "Domain '{}' is malformed",
            domain
        )));
    }

    Ok(())
}

/// Basic email validation
fn validate_email(email: &str) -> Result<(), ConfigError> {
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    };

    if local.is_empty() || domain.is_empty() || domain.contains('@') || !domain.contains('.') {
        return Err(ConfigError::Validation(format!(
            "Invalid email format: '{}'",
            email
        )));
    }

    Ok(())
}
