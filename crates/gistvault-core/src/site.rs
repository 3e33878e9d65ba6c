//! Site URLs as password tags.
//!
//! A site password is stored under tags taken from the normalized URL, with
//! the hostname first so every login for a host shares one shard. Lookups
//! repeat the username three times so an exact account match outranks a
//! path or query match.

use url::Url;

use crate::error::VaultError;

/// Query parameters dropped during normalization (tracking noise).
const TRACKING_PARAM_PREFIX: &str = "utm_";

/// URL components used as tags, in the shape browsers expose them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiteTags {
    /// Host without port, e.g. `example.com`.
    pub hostname: String,
    /// Path, `/` for the root.
    pub pathname: String,
    /// Scheme with trailing colon, e.g. `https:`.
    pub protocol: String,
    /// Explicit non-default port, empty otherwise.
    pub port: String,
    /// Query with leading `?`, empty when there is none.
    pub search: String,
    /// The whole normalized URL.
    pub href: String,
}

impl SiteTags {
    /// Normalize `url` and split it into tags.
    ///
    /// # Errors
    ///
    /// Returns [`VaultError::InvalidUrl`] if `url` cannot be parsed or has
    /// no host.
    pub fn parse(url: &str) -> Result<Self, VaultError> {
        let normalized = normalize_url(url)?;
        Ok(Self {
            hostname: normalized.host_str().unwrap_or_default().to_owned(),
            pathname: normalized.path().to_owned(),
            protocol: format!("{}:", normalized.scheme()),
            port: normalized.port().map(|p| p.to_string()).unwrap_or_default(),
            search: normalized
                .query()
                .map(|q| format!("?{q}"))
                .unwrap_or_default(),
            href: normalized.into(),
        })
    }

    /// Tags a password is stored under.
    #[must_use]
    pub fn set_tags(&self, username: &str) -> Vec<String> {
        vec![
            self.hostname.clone(),
            username.to_owned(),
            self.pathname.clone(),
            self.protocol.clone(),
            self.port.clone(),
            self.search.clone(),
            self.href.clone(),
        ]
    }

    /// Tags a password lookup ranks by.
    #[must_use]
    pub fn query_tags(&self, username: &str) -> Vec<String> {
        vec![
            self.hostname.clone(),
            username.to_owned(),
            username.to_owned(),
            username.to_owned(),
            self.pathname.clone(),
            self.protocol.clone(),
            self.port.clone(),
            self.search.clone(),
            self.href.clone(),
        ]
    }
}

/// Normalize a user-entered site URL.
///
/// - A missing scheme becomes `http`; `//host` is protocol-relative.
/// - The host is lowercased and a leading `www.` is dropped.
/// - Default ports, fragments, and `utm_*` parameters are dropped.
/// - Query parameters are sorted by name.
/// - A trailing `/` is dropped from any path but the root.
///
/// # Errors
///
/// Returns [`VaultError::InvalidUrl`] if the result is not a URL with a
/// host.
pub fn normalize_url(input: &str) -> Result<Url, VaultError> {
    let invalid = |reason: &str| VaultError::InvalidUrl {
        url: input.to_owned(),
        reason: reason.to_owned(),
    };

    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(invalid("empty URL"));
    }

    let candidate = if has_scheme(trimmed) {
        trimmed.to_owned()
    } else if let Some(rest) = trimmed.strip_prefix("//") {
        format!("http://{rest}")
    } else {
        format!("http://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|e| invalid(&e.to_string()))?;

    let Some(host) = url.host_str().map(str::to_owned) else {
        return Err(invalid("URL has no host"));
    };
    if let Some(bare) = host.strip_prefix("www.").filter(|bare| bare.contains('.')) {
        url.set_host(Some(bare))
            .map_err(|e| invalid(&e.to_string()))?;
    }

    url.set_fragment(None);

    if url.query().is_some() {
        let mut pairs: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(name, _)| !name.starts_with(TRACKING_PARAM_PREFIX))
            .map(|(name, value)| (name.into_owned(), value.into_owned()))
            .collect();
        pairs.sort_by(|a, b| a.0.cmp(&b.0));

        if pairs.is_empty() {
            url.set_query(None);
        } else {
            url.query_pairs_mut().clear().extend_pairs(pairs);
        }
    }

    let path = url.path();
    if path.len() > 1 && path.ends_with('/') {
        let trimmed_path = path.trim_end_matches('/').to_owned();
        url.set_path(&trimmed_path);
    }

    Ok(url)
}

/// Whether `input` starts with `<scheme>://`, a scheme being a letter
/// followed by letters, digits, `+`, `-`, or `.`.
fn has_scheme(input: &str) -> bool {
    let Some((scheme, _)) = input.split_once("://") else {
        return false;
    };
    let mut chars = scheme.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
}
