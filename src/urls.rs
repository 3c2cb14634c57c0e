use std::fmt;

use url::Url;

pub const DEFAULT_ALLOWED_HOST: &str = "www.packtpub.com";

/// Decides which product URLs may be handed to a browser.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPolicy {
    host: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    Unparsable(String),
    Scheme(String),
    Host(String),
    Port(u16),
    Credentials,
    QueryOrFragment,
    EmptyPath,
    PathCharacters,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unparsable(err) => write!(f, "not a url: {err}"),
            Self::Scheme(scheme) => write!(f, "scheme must be http/https, got {scheme}"),
            Self::Host(host) => write!(f, "host {host} is not allowed"),
            Self::Port(port) => write!(f, "explicit port {port} is not allowed"),
            Self::Credentials => f.write_str("credentials are not allowed"),
            Self::QueryOrFragment => f.write_str("query strings and fragments are not allowed"),
            Self::EmptyPath => f.write_str("path must name a product"),
            Self::PathCharacters => f.write_str("path may only contain [A-Za-z0-9-_/]"),
        }
    }
}

impl Default for UrlPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_ALLOWED_HOST)
    }
}

impl UrlPolicy {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into().trim().to_ascii_lowercase(),
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Accepts only URLs already written in canonical form:
    /// `http(s)://<host>/<path>` with a path of `[A-Za-z0-9-_/]`.
    ///
    /// The raw text is checked as written, not the `Url`-normalized form
    /// (dot segments resolved, `\` as `/`, scheme and host lowercased).
    pub fn check(&self, raw: &str) -> Result<(), RejectReason> {
        let raw = raw.trim();
        // `Url` would silently drop an empty `?` or `#`.
        if raw.contains(['?', '#']) {
            return Err(RejectReason::QueryOrFragment);
        }

        let url = Url::parse(raw).map_err(|err| RejectReason::Unparsable(err.to_string()))?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(RejectReason::Scheme(url.scheme().to_owned()));
        }
        if !url.username().is_empty() || url.password().is_some() {
            return Err(RejectReason::Credentials);
        }
        let host = url.host_str().unwrap_or_default();
        if host != self.host {
            return Err(RejectReason::Host(host.to_owned()));
        }
        if let Some(port) = url.port() {
            return Err(RejectReason::Port(port));
        }

        let (scheme, rest) = raw.split_once("://").unwrap_or((raw, ""));
        if scheme != "http" && scheme != "https" {
            return Err(RejectReason::Scheme(scheme.to_owned()));
        }
        let host_end = rest.find(['/', '\\']).unwrap_or(rest.len());
        let (written_host, after_host) = rest.split_at(host_end);
        if written_host != self.host {
            return Err(RejectReason::Host(written_host.to_owned()));
        }

        let path = match after_host.strip_prefix('/') {
            Some(path) => path,
            None if after_host.is_empty() => return Err(RejectReason::EmptyPath),
            None => return Err(RejectReason::PathCharacters),
        };
        if path.is_empty() {
            return Err(RejectReason::EmptyPath);
        }
        if !path
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '/'))
        {
            return Err(RejectReason::PathCharacters);
        }

        Ok(())
    }

    pub fn is_allowed(&self, raw: &str) -> bool {
        self.check(raw).is_ok()
    }
}
