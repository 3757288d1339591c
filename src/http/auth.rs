//! HTTP Basic/Digest challenge discovery and response.
//!
//! Resolution is a best-effort probe: the feed URL is requested without
//! credentials and a `401` + `WWW-Authenticate` answer decides which scheme
//! to use. Any probe failure means "no authentication"; the real failure, if
//! any, surfaces from the authenticated fetch.

use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;
use reqwest::header::{AUTHORIZATION, WWW_AUTHENTICATE};
use reqwest::{RequestBuilder, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use url::Url;

/// Username and password configured for a feed.
pub struct Credentials {
    pub username: String,
    pub password: SecretString,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: SecretString::from(password.into()),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthScheme {
    Basic,
    Digest,
}

/// A parsed `WWW-Authenticate` challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Challenge {
    pub scheme: AuthScheme,
    /// `None` when the header has no realm; `Some("")` for `realm=""`.
    pub realm: Option<String>,
}

fn scheme_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"(?i)\b(digest|basic)\b").expect("valid regex"))
}

fn realm_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r#"(?i)\brealm\s*=\s*(?:"([^"]*)"|([^\s,]*))"#).expect("valid regex")
    })
}

/// Parse a `WWW-Authenticate` header value.
///
/// Returns `None` when neither `Basic` nor `Digest` appears in it.
pub fn parse_challenge(header: &str) -> Option<Challenge> {
    let found = scheme_pattern().captures(header)?;
    let token = found.get(1)?;

    let scheme = if token.as_str().eq_ignore_ascii_case("basic") {
        AuthScheme::Basic
    } else {
        AuthScheme::Digest
    };

    let realm = realm_pattern()
        .captures(&header[token.end()..])
        .and_then(|c| c.get(1).or_else(|| c.get(2)))
        .map(|m| m.as_str().to_string());

    Some(Challenge { scheme, realm })
}

/// Credentials bound to a realm and URL scope.
#[derive(Debug)]
pub struct BoundCredentials {
    pub realm: Option<String>,
    pub scope: Url,
    pub username: String,
    password: SecretString,
}

impl BoundCredentials {
    /// A bound realm of `None` answers any realm.
    fn accepts(&self, url: &Url, realm: Option<&str>) -> bool {
        let realm_ok = match &self.realm {
            None => true,
            Some(bound) => realm == Some(bound.as_str()),
        };
        realm_ok && in_scope(&self.scope, url)
    }
}

fn in_scope(scope: &Url, url: &Url) -> bool {
    scope.origin() == url.origin() && url.path().starts_with(scope.path())
}

/// How requests to a feed are authenticated.
#[derive(Debug)]
pub enum AuthStrategy {
    None,
    Basic(BoundCredentials),
    Digest(BoundCredentials),
}

impl AuthStrategy {
    /// Bind credentials according to a probed challenge.
    pub fn from_challenge(
        challenge: Option<Challenge>,
        scope: &Url,
        credentials: &Credentials,
    ) -> Self {
        let Some(challenge) = challenge else {
            return AuthStrategy::None;
        };

        let bound = BoundCredentials {
            realm: challenge.realm,
            scope: scope.clone(),
            username: credentials.username.clone(),
            password: SecretString::from(credentials.password.expose_secret().to_owned()),
        };

        match challenge.scheme {
            AuthScheme::Basic => AuthStrategy::Basic(bound),
            AuthScheme::Digest => AuthStrategy::Digest(bound),
        }
    }

    pub fn scheme(&self) -> Option<AuthScheme> {
        match self {
            AuthStrategy::None => None,
            AuthStrategy::Basic(_) => Some(AuthScheme::Basic),
            AuthStrategy::Digest(_) => Some(AuthScheme::Digest),
        }
    }

    pub fn realm(&self) -> Option<&str> {
        match self {
            AuthStrategy::None => None,
            AuthStrategy::Basic(b) | AuthStrategy::Digest(b) => b.realm.as_deref(),
        }
    }

    pub fn is_none(&self) -> bool {
        matches!(self, AuthStrategy::None)
    }

    /// Answer the challenge in `www_authenticate` for a request to `url`.
    ///
    /// Returns `None` when this strategy does not apply: no credentials, a
    /// different scheme, a realm mismatch, or a URL outside the bound scope.
    pub fn authorize(
        &self,
        request: RequestBuilder,
        url: &Url,
        www_authenticate: &str,
    ) -> Option<RequestBuilder> {
        let challenge = parse_challenge(www_authenticate)?;

        match self {
            AuthStrategy::None => None,
            AuthStrategy::Basic(bound) => {
                if challenge.scheme != AuthScheme::Basic
                    || !bound.accepts(url, challenge.realm.as_deref())
                {
                    return None;
                }
                Some(request.basic_auth(&bound.username, Some(bound.password.expose_secret())))
            }
            AuthStrategy::Digest(bound) => {
                if challenge.scheme != AuthScheme::Digest
                    || !bound.accepts(url, challenge.realm.as_deref())
                {
                    return None;
                }
                let header = digest_response(bound, url, www_authenticate)?;
                Some(request.header(AUTHORIZATION, header))
            }
        }
    }
}

fn digest_response(bound: &BoundCredentials, url: &Url, www_authenticate: &str) -> Option<String> {
    // The header may list several challenges; digest_auth wants ours first.
    let start = www_authenticate.to_ascii_lowercase().find("digest")?;
    let mut prompt = match digest_auth::parse(&www_authenticate[start..]) {
        Ok(prompt) => prompt,
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Unable to parse the digest challenge");
            return None;
        }
    };

    let uri = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };
    let context = digest_auth::AuthContext::new(
        bound.username.as_str(),
        bound.password.expose_secret(),
        uri.as_str(),
    );

    match prompt.respond(&context) {
        Ok(answer) => Some(answer.to_header_string()),
        Err(e) => {
            tracing::warn!(url = %url, error = %e, "Unable to answer the digest challenge");
            None
        }
    }
}

/// Request `url` without credentials and parse any authentication challenge.
///
/// Never fails: transport errors, non-401 answers and unparseable headers all
/// yield `None`.
pub async fn probe_challenge(
    client: &reqwest::Client,
    url: &Url,
    timeout: Duration,
) -> Option<Challenge> {
    let response = match tokio::time::timeout(timeout, client.get(url.clone()).send()).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::warn!(url = %url, error = %e, "Authentication probe failed");
            return None;
        }
        Err(_) => {
            tracing::warn!(url = %url, "Authentication probe timed out");
            return None;
        }
    };

    if response.status() != StatusCode::UNAUTHORIZED {
        return None;
    }

    let header = response.headers().get(WWW_AUTHENTICATE)?;
    let Ok(header) = header.to_str() else {
        tracing::warn!(url = %url, "Unable to read the HTTP authentication header");
        return None;
    };

    let challenge = parse_challenge(header);
    if challenge.is_none() {
        tracing::warn!(
            url = %url,
            header = %header,
            "Unable to parse the HTTP authentication header"
        );
    }
    challenge
}

/// Decide how to authenticate against `url`.
///
/// # Arguments
///
/// * `client` - The per-poll client, so the probe goes through the same proxy
/// * `url` - Feed URL; the resolved credentials are scoped to it
/// * `credentials` - Configured username and password, if any
/// * `timeout` - Bound on the probe request
///
/// # Returns
///
/// [`AuthStrategy::Basic`] or [`AuthStrategy::Digest`] bound to the realm the
/// server named, or [`AuthStrategy::None`].
///
/// # Behavior
///
/// - Without credentials no probe is made
/// - The probe is one unauthenticated GET; anything but a 401 means `None`
/// - An unreachable server or an unrecognized challenge header logs a
///   warning and yields `None`, so the fetch proceeds unauthenticated
pub async fn resolve_auth(
    client: &reqwest::Client,
    url: &Url,
    credentials: Option<&Credentials>,
    timeout: Duration,
) -> AuthStrategy {
    let Some(credentials) = credentials else {
        return AuthStrategy::None;
    };

    let challenge = probe_challenge(client, url, timeout).await;
    let strategy = AuthStrategy::from_challenge(challenge, url, credentials);
    tracing::debug!(
        url = %url,
        scheme = ?strategy.scheme(),
        realm = ?strategy.realm(),
        "Resolved authentication"
    );
    strategy
}
