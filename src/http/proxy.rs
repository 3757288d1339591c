use url::Url;

/// Per-scheme proxy routes: URL scheme → proxy authority (`[user:pass@]host[:port]`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyRouting {
    routes: Vec<(String, String)>,
}

impl ProxyRouting {
    /// Direct connection.
    pub fn direct() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Proxy authority for requests with the given URL scheme.
    pub fn get(&self, scheme: &str) -> Option<&str> {
        self.routes
            .iter()
            .find(|(s, _)| s == scheme)
            .map(|(_, authority)| authority.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.routes.iter().map(|(s, a)| (s.as_str(), a.as_str()))
    }

    fn route(&mut self, scheme: &str, authority: &str) {
        self.routes.push((scheme.to_string(), authority.to_string()));
    }

    /// Install the routes on a client builder.
    ///
    /// Environment proxy variables are never consulted: an empty routing
    /// means a direct connection.
    pub fn apply(&self, builder: reqwest::ClientBuilder) -> reqwest::ClientBuilder {
        let mut builder = builder.no_proxy();
        for (scheme, authority) in self.iter() {
            let target = match Url::parse(&format!("http://{authority}")) {
                Ok(target) => target,
                Err(e) => {
                    tracing::warn!(scheme = scheme, error = %e, "Skipping unusable proxy route");
                    continue;
                }
            };
            let scheme = scheme.to_string();
            let proxy = reqwest::Proxy::custom(move |url| {
                (url.scheme() == scheme).then(|| target.clone())
            });
            builder = builder.proxy(proxy);
        }
        builder
    }
}

/// Turn a configured proxy URL into routes.
///
/// A proxy for `http` or `https` carries both kinds of traffic; any other
/// scheme only carries its own. A missing or malformed proxy (no scheme or no
/// host) yields a direct connection.
pub fn resolve_proxy(proxy_url: Option<&str>) -> ProxyRouting {
    let mut routing = ProxyRouting::direct();

    let Some(raw) = proxy_url.map(str::trim).filter(|s| !s.is_empty()) else {
        return routing;
    };

    let url = match Url::parse(raw) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => url,
        Ok(_) | Err(_) => {
            tracing::warn!(proxy = %raw, "Ignoring proxy without a scheme or host");
            return routing;
        }
    };

    let authority = url.authority().to_string();
    match url.scheme() {
        "http" | "https" => {
            routing.route("http", &authority);
            routing.route("https", &authority);
        }
        other => routing.route(other, &authority),
    }

    routing
}
