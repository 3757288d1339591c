//! HTTP plumbing for a single poll: proxy routing, challenge-response
//! authentication and the feed fetch itself.
//!
//! Nothing here is process-wide. Each poll resolves its proxy routes, builds
//! its own [`reqwest::Client`], probes for authentication and fetches, then
//! drops the client.

mod auth;
mod fetcher;
mod proxy;

pub use auth::{
    parse_challenge, probe_challenge, resolve_auth, AuthScheme, AuthStrategy, BoundCredentials,
    Challenge, Credentials,
};
pub use fetcher::{build_client, fetch_feed, FetchError, FetchedFeed};
pub use proxy::{resolve_proxy, ProxyRouting};
