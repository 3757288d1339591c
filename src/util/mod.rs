//! Utility functions for common operations.
//!
//! - **Interval parsing**: `15m`, `8h`, `1d` style polling intervals
//! - **URL validation**: feed URLs must be http(s) with a host
//!
//! # Examples
//!
//! ```
//! use siphon::util::{parse_interval, validate_feed_url};
//!
//! let every = parse_interval("15m").unwrap();
//! assert_eq!(every.as_secs(), 900);
//!
//! let url = validate_feed_url("https://example.com/feed.xml").unwrap();
//! ```

mod interval;
mod url_validator;

pub use interval::{parse_interval, IntervalError};
pub use url_validator::{validate_feed_url, UrlValidationError};
