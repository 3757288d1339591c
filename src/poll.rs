//! One poll cycle for one stanza: fetch, select new entries, emit them and
//! advance the checkpoint.
use std::sync::Arc;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::checkpoint::{
    compute_next_checkpoint, interval_elapsed, load_checkpoint_lenient, save_checkpoint,
    Checkpoint, CheckpointError, CheckpointStore,
};
use crate::config::{HttpConfig, StanzaConfig};
use crate::feed::{clean_entry, flatten_sorted, select_entries, FeedValue, HtmlConverter};
use crate::http::{build_client, fetch_feed, resolve_auth, resolve_proxy, FetchError};
use crate::sink::{Event, EventSink, SinkError};
use crate::util::{validate_feed_url, UrlValidationError};

#[derive(Debug, Error)]
pub enum PollError {
    #[error("Invalid feed URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),

    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("Failed to emit event: {0}")]
    Sink(#[from] SinkError),

    #[error("Failed to write checkpoint: {0}")]
    CheckpointWrite(#[source] CheckpointError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The stanza's interval has not elapsed since its last run.
    NotDue,
    /// The poll ran and its checkpoint was written.
    Completed { emitted: usize, checkpoint: Checkpoint },
}

/// Runs poll cycles against a shared checkpoint store.
#[derive(Clone)]
pub struct Poller {
    http: HttpConfig,
    store: Arc<dyn CheckpointStore>,
    converter: Arc<dyn HtmlConverter>,
}

impl Poller {
    pub fn new(
        http: HttpConfig,
        store: Arc<dyn CheckpointStore>,
        converter: Arc<dyn HtmlConverter>,
    ) -> Self {
        Self {
            http,
            store,
            converter,
        }
    }

    pub fn store(&self) -> &dyn CheckpointStore {
        self.store.as_ref()
    }

    /// Poll `stanza` if it is due at `now`.
    ///
    /// # Arguments
    ///
    /// * `stanza` - Feed settings: URL, credentials, proxy, interval, event metadata
    /// * `sink` - Receives one [`Event`] per selected entry
    /// * `now` - The poll's clock reading, used for the due check and the next checkpoint
    ///
    /// # Returns
    ///
    /// [`PollOutcome::NotDue`] when the interval has not elapsed since the last
    /// run, otherwise the number of events emitted and the checkpoint written.
    ///
    /// # Errors
    ///
    /// - [`PollError::InvalidUrl`] - The stanza URL is not http(s)
    /// - [`PollError::Fetch`] - Transport, status, timeout or size failure
    /// - [`PollError::Sink`] - An event could not be emitted
    /// - [`PollError::CheckpointWrite`] - Events were emitted but the checkpoint was not saved
    ///
    /// # Behavior
    ///
    /// - An unreadable checkpoint counts as a first run
    /// - With `include_only_changed`, only entries newer than the stored
    ///   `last_entry_date` are emitted; undated entries always are
    /// - A fetch failure leaves the checkpoint untouched so the same window is
    ///   retried next interval
    /// - A body that cannot be parsed counts as an empty feed: the poll still
    ///   completes and `last_run` advances
    pub async fn poll(
        &self,
        stanza: &StanzaConfig,
        sink: &mut dyn EventSink,
        now: DateTime<Utc>,
    ) -> Result<PollOutcome, PollError> {
        let prior = load_checkpoint_lenient(self.store(), &stanza.name).await;
        if !interval_elapsed(prior.map(|c| c.last_run), stanza.interval, now) {
            tracing::debug!(stanza = %stanza.name, "Interval not elapsed, skipping");
            return Ok(PollOutcome::NotDue);
        }

        let boundary = if stanza.include_only_changed {
            prior.and_then(|c| c.last_entry_date)
        } else {
            None
        };

        let entries = match fetch_stanza(&self.http, stanza).await {
            Ok(entries) => entries,
            Err(PollError::Fetch(e @ FetchError::Parse { .. })) => {
                tracing::warn!(stanza = %stanza.name, error = %e, "Feed unparseable, treating as empty");
                Vec::new()
            }
            Err(e) => return Err(e),
        };
        let fetched = entries.len();

        let selection = select_entries(entries, boundary);
        let mut emitted = 0;
        for mut entry in selection.selected {
            if stanza.clean_html {
                clean_entry(&mut entry, self.converter.as_ref());
            }
            let event = Event::for_stanza(stanza, flatten_sorted(&entry, ""));
            sink.emit(&event)?;
            emitted += 1;
        }

        let checkpoint = compute_next_checkpoint(
            prior.as_ref(),
            stanza.interval,
            &stanza.name,
            selection.latest,
            emitted,
            now,
        );
        save_checkpoint(self.store(), &stanza.name, &checkpoint)
            .await
            .map_err(PollError::CheckpointWrite)?;

        tracing::info!(
            stanza = %stanza.name,
            fetched = fetched,
            emitted = emitted,
            "Poll completed"
        );

        Ok(PollOutcome::Completed {
            emitted,
            checkpoint,
        })
    }
}

/// Fetch and parse `stanza`'s feed with a client built for this call alone.
pub async fn fetch_stanza(http: &HttpConfig, stanza: &StanzaConfig) -> Result<Vec<FeedValue>, PollError> {
    let url = validate_feed_url(&stanza.url)?;
    let routing = resolve_proxy(stanza.proxy.as_deref());
    let client = build_client(http, &routing)?;

    let credentials = stanza.credentials();
    let auth = resolve_auth(&client, &url, credentials.as_ref(), http.timeout()).await;
    if let Some(scheme) = auth.scheme() {
        tracing::debug!(stanza = %stanza.name, scheme = ?scheme, realm = ?auth.realm(), "Using authentication");
    }

    let feed = fetch_feed(&client, &url, &auth, http).await?;
    Ok(feed.entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checkpoint::{load_checkpoint, SqliteCheckpointStore, DEFAULT_TIMEOUT};
    use crate::feed::{FieldValue, PlainTextConverter};
    use crate::sink::MemorySink;
    use chrono::TimeZone;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const FEED: &str = r#"<?xml version="1.0"?>
<rss version="2.0"><channel><title>t</title>
<item><title>Old</title><guid>1</guid><pubDate>Mon, 09 Feb 2015 00:00:00 GMT</pubDate>
<description>&lt;p&gt;old &amp;amp; busted&lt;/p&gt;</description></item>
<item><title>New</title><guid>2</guid><pubDate>Tue, 10 Feb 2015 00:00:00 GMT</pubDate>
<description>&lt;p&gt;new &lt;b&gt;hotness&lt;/b&gt;&lt;/p&gt;</description></item>
</channel></rss>"#;

    fn ts(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn feb(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2015, 2, day, 0, 0, 0).unwrap()
    }

    async fn setup(body: &str) -> (MockServer, Poller) {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/feed"))
            .respond_with(ResponseTemplate::new(200).set_body_string(body.to_string()))
            .mount(&server)
            .await;
        let store = SqliteCheckpointStore::open(":memory:", DEFAULT_TIMEOUT).await.unwrap();
        let poller = Poller::new(HttpConfig::default(), Arc::new(store), Arc::new(PlainTextConverter));
        (server, poller)
    }

    fn stanza(server: &MockServer) -> StanzaConfig {
        StanzaConfig::new("test", format!("{}/feed", server.uri()), Duration::from_secs(3600))
    }

    #[tokio::test]
    async fn test_not_due_skips_without_fetching() {
        let (server, poller) = setup(FEED).await;
        let stanza = stanza(&server);
        let prior = Checkpoint {
            last_run: ts(1_000_000),
            last_entry_date: Some(feb(9)),
        };
        save_checkpoint(poller.store(), "test", &prior).await.unwrap();

        let mut sink = MemorySink::default();
        let outcome = poller.poll(&stanza, &mut sink, ts(1_000_100)).await.unwrap();

        assert_eq!(outcome, PollOutcome::NotDue);
        assert!(sink.events.is_empty());
        assert!(server.received_requests().await.unwrap().is_empty());
        assert_eq!(load_checkpoint(poller.store(), "test").await.unwrap(), Some(prior));
    }

    #[tokio::test]
    async fn test_include_only_changed_false_emits_everything() {
        let (server, poller) = setup(FEED).await;
        let mut stanza = stanza(&server);
        stanza.include_only_changed = false;
        let prior = Checkpoint {
            last_run: ts(0),
            last_entry_date: Some(feb(10)),
        };
        save_checkpoint(poller.store(), "test", &prior).await.unwrap();

        let mut sink = MemorySink::default();
        let outcome = poller.poll(&stanza, &mut sink, ts(1_500_000_000)).await.unwrap();

        match outcome {
            PollOutcome::Completed { emitted, checkpoint } => {
                assert_eq!(emitted, 2);
                assert_eq!(checkpoint.last_entry_date, Some(feb(10)));
            }
            other => panic!("Expected Completed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_clean_html_applied_to_emitted_events() {
        let (server, poller) = setup(FEED).await;
        let mut stanza = stanza(&server);
        stanza.clean_html = true;

        let mut sink = MemorySink::default();
        poller.poll(&stanza, &mut sink, ts(1_500_000_000)).await.unwrap();

        let summaries: Vec<_> = sink
            .events
            .iter()
            .map(|e| e.fields.get("summary").cloned())
            .collect();
        assert_eq!(
            summaries,
            vec![
                Some(FieldValue::String("old & busted".to_string())),
                Some(FieldValue::String("new hotness".to_string())),
            ]
        );
    }

    #[tokio::test]
    async fn test_events_carry_stanza_metadata() {
        let (server, poller) = setup(FEED).await;
        let mut stanza = stanza(&server);
        stanza.sourcetype = "rss".to_string();
        stanza.index = "news".to_string();

        let mut sink = MemorySink::default();
        poller.poll(&stanza, &mut sink, ts(1_500_000_000)).await.unwrap();

        let event = &sink.events[0];
        assert_eq!(event.source, "test");
        assert_eq!(event.sourcetype, "rss");
        assert_eq!(event.index, "news");
        assert_eq!(
            event.fields.get("title"),
            Some(&FieldValue::String("Old".to_string()))
        );
        let keys: Vec<_> = event.fields.keys().collect();
        let mut sorted = keys.clone();
        sorted.sort();
        assert_eq!(keys, sorted);
    }

    struct FailingSink;

    impl EventSink for FailingSink {
        fn emit(&mut self, _event: &Event) -> Result<(), SinkError> {
            Err(SinkError::Io(std::io::Error::new(
                std::io::ErrorKind::BrokenPipe,
                "closed",
            )))
        }
    }

    #[tokio::test]
    async fn test_sink_failure_leaves_checkpoint_unwritten() {
        let (server, poller) = setup(FEED).await;
        let stanza = stanza(&server);

        let err = poller
            .poll(&stanza, &mut FailingSink, ts(1_500_000_000))
            .await
            .unwrap_err();

        assert!(matches!(err, PollError::Sink(_)));
        assert_eq!(load_checkpoint(poller.store(), "test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_invalid_url_reported() {
        let (_server, poller) = setup(FEED).await;
        let stanza = StanzaConfig::new("test", "ftp://example.com/feed", Duration::from_secs(60));

        let err = poller
            .poll(&stanza, &mut MemorySink::default(), ts(0))
            .await
            .unwrap_err();
        assert!(matches!(err, PollError::InvalidUrl(_)));
    }
}
