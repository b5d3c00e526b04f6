use super::*;
use crate::change::ChangeType;
use crate::source::WatchStream;
use async_trait::async_trait;
use futures::stream;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

type Script = Result<Vec<Result<WatchNotification, SourceError>>, SourceError>;

/// Event source that replays prepared responses and records watch cursors.
#[derive(Default)]
struct ScriptedSource {
    versions: Mutex<VecDeque<Result<String, SourceError>>>,
    watches: Mutex<VecDeque<Script>>,
    opened_from: Mutex<Vec<String>>,
}

impl ScriptedSource {
    fn version(self, version: Result<String, SourceError>) -> Self {
        self.versions.lock().unwrap().push_back(version);
        self
    }

    fn watch(self, script: Script) -> Self {
        self.watches.lock().unwrap().push_back(script);
        self
    }

    fn opened_from(&self) -> Vec<String> {
        self.opened_from.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventSource for ScriptedSource {
    async fn current_version(&self) -> Result<String, SourceError> {
        self.versions
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(SourceError::Transient("no version scripted".into())))
    }

    async fn watch(&self, resource_version: &str) -> Result<WatchStream, SourceError> {
        self.opened_from
            .lock()
            .unwrap()
            .push(resource_version.to_string());
        match self.watches.lock().unwrap().pop_front() {
            Some(Ok(items)) => Ok(stream::iter(items).boxed()),
            Some(Err(e)) => Err(e),
            // script exhausted: idle until cancelled
            None => Ok(stream::pending().boxed()),
        }
    }
}

fn change(rv: u32) -> Result<WatchNotification, SourceError> {
    Ok(WatchNotification::Change(
        Change::new(ChangeType::Added, rv.to_string()).with_object(
            "Pod",
            format!("pod-{rv}"),
            "default",
        ),
    ))
}

fn fast_backoff() -> BackoffConfig {
    BackoffConfig::default()
        .with_initial_delay(Duration::from_millis(10))
        .with_max_delay(Duration::from_millis(100))
        .with_jitter(false)
}

/// Run the watcher, collecting `count` changes, then cancel it.
async fn collect(source: Arc<ScriptedSource>, count: usize) -> Vec<String> {
    collect_timed(source, fast_backoff(), count)
        .await
        .into_iter()
        .map(|(rv, _)| rv)
        .collect()
}

/// Like [`collect`], but stamps each change with the (virtual) time it arrived.
async fn collect_timed(
    source: Arc<ScriptedSource>,
    backoff: BackoffConfig,
    count: usize,
) -> Vec<(String, Instant)> {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let cancel = CancellationToken::new();
    let watcher = UpstreamWatcher::new(source, backoff);
    let handle = tokio::spawn(watcher.run(cancel.clone(), move |change| {
        let _ = tx.send((change.resource_version, Instant::now()));
    }));

    let mut seen = Vec::new();
    for _ in 0..count {
        seen.push(rx.recv().await.unwrap());
    }
    cancel.cancel();
    handle.await.unwrap().unwrap();
    seen
}

#[tokio::test(start_paused = true)]
async fn test_reconnects_without_gaps_or_duplicates() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("100".into()))
            .watch(Ok(vec![change(101), change(102)]))
            .watch(Ok(vec![
                change(103),
                Err(SourceError::Transient("connection reset".into())),
            ]))
            .watch(Err(SourceError::Transient("connection refused".into())))
            .watch(Ok(vec![change(103), change(104), change(105)])),
    );

    let seen = collect(source.clone(), 5).await;
    assert_eq!(seen, vec!["101", "102", "103", "104", "105"]);
    assert_eq!(source.opened_from()[..4], ["100", "102", "103", "103"]);
}

#[tokio::test(start_paused = true)]
async fn test_clean_stream_end_reopens_without_backoff() {
    let mut source = ScriptedSource::default().version(Ok("100".into()));
    for _ in 0..6 {
        source = source.watch(Ok(vec![]));
    }
    let source = Arc::new(source.watch(Ok(vec![change(101)])));

    let started = Instant::now();
    let seen = collect_timed(source.clone(), BackoffConfig::default().with_jitter(false), 1).await;

    assert_eq!(seen[0].0, "101");
    assert_eq!(seen[0].1 - started, Duration::ZERO);
    assert_eq!(source.opened_from()[..7], ["100"; 7]);
}

#[tokio::test(start_paused = true)]
async fn test_delivered_change_resets_backoff() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("100".into()))
            .watch(Err(SourceError::Transient("connection refused".into())))
            .watch(Ok(vec![
                change(101),
                Err(SourceError::Transient("connection reset".into())),
            ]))
            .watch(Ok(vec![change(102)])),
    );

    let started = Instant::now();
    let seen = collect_timed(source, BackoffConfig::default().with_jitter(false), 2).await;

    // first failure waits the initial delay
    let first = seen[0].1 - started;
    assert!(first >= Duration::from_millis(500), "first was {first:?}");
    // the failure after a delivered change starts the streak over
    let gap = seen[1].1 - seen[0].1;
    assert!(gap >= Duration::from_millis(500), "gap was {gap:?}");
    assert!(gap < Duration::from_millis(1000), "gap was {gap:?}");
}

#[tokio::test(start_paused = true)]
async fn test_expired_cursor_resumes_from_current_state() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("100".into()))
            .watch(Ok(vec![
                change(101),
                Err(SourceError::Expired("too old resource version: 101".into())),
            ]))
            .version(Ok("500".into()))
            .watch(Ok(vec![change(501)])),
    );

    let seen = collect(source.clone(), 2).await;
    assert_eq!(seen, vec!["101", "501"]);
    assert_eq!(source.opened_from()[..2], ["100", "500"]);
}

#[tokio::test(start_paused = true)]
async fn test_bookmark_advances_cursor() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("100".into()))
            .watch(Ok(vec![Ok(WatchNotification::Bookmark {
                resource_version: "150".into(),
            })]))
            .watch(Ok(vec![change(151)])),
    );

    let seen = collect(source.clone(), 1).await;
    assert_eq!(seen, vec!["151"]);
    assert_eq!(source.opened_from()[..2], ["100", "150"]);
}

#[tokio::test(start_paused = true)]
async fn test_malformed_notification_is_skipped() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("1".into()))
            .watch(Ok(vec![
                change(2),
                Err(SourceError::Malformed("expected value at line 1".into())),
                change(3),
            ])),
    );

    let seen = collect(source.clone(), 2).await;
    assert_eq!(seen, vec!["2", "3"]);
    assert_eq!(source.opened_from(), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn test_transient_version_failure_is_retried() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Err(SourceError::Transient("503 Service Unavailable".into())))
            .version(Ok("7".into()))
            .watch(Ok(vec![change(8)])),
    );

    let seen = collect(source, 1).await;
    assert_eq!(seen, vec!["8"]);
}

#[tokio::test(start_paused = true)]
async fn test_fatal_failure_stops_watcher() {
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("1".into()))
            .watch(Err(SourceError::Fatal("403 Forbidden".into()))),
    );

    let watcher = UpstreamWatcher::new(source.clone(), fast_backoff());
    let result = watcher.run(CancellationToken::new(), |_| {}).await;

    assert_eq!(
        result,
        Err(WatchError::Fatal(SourceError::Fatal("403 Forbidden".into())))
    );
    assert_eq!(source.opened_from(), vec!["1"]);
}

#[tokio::test(start_paused = true)]
async fn test_cancel_returns_ok() {
    let source = Arc::new(ScriptedSource::default().version(Ok("1".into())));
    let cancel = CancellationToken::new();
    let watcher = UpstreamWatcher::new(source, fast_backoff());
    let handle = tokio::spawn(watcher.run(cancel.clone(), |_| {}));

    tokio::time::sleep(Duration::from_millis(50)).await;
    cancel.cancel();
    assert_eq!(handle.await.unwrap(), Ok(()));
}

#[tokio::test(start_paused = true)]
async fn test_spawn_relays_into_hub_skipping_malformed() {
    let malformed = Change::new(ChangeType::Added, "3");
    let source = Arc::new(
        ScriptedSource::default()
            .version(Ok("1".into()))
            .watch(Ok(vec![
                change(2),
                Ok(WatchNotification::Change(malformed)),
                change(4),
            ])),
    );

    let hub = Arc::new(Hub::default());
    let sub = hub.register().unwrap();
    let cancel = CancellationToken::new();
    let handle = UpstreamWatcher::new(source, fast_backoff()).spawn(hub.clone(), cancel.clone());

    let first = sub.recv().await.unwrap();
    let second = sub.recv().await.unwrap();
    assert_eq!(first.object.name, "pod-2");
    assert_eq!(second.object.name, "pod-4");

    cancel.cancel();
    assert_eq!(handle.await.unwrap(), Ok(()));
}
