//! Background refresh of the visible page.
//!
//! A [`Poller`] owns one timer per [`RefreshTask`]. Every tick re-fetches the
//! current page, extracts the task's fragments and swaps a live fragment only
//! when its value differs. Failed ticks are logged and dropped; the next tick
//! runs on schedule regardless.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::document::{FragmentKind, SharedDocument};
use crate::extract;
use crate::transport::{Request, Transport, AJAX_HEADER};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskKey {
    TweetList,
    TweetDetail,
}

impl TaskKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKey::TweetList => "tweet_list",
            TaskKey::TweetDetail => "tweet_detail",
        }
    }

    /// Which refresh applies to a page path, if any.
    pub fn for_path(path: &str) -> Option<Self> {
        if path == "/" || path == "/tweets/" {
            Some(TaskKey::TweetList)
        } else if path.contains("/tweet/") {
            Some(TaskKey::TweetDetail)
        } else {
            None
        }
    }

    pub fn targets(&self) -> &'static [FragmentKind] {
        match self {
            TaskKey::TweetList => &[FragmentKind::TweetsGrid],
            TaskKey::TweetDetail => &[FragmentKind::CommentsList, FragmentKind::LikeCount],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RefreshTask {
    pub key: TaskKey,
    pub interval: Duration,
    pub targets: Vec<FragmentKind>,
    pub active: bool,
}

impl RefreshTask {
    pub fn new(key: TaskKey, interval: Duration) -> Self {
        Self {
            key,
            interval,
            targets: key.targets().to_vec(),
            active: false,
        }
    }

    pub fn for_path(path: &str, interval: Duration) -> Option<Self> {
        TaskKey::for_path(path).map(|key| Self::new(key, interval))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TickOutcome {
    pub seq: u64,
    pub replaced: Vec<FragmentKind>,
    /// A newer tick was applied first; this response was thrown away.
    pub stale: bool,
}

/// Fetches the page and patches the live document.
pub struct Reconciler {
    transport: Arc<dyn Transport>,
    document: SharedDocument,
    issued: AtomicU64,
    applied: AtomicU64,
}

impl Reconciler {
    pub fn new(transport: Arc<dyn Transport>, document: SharedDocument) -> Self {
        Self {
            transport,
            document,
            issued: AtomicU64::new(0),
            applied: AtomicU64::new(0),
        }
    }

    pub fn document(&self) -> &SharedDocument {
        &self.document
    }

    pub async fn tick(&self, task: &RefreshTask) -> Result<TickOutcome> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        let path = self.document.lock().await.path.clone();

        let response = self
            .transport
            .send(Request::get(path.as_str()).header(AJAX_HEADER.0, AJAX_HEADER.1))
            .await?;
        if !response.is_success() {
            bail!("poll of {path} returned HTTP {}", response.status);
        }
        let fetched = extract::fragments(&response.body, &task.targets);

        let mut document = self.document.lock().await;
        // Checked under the document lock so two completions cannot interleave.
        if seq <= self.applied.load(Ordering::SeqCst) {
            debug!(task = task.key.as_str(), seq, "discarding stale poll response");
            return Ok(TickOutcome {
                seq,
                replaced: Vec::new(),
                stale: true,
            });
        }
        self.applied.store(seq, Ordering::SeqCst);

        let mut replaced = Vec::new();
        for fragment in fetched {
            let kind = fragment.kind();
            match document.fragment(kind) {
                None => debug!(selector = kind.selector(), "fragment not on live page"),
                Some(live) if live == fragment => {}
                Some(_) => {
                    document.replace_fragment(fragment);
                    replaced.push(kind);
                }
            }
        }

        Ok(TickOutcome {
            seq,
            replaced,
            stale: false,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    Stopped,
    Running,
    Paused,
}

pub struct Poller {
    reconciler: Arc<Reconciler>,
    interval: Duration,
    tasks: HashMap<TaskKey, RefreshTask>,
    timers: HashMap<TaskKey, CancellationToken>,
    state: PollerState,
    enabled: bool,
}

impl Poller {
    pub fn new(reconciler: Arc<Reconciler>, interval: Duration) -> Self {
        Self {
            reconciler,
            interval,
            tasks: HashMap::new(),
            timers: HashMap::new(),
            state: PollerState::Stopped,
            enabled: true,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn task(&self, key: TaskKey) -> Option<&RefreshTask> {
        self.tasks.get(&key)
    }

    pub fn tasks(&self) -> impl Iterator<Item = &RefreshTask> {
        self.tasks.values()
    }

    /// Starts whichever task matches the document's current path.
    pub async fn start_for_current_path(&mut self) -> Option<TaskKey> {
        let path = self.reconciler.document().lock().await.path.clone();
        let task = RefreshTask::for_path(&path, self.interval)?;
        let key = task.key;
        self.start(task);
        Some(key)
    }

    /// Must be called from within a tokio runtime.
    pub fn start(&mut self, mut task: RefreshTask) {
        if let Some(previous) = self.timers.remove(&task.key) {
            previous.cancel();
        }
        self.enabled = true;
        task.active = true;
        let cancel = spawn_timer(Arc::clone(&self.reconciler), task.clone());
        self.timers.insert(task.key, cancel);
        self.tasks.insert(task.key, task);
        self.state = PollerState::Running;
    }

    /// Cancels the timers but keeps the task definitions. In-flight requests
    /// are left to finish.
    pub fn pause(&mut self) {
        for (_, cancel) in self.timers.drain() {
            cancel.cancel();
        }
        for task in self.tasks.values_mut() {
            task.active = false;
        }
        if self.state == PollerState::Running {
            self.state = PollerState::Paused;
        }
    }

    /// Rebuilds the task list for the current path, from scratch.
    pub async fn resume(&mut self) -> Option<TaskKey> {
        if !self.enabled || self.state != PollerState::Paused {
            return None;
        }
        self.tasks.clear();
        let key = self.start_for_current_path().await;
        if key.is_none() {
            self.state = PollerState::Stopped;
        }
        key
    }

    /// Terminal: discards every task. Only a new `start` revives the poller.
    pub fn stop(&mut self) {
        self.pause();
        self.tasks.clear();
        self.enabled = false;
        self.state = PollerState::Stopped;
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        for cancel in self.timers.values() {
            cancel.cancel();
        }
    }
}

fn spawn_timer(reconciler: Arc<Reconciler>, task: RefreshTask) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();

    tokio::spawn(async move {
        let mut ticker = time::interval_at(Instant::now() + task.interval, task.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        debug!(task = task.key.as_str(), interval = ?task.interval, "refresh timer started");

        loop {
            tokio::select! {
                _ = token.cancelled() => {
                    debug!(task = task.key.as_str(), "refresh timer stopped");
                    break;
                }
                _ = ticker.tick() => {
                    // Ticks run detached: a slow response never delays the schedule.
                    let reconciler = Arc::clone(&reconciler);
                    let task = task.clone();
                    tokio::spawn(async move {
                        match reconciler.tick(&task).await {
                            Ok(outcome) if !outcome.replaced.is_empty() => {
                                info!(task = task.key.as_str(), replaced = ?outcome.replaced, "page refreshed");
                            }
                            Ok(_) => {}
                            Err(err) => warn!(task = task.key.as_str(), "auto-refresh error: {err:#}"),
                        }
                    });
                }
            }
        }
    });

    cancel
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{CommentList, Document, TweetGrid};
    use crate::extract::fixtures::{detail_page, list_page};
    use crate::transport::testing::FakeTransport;
    use crate::transport::{Method, Response};
    use async_trait::async_trait;
    use tokio::sync::{oneshot, Mutex};

    fn reconciler_for(path: &str, html: &str) -> (Arc<Reconciler>, Arc<FakeTransport>) {
        let transport = FakeTransport::new();
        let document = extract::document(path, html).into_shared();
        (Arc::new(Reconciler::new(transport.clone(), document)), transport)
    }

    #[test]
    fn test_route_matching() {
        assert_eq!(TaskKey::for_path("/"), Some(TaskKey::TweetList));
        assert_eq!(TaskKey::for_path("/tweets/"), Some(TaskKey::TweetList));
        assert_eq!(TaskKey::for_path("/tweet/12/"), Some(TaskKey::TweetDetail));
        assert_eq!(TaskKey::for_path("/profile/ada/"), None);
        let task = RefreshTask::for_path("/tweet/1/", DEFAULT_INTERVAL).unwrap();
        assert_eq!(
            task.targets,
            vec![FragmentKind::CommentsList, FragmentKind::LikeCount]
        );
        assert!(!task.active);
    }

    #[tokio::test]
    async fn test_unchanged_page_is_not_replaced() {
        let html = list_page(&[(1, "ada", "hi", 2)]);
        let (reconciler, transport) = reconciler_for("/", &html);
        transport.respond(Method::Get, "/", 200, &html);
        let task = RefreshTask::new(TaskKey::TweetList, DEFAULT_INTERVAL);

        let before = reconciler.document().lock().await.clone();
        for _ in 0..2 {
            let outcome = reconciler.tick(&task).await.unwrap();
            assert!(outcome.replaced.is_empty());
            assert!(!outcome.stale);
        }
        assert_eq!(*reconciler.document().lock().await, before);

        let request = &transport.requests()[0];
        assert_eq!(request.header_value("X-Requested-With"), Some("XMLHttpRequest"));
    }

    #[tokio::test]
    async fn test_changed_grid_is_replaced() {
        let (reconciler, transport) = reconciler_for("/", &list_page(&[(1, "ada", "hi", 2)]));
        transport.respond(
            Method::Get,
            "/",
            200,
            &list_page(&[(2, "bob", "new one", 0), (1, "ada", "hi", 3)]),
        );
        let task = RefreshTask::new(TaskKey::TweetList, DEFAULT_INTERVAL);

        let outcome = reconciler.tick(&task).await.unwrap();
        assert_eq!(outcome.replaced, vec![FragmentKind::TweetsGrid]);
        let document = reconciler.document().lock().await;
        let ids: Vec<u64> = document.tweets.as_ref().unwrap().cards().iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![2, 1]);
        assert_eq!(document.card(1).unwrap().like.count, 3);
    }

    #[tokio::test]
    async fn test_reordered_cards_count_as_a_change() {
        let (reconciler, transport) =
            reconciler_for("/", &list_page(&[(1, "ada", "a", 0), (2, "bob", "b", 0)]));
        transport.respond(
            Method::Get,
            "/",
            200,
            &list_page(&[(2, "bob", "b", 0), (1, "ada", "a", 0)]),
        );
        let task = RefreshTask::new(TaskKey::TweetList, DEFAULT_INTERVAL);
        let outcome = reconciler.tick(&task).await.unwrap();
        assert_eq!(outcome.replaced, vec![FragmentKind::TweetsGrid]);
    }

    #[tokio::test]
    async fn test_detail_updates_comments_and_like_count_independently() {
        let (reconciler, transport) =
            reconciler_for("/tweet/5/", &detail_page(5, 1, &[(1, "di", "old")]));
        transport.respond(
            Method::Get,
            "/tweet/5/",
            200,
            &detail_page(5, 4, &[(1, "di", "old")]),
        );
        let task = RefreshTask::new(TaskKey::TweetDetail, DEFAULT_INTERVAL);

        let outcome = reconciler.tick(&task).await.unwrap();
        assert_eq!(outcome.replaced, vec![FragmentKind::LikeCount]);
        let document = reconciler.document().lock().await;
        assert_eq!(document.detail.as_ref().unwrap().like.count, 4);
    }

    #[tokio::test]
    async fn test_missing_fragment_is_a_no_op() {
        let mut document = Document::new("/tweet/5/");
        document.comments = Some(CommentList::Empty);
        let transport = FakeTransport::new();
        let reconciler = Reconciler::new(transport.clone(), document.into_shared());
        // The fetched page has a like counter the live page lacks, and the
        // comment list the live page has.
        transport.respond(
            Method::Get,
            "/tweet/5/",
            200,
            &detail_page(5, 9, &[(3, "cy", "hey")]),
        );
        let task = RefreshTask::new(TaskKey::TweetDetail, DEFAULT_INTERVAL);

        let outcome = reconciler.tick(&task).await.unwrap();
        assert_eq!(outcome.replaced, vec![FragmentKind::CommentsList]);
        let document = reconciler.document().lock().await;
        assert!(document.detail.is_none());
        assert_eq!(document.comments.as_ref().unwrap().items().len(), 1);
    }

    #[tokio::test]
    async fn test_failed_poll_leaves_document() {
        let html = list_page(&[(1, "ada", "hi", 2)]);
        let (reconciler, transport) = reconciler_for("/", &html);
        transport.respond(Method::Get, "/", 503, "unavailable");
        let task = RefreshTask::new(TaskKey::TweetList, DEFAULT_INTERVAL);
        let before = reconciler.document().lock().await.clone();

        assert!(reconciler.tick(&task).await.is_err());
        assert_eq!(*reconciler.document().lock().await, before);

        transport.fail(Method::Get, "/", "connection refused");
        assert!(reconciler.tick(&task).await.is_err());
    }

    /// Holds the first poll open until released; later polls answer at once.
    struct GatedTransport {
        gate: Mutex<Option<oneshot::Receiver<()>>>,
        first: String,
        later: String,
        calls: AtomicU64,
    }

    #[async_trait]
    impl Transport for GatedTransport {
        async fn send(&self, _request: Request) -> Result<Response> {
            if self.calls.fetch_add(1, Ordering::SeqCst) == 0 {
                let gate = self.gate.lock().await.take();
                if let Some(gate) = gate {
                    let _ = gate.await;
                }
                Ok(Response::new(200, self.first.clone()))
            } else {
                Ok(Response::new(200, self.later.clone()))
            }
        }
    }

    #[tokio::test]
    async fn test_stale_response_is_discarded() {
        let (release, gate) = oneshot::channel();
        let transport = Arc::new(GatedTransport {
            gate: Mutex::new(Some(gate)),
            first: list_page(&[(1, "ada", "old", 0)]),
            later: list_page(&[(1, "ada", "new", 0)]),
            calls: AtomicU64::new(0),
        });
        let document = extract::document("/", &list_page(&[(1, "ada", "initial", 0)])).into_shared();
        let reconciler = Arc::new(Reconciler::new(transport.clone(), document));
        let task = RefreshTask::new(TaskKey::TweetList, DEFAULT_INTERVAL);

        let slow = {
            let reconciler = Arc::clone(&reconciler);
            let task = task.clone();
            tokio::spawn(async move { reconciler.tick(&task).await })
        };
        while transport.calls.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }

        let fast = reconciler.tick(&task).await.unwrap();
        assert_eq!(fast.replaced, vec![FragmentKind::TweetsGrid]);

        release.send(()).unwrap();
        let slow = slow.await.unwrap().unwrap();
        assert!(slow.stale);
        assert!(slow.seq < fast.seq);

        let document = reconciler.document().lock().await;
        assert_eq!(document.card(1).unwrap().text, "new");
    }

    #[tokio::test(start_paused = true)]
    async fn test_poller_ticks_on_interval() {
        let html = list_page(&[(1, "ada", "hi", 0)]);
        let (reconciler, transport) = reconciler_for("/", &html);
        transport.respond(Method::Get, "/", 200, &html);
        let mut poller = Poller::new(reconciler, Duration::from_secs(10));

        assert_eq!(poller.start_for_current_path().await, Some(TaskKey::TweetList));
        assert_eq!(poller.state(), PollerState::Running);
        assert!(poller.task(TaskKey::TweetList).unwrap().active);

        time::sleep(Duration::from_secs(5)).await;
        assert!(transport.requests().is_empty());

        time::sleep(Duration::from_secs(21)).await;
        assert_eq!(transport.requests().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pause_resume_stop() {
        let html = list_page(&[(1, "ada", "hi", 0)]);
        let (reconciler, transport) = reconciler_for("/", &html);
        transport.respond(Method::Get, "/", 200, &html);
        let mut poller = Poller::new(Arc::clone(&reconciler), Duration::from_secs(10));
        poller.start_for_current_path().await;

        poller.pause();
        assert_eq!(poller.state(), PollerState::Paused);
        assert!(!poller.task(TaskKey::TweetList).unwrap().active);
        time::sleep(Duration::from_secs(30)).await;
        assert!(transport.requests().is_empty());

        // Navigated while hidden: resume picks the task for the new path.
        reconciler.document().lock().await.path = "/tweet/1/".into();
        transport.respond(Method::Get, "/tweet/1/", 200, &html);
        assert_eq!(poller.resume().await, Some(TaskKey::TweetDetail));
        assert!(poller.task(TaskKey::TweetList).is_none());
        time::sleep(Duration::from_secs(11)).await;
        assert_eq!(transport.requests_to("/tweet/1/").len(), 1);

        poller.stop();
        assert_eq!(poller.state(), PollerState::Stopped);
        assert_eq!(poller.tasks().count(), 0);
        assert_eq!(poller.resume().await, None);
        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_tick_does_not_stop_schedule() {
        let (reconciler, transport) = reconciler_for("/", &list_page(&[(1, "ada", "hi", 0)]));
        transport.fail(Method::Get, "/", "offline");
        transport.respond(Method::Get, "/", 200, &list_page(&[]));
        let mut poller = Poller::new(Arc::clone(&reconciler), Duration::from_secs(10));
        poller.start_for_current_path().await;

        time::sleep(Duration::from_secs(25)).await;
        assert_eq!(transport.requests().len(), 2);
        assert_eq!(
            reconciler.document().lock().await.tweets,
            Some(TweetGrid::Empty)
        );
    }

    #[tokio::test]
    async fn test_no_task_for_unmonitored_path() {
        let (reconciler, _) = reconciler_for("/profile/ada/", "<html></html>");
        let mut poller = Poller::new(reconciler, DEFAULT_INTERVAL);
        assert_eq!(poller.start_for_current_path().await, None);
        assert_eq!(poller.state(), PollerState::Stopped);
    }
}
