//! Per-view fetch controller.
//!
//! Owns one [`FetchSession`] at a time plus the data derived from its result.
//! Requests run on worker threads and report back over a channel; every
//! mutation happens on the caller's thread inside [`Controller::poll`] or
//! [`Controller::wait`], so there is a single writer. Each settlement carries
//! the request id it was issued under and is dropped unless that id still
//! belongs to the live, uncancelled session.

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender};
use tracing::{debug, info, warn};

use crate::aggregate::{aggregate, Distribution};
use crate::cache::CommentCache;
use crate::data::{CancelToken, CommentService};
use crate::error::FetchError;
use crate::model::CommentSet;
use crate::reachability::{Monitor, Subscription, Transition};
use crate::view::{Filter, Page, SortKey, ViewError, ViewState};
use crate::video_id::VideoId;

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(2000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
        }
    }
}

impl RetryPolicy {
    /// Wait before the attempt following `attempt` (1-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_base.saturating_mul(attempt)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    InFlight,
    Retrying,
    Succeeded,
    Failed,
    Cancelled,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Status {
    Idle,
    InFlight {
        attempt: u32,
    },
    Retrying {
        next_attempt: u32,
        delay: Duration,
        resume_at: Instant,
        cause: FetchError,
    },
    Succeeded {
        from_cache: bool,
    },
    Failed {
        error: FetchError,
        attempts: u32,
    },
    Cancelled,
}

impl Status {
    pub fn phase(&self) -> Phase {
        match self {
            Status::Idle => Phase::Idle,
            Status::InFlight { .. } => Phase::InFlight,
            Status::Retrying { .. } => Phase::Retrying,
            Status::Succeeded { .. } => Phase::Succeeded,
            Status::Failed { .. } => Phase::Failed,
            Status::Cancelled => Phase::Cancelled,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Status::Succeeded { .. } | Status::Failed { .. } | Status::Cancelled
        )
    }

    pub fn is_outstanding(&self) -> bool {
        matches!(self, Status::InFlight { .. } | Status::Retrying { .. })
    }
}

/// Presentation-facing snapshot of where a session stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Progress {
    pub phase: Phase,
    pub attempt: Option<u32>,
    pub max_attempts: u32,
    pub message: Option<String>,
}

impl Progress {
    fn from_status(status: &Status, max_attempts: u32) -> Self {
        let reconnecting = |attempt: u32| format!("Reconnecting... (Attempt {attempt}/{max_attempts})");
        let (attempt, message) = match status {
            Status::Idle | Status::Cancelled | Status::Succeeded { .. } => (None, None),
            Status::InFlight { attempt } if *attempt <= 1 => {
                (Some(*attempt), Some("Analyzing comments...".to_string()))
            }
            Status::InFlight { attempt } => (Some(*attempt), Some(reconnecting(*attempt))),
            Status::Retrying { next_attempt, .. } => {
                (Some(*next_attempt), Some(reconnecting(*next_attempt)))
            }
            Status::Failed { error, attempts } => (Some(*attempts), Some(error.user_message())),
        };
        Self {
            phase: status.phase(),
            attempt,
            max_attempts,
            message,
        }
    }
}

/// One retrieval sequence (including retries) for a single video.
#[derive(Debug)]
pub struct FetchSession {
    video_id: VideoId,
    attempt: u32,
    max_attempts: u32,
    status: Status,
    token: CancelToken,
    request_id: Option<u64>,
}

impl FetchSession {
    fn new(video_id: VideoId, max_attempts: u32) -> Self {
        Self {
            video_id,
            attempt: 1,
            max_attempts: max_attempts.max(1),
            status: Status::Idle,
            token: CancelToken::new(),
            request_id: None,
        }
    }

    pub fn video_id(&self) -> &VideoId {
        &self.video_id
    }

    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn status(&self) -> &Status {
        &self.status
    }

    fn cancel(&mut self) {
        self.token.cancel();
        self.request_id = None;
    }
}

/// A successfully loaded collection together with its sentiment counts.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub set: CommentSet,
    pub distribution: Distribution,
}

impl Dataset {
    pub fn new(set: CommentSet) -> Self {
        let distribution = aggregate(&set.comments);
        Self { set, distribution }
    }
}

#[derive(Default)]
pub struct Options {
    pub policy: RetryPolicy,
    pub cache: CommentCache,
}

struct Settlement {
    request_id: u64,
    video_id: VideoId,
    result: Result<CommentSet, FetchError>,
}

pub struct Controller {
    service: Arc<dyn CommentService>,
    monitor: Monitor,
    subscription: Option<Subscription>,
    policy: RetryPolicy,
    cache: CommentCache,
    response_tx: Sender<Settlement>,
    response_rx: Receiver<Settlement>,
    next_request_id: u64,
    session: Option<FetchSession>,
    dataset: Option<Dataset>,
    view: ViewState,
    last_error: Option<FetchError>,
}

impl Controller {
    pub fn new(service: Arc<dyn CommentService>, monitor: Monitor, options: Options) -> Self {
        let (response_tx, response_rx) = unbounded();
        let subscription = Some(monitor.subscribe());
        Self {
            service,
            monitor,
            subscription,
            policy: options.policy,
            cache: options.cache,
            response_tx,
            response_rx,
            next_request_id: 1,
            session: None,
            dataset: None,
            view: ViewState::new(),
            last_error: None,
        }
    }

    /// Points the view at `video_id`, superseding any session for another id.
    pub fn select(&mut self, video_id: VideoId) {
        if let Some(session) = &self.session {
            let keeps_going = session.status.is_outstanding()
                || matches!(session.status, Status::Succeeded { .. });
            if session.video_id == video_id && keeps_going {
                return;
            }
        }
        self.supersede();
        self.dataset = None;
        self.view = ViewState::new();
        self.last_error = None;

        if let Some(set) = self.cache.get(&video_id).cloned() {
            debug!("serving comments from cache - video={}", video_id);
            let mut session = FetchSession::new(video_id, self.policy.max_attempts);
            session.status = Status::Succeeded { from_cache: true };
            self.session = Some(session);
            self.apply_success(set);
            return;
        }

        self.session = Some(FetchSession::new(video_id, self.policy.max_attempts));
        self.begin();
    }

    /// User-triggered retry from `Failed`: attempt 1, fresh cancellation token,
    /// cache bypassed. Returns false when there is nothing to retry.
    pub fn retry(&mut self) -> bool {
        let failed = matches!(
            self.session.as_ref().map(|session| &session.status),
            Some(Status::Failed { .. })
        );
        if !failed {
            return false;
        }
        self.last_error = None;
        self.restart();
        true
    }

    /// Drops the cached copy of the current video and fetches it again.
    /// Returns false while a request is still outstanding.
    pub fn refresh(&mut self) -> bool {
        let video_id = match &self.session {
            Some(session) if !session.status.is_outstanding() => session.video_id.clone(),
            _ => return false,
        };
        debug!("refreshing comments - video={}", video_id);
        self.cache.invalidate(&video_id);
        self.dataset = None;
        self.last_error = None;
        self.restart();
        true
    }

    /// Cancels anything outstanding, drops cached data and releases the
    /// reachability subscription.
    pub fn teardown(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if session.status.is_outstanding() || session.status == Status::Idle {
                session.cancel();
                session.status = Status::Cancelled;
                info!("fetch session cancelled - video={}", session.video_id);
            }
        }
        self.dataset = None;
        self.cache.clear();
        if self.subscription.take().is_some() {
            debug!("controller torn down");
        }
    }

    /// Applies every settled request, reachability change and due retry.
    pub fn poll(&mut self, now: Instant) -> bool {
        let mut changed = false;
        while let Some(transition) = self
            .subscription
            .as_ref()
            .and_then(|subscription| subscription.try_next())
        {
            changed |= self.handle_transition(transition);
        }
        while let Ok(settlement) = self.response_rx.try_recv() {
            changed |= self.handle_settlement(settlement);
        }
        changed |= self.fire_due_retry(now);
        changed
    }

    /// Blocks up to `timeout` for a settlement, then polls.
    pub fn wait(&mut self, timeout: Duration) -> bool {
        let settled = match self.response_rx.recv_timeout(timeout) {
            Ok(settlement) => self.handle_settlement(settlement),
            Err(_) => false,
        };
        let polled = self.poll(Instant::now());
        settled || polled
    }

    pub fn status(&self) -> Status {
        self.session
            .as_ref()
            .map(|session| session.status.clone())
            .unwrap_or(Status::Idle)
    }

    pub fn phase(&self) -> Phase {
        self.session
            .as_ref()
            .map(|session| session.status.phase())
            .unwrap_or(Phase::Idle)
    }

    pub fn progress(&self) -> Progress {
        match &self.session {
            Some(session) => Progress::from_status(&session.status, session.max_attempts),
            None => Progress::from_status(&Status::Idle, self.policy.max_attempts),
        }
    }

    pub fn session(&self) -> Option<&FetchSession> {
        self.session.as_ref()
    }

    /// When the pending backoff timer expires, if one is running.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.session.as_ref().map(|session| &session.status) {
            Some(Status::Retrying { resume_at, .. }) => Some(*resume_at),
            _ => None,
        }
    }

    pub fn dataset(&self) -> Option<&Dataset> {
        self.dataset.as_ref()
    }

    pub fn distribution(&self) -> Distribution {
        self.dataset
            .as_ref()
            .map(|dataset| dataset.distribution)
            .unwrap_or_default()
    }

    pub fn last_error(&self) -> Option<&FetchError> {
        self.last_error.as_ref()
    }

    pub fn is_reachable(&self) -> bool {
        self.monitor.is_reachable()
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn visible(&self) -> Page<'_> {
        self.view.project(self.comments())
    }

    pub fn set_filter(&mut self, filter: Filter) {
        self.view.set_filter(filter);
    }

    pub fn set_sort(&mut self, key: SortKey) -> Result<(), ViewError> {
        let comments = self
            .dataset
            .as_ref()
            .map(|dataset| dataset.set.comments.as_slice())
            .unwrap_or(&[]);
        self.view.set_sort(key, comments)
    }

    pub fn set_page(&mut self, page: usize) {
        let comments = self
            .dataset
            .as_ref()
            .map(|dataset| dataset.set.comments.as_slice())
            .unwrap_or(&[]);
        self.view.set_page(page, comments);
    }

    pub fn next_page(&mut self) {
        self.set_page(self.view.page().saturating_add(1));
    }

    pub fn prev_page(&mut self) {
        self.set_page(self.view.page().saturating_sub(1));
    }

    fn comments(&self) -> &[crate::model::Comment] {
        self.dataset
            .as_ref()
            .map(|dataset| dataset.set.comments.as_slice())
            .unwrap_or(&[])
    }

    fn supersede(&mut self) {
        if let Some(mut session) = self.session.take() {
            if session.status.is_outstanding() {
                info!("fetch session superseded - video={}", session.video_id);
            }
            session.cancel();
        }
    }

    fn restart(&mut self) {
        if let Some(session) = self.session.as_mut() {
            session.cancel();
            session.token = CancelToken::new();
            session.attempt = 1;
        }
        self.begin();
    }

    fn begin(&mut self) {
        let reachable = self.monitor.is_reachable();
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.attempt = 1;
        if !reachable {
            warn!("network unreachable, not requesting comments - video={}", session.video_id);
            session.status = Status::Failed {
                error: FetchError::Offline,
                attempts: 0,
            };
            self.last_error = Some(FetchError::Offline);
            return;
        }
        self.dispatch();
    }

    fn dispatch(&mut self) {
        let request_id = self.next_request_id;
        self.next_request_id = self.next_request_id.wrapping_add(1);
        let Some(session) = self.session.as_mut() else {
            return;
        };
        session.request_id = Some(request_id);
        session.status = Status::InFlight {
            attempt: session.attempt,
        };
        debug!(
            "dispatching comments request - video={}, attempt={}/{}, request={}",
            session.video_id, session.attempt, session.max_attempts, request_id
        );

        let service = self.service.clone();
        let tx = self.response_tx.clone();
        let video_id = session.video_id.clone();
        let token = session.token.clone();
        thread::spawn(move || {
            let result = service.load_comments(&video_id, &token);
            let _ = tx.send(Settlement {
                request_id,
                video_id,
                result,
            });
        });
    }

    fn handle_settlement(&mut self, settlement: Settlement) -> bool {
        let Settlement {
            request_id,
            video_id,
            result,
        } = settlement;
        let Some(session) = self.session.as_mut() else {
            debug!("discarding response without session - video={}", video_id);
            return false;
        };
        let current = !session.token.is_cancelled()
            && session.request_id == Some(request_id)
            && session.video_id == video_id
            && matches!(session.status, Status::InFlight { .. });
        if !current {
            debug!(
                "discarding stale response - video={}, request={}",
                video_id, request_id
            );
            return false;
        }
        session.request_id = None;

        match result {
            Ok(set) => {
                session.status = Status::Succeeded { from_cache: false };
                session.attempt = 1;
                info!("comments loaded - video={}, comments={}", video_id, set.len());
                self.cache.insert(set.clone());
                self.apply_success(set);
            }
            Err(err) if err.is_transient() && session.attempt < session.max_attempts => {
                let delay = self.policy.delay_for(session.attempt);
                session.attempt += 1;
                warn!(
                    "comments request failed, retrying - video={}, next_attempt={}/{}, delay={:?}, error={}",
                    video_id, session.attempt, session.max_attempts, delay, err
                );
                session.status = Status::Retrying {
                    next_attempt: session.attempt,
                    delay,
                    resume_at: Instant::now() + delay,
                    cause: err,
                };
            }
            Err(err) => {
                warn!(
                    "comments request failed - video={}, attempts={}, error={}",
                    video_id, session.attempt, err
                );
                session.status = Status::Failed {
                    error: err.clone(),
                    attempts: session.attempt,
                };
                self.last_error = Some(err);
            }
        }
        true
    }

    fn handle_transition(&mut self, transition: Transition) -> bool {
        match transition {
            Transition::WentOffline => {
                let Some(session) = self.session.as_mut() else {
                    return false;
                };
                if !session.status.is_outstanding() {
                    return false;
                }
                warn!("network lost mid-session - video={}", session.video_id);
                session.cancel();
                session.status = Status::Failed {
                    error: FetchError::Offline,
                    attempts: session.attempt,
                };
                self.last_error = Some(FetchError::Offline);
                true
            }
            Transition::WentOnline => {
                let stale = self
                    .last_error
                    .as_ref()
                    .is_some_and(FetchError::is_connectivity);
                if !stale {
                    return false;
                }
                self.last_error = None;
                let resumable = matches!(
                    self.session.as_ref().map(|session| &session.status),
                    Some(Status::Failed {
                        error: FetchError::Offline,
                        ..
                    })
                );
                if resumable {
                    info!("network back, resuming fetch");
                    self.restart();
                }
                true
            }
        }
    }

    fn fire_due_retry(&mut self, now: Instant) -> bool {
        let due = matches!(
            self.session.as_ref().map(|session| &session.status),
            Some(Status::Retrying { resume_at, .. }) if now >= *resume_at
        );
        if !due {
            return false;
        }
        if !self.monitor.is_reachable() {
            if let Some(session) = self.session.as_mut() {
                session.cancel();
                session.status = Status::Failed {
                    error: FetchError::Offline,
                    attempts: session.attempt.saturating_sub(1),
                };
            }
            self.last_error = Some(FetchError::Offline);
            return true;
        }
        self.dispatch();
        true
    }

    fn apply_success(&mut self, set: CommentSet) {
        let dataset = Dataset::new(set);
        if let Some(reported) = &dataset.set.reported_stats {
            let mismatched = dataset.distribution.mismatches(reported);
            if !mismatched.is_empty() {
                warn!(
                    "server sentiment stats disagree with comments - video={}, labels={:?}",
                    dataset.set.video_id, mismatched
                );
            }
        }
        self.view.rebase(&dataset.set.comments);
        self.dataset = Some(dataset);
        self.last_error = None;
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.teardown();
    }
}
