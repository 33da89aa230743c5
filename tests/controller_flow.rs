use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{TimeZone, Utc};
use crossbeam_channel::{bounded, Receiver, Sender};
use parking_lot::Mutex;
use yt_sentiment::cache::CommentCache;
use yt_sentiment::controller::{Controller, Options, Phase, RetryPolicy, Status};
use yt_sentiment::data::{CancelToken, CommentService};
use yt_sentiment::error::FetchError;
use yt_sentiment::model::{Comment, CommentSet, Sentiment};
use yt_sentiment::reachability::Monitor;
use yt_sentiment::video_id::VideoId;
use yt_sentiment::view::{Filter, PAGE_SIZE};

type Outcome = Result<CommentSet, FetchError>;

enum Step {
    Reply(Outcome),
    /// Blocks the worker until the test releases it.
    Gate(Receiver<Outcome>),
}

#[derive(Default)]
struct Scripted {
    steps: Mutex<HashMap<String, VecDeque<Step>>>,
    calls: Mutex<HashMap<String, usize>>,
}

impl Scripted {
    fn push(&self, id: &VideoId, step: Step) {
        self.steps
            .lock()
            .entry(id.to_string())
            .or_default()
            .push_back(step);
    }

    fn reply(&self, id: &VideoId, outcome: Outcome) {
        self.push(id, Step::Reply(outcome));
    }

    fn gate(&self, id: &VideoId) -> Sender<Outcome> {
        let (tx, rx) = bounded(1);
        self.push(id, Step::Gate(rx));
        tx
    }

    fn calls(&self, id: &VideoId) -> usize {
        self.calls.lock().get(id.as_str()).copied().unwrap_or(0)
    }
}

impl CommentService for Scripted {
    fn load_comments(&self, video_id: &VideoId, _cancel: &CancelToken) -> Outcome {
        *self.calls.lock().entry(video_id.to_string()).or_default() += 1;
        let step = self
            .steps
            .lock()
            .get_mut(video_id.as_str())
            .and_then(VecDeque::pop_front);
        match step {
            Some(Step::Reply(outcome)) => outcome,
            Some(Step::Gate(rx)) => rx
                .recv()
                .unwrap_or_else(|_| Err(FetchError::Transient("gate dropped".into()))),
            None => Err(FetchError::Transient("script exhausted".into())),
        }
    }
}

fn id(raw: &str) -> VideoId {
    VideoId::new(raw).expect("valid id")
}

fn set(video: &VideoId, count: usize) -> CommentSet {
    let comments = (0..count)
        .map(|idx| Comment {
            author: format!("user{idx}"),
            text: format!("comment {idx}"),
            published_at: Utc
                .timestamp_opt(1_700_000_000 + idx as i64, 0)
                .single()
                .unwrap(),
            like_count: idx as u64,
            sentiment: if idx % 2 == 0 {
                Sentiment::Positive
            } else {
                Sentiment::Negative
            },
            scores: None,
        })
        .collect();
    CommentSet::new(video.clone(), comments)
}

fn transient() -> Outcome {
    Err(FetchError::Transient("connection reset".into()))
}

fn controller(service: &Arc<Scripted>, monitor: &Monitor) -> Controller {
    Controller::new(
        service.clone(),
        monitor.clone(),
        Options {
            policy: RetryPolicy::default(),
            cache: CommentCache::default(),
        },
    )
}

/// Waits until the current request settles.
fn settle(controller: &mut Controller) -> Status {
    for _ in 0..300 {
        controller.wait(Duration::from_millis(10));
        let status = controller.status();
        if !matches!(status, Status::InFlight { .. }) {
            return status;
        }
    }
    panic!("request never settled: {:?}", controller.status());
}

/// Gives stray worker threads time to report back.
fn drain(controller: &mut Controller) {
    for _ in 0..10 {
        controller.wait(Duration::from_millis(10));
    }
}

fn fire_backoff(controller: &mut Controller) {
    let deadline = controller.next_deadline().expect("retry pending");
    controller.poll(deadline);
}

#[test]
fn transient_failures_back_off_then_fail_and_manual_retry_restarts() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    service.reply(&video, transient());
    service.reply(&video, transient());
    service.reply(&video, transient());
    service.reply(&video, Ok(set(&video, 3)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    assert_eq!(controller.status(), Status::InFlight { attempt: 1 });
    assert_eq!(
        controller.progress().message.as_deref(),
        Some("Analyzing comments...")
    );

    match settle(&mut controller) {
        Status::Retrying {
            next_attempt,
            delay,
            ..
        } => {
            assert_eq!(next_attempt, 2);
            assert_eq!(delay, Duration::from_millis(2000));
        }
        other => panic!("expected retry, got {other:?}"),
    }
    assert_eq!(
        controller.progress().message.as_deref(),
        Some("Reconnecting... (Attempt 2/3)")
    );

    // Not due yet.
    controller.poll(Instant::now());
    assert_eq!(controller.phase(), Phase::Retrying);
    assert_eq!(service.calls(&video), 1);

    fire_backoff(&mut controller);
    assert_eq!(controller.status(), Status::InFlight { attempt: 2 });
    match settle(&mut controller) {
        Status::Retrying {
            next_attempt,
            delay,
            ..
        } => {
            assert_eq!(next_attempt, 3);
            assert_eq!(delay, Duration::from_millis(4000));
        }
        other => panic!("expected retry, got {other:?}"),
    }

    fire_backoff(&mut controller);
    match settle(&mut controller) {
        Status::Failed { error, attempts } => {
            assert!(error.is_transient());
            assert_eq!(attempts, 3);
        }
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(service.calls(&video), 3);
    assert_eq!(
        controller.progress().message.as_deref(),
        Some("Failed to connect to the server")
    );
    assert!(controller.next_deadline().is_none());
    assert!(controller.last_error().is_some());

    assert!(controller.retry());
    assert_eq!(controller.status(), Status::InFlight { attempt: 1 });
    assert!(controller.last_error().is_none());
    assert_eq!(settle(&mut controller), Status::Succeeded { from_cache: false });
    assert_eq!(service.calls(&video), 4);
    assert_eq!(controller.distribution().total(), 3);
    assert!(!controller.retry());
}

#[test]
fn server_errors_fail_without_retrying() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    service.reply(
        &video,
        Err(FetchError::Server {
            status: 404,
            message: "Video not found".into(),
        }),
    );
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    match settle(&mut controller) {
        Status::Failed { attempts, .. } => assert_eq!(attempts, 1),
        other => panic!("expected failure, got {other:?}"),
    }
    assert_eq!(service.calls(&video), 1);
    assert_eq!(
        controller.progress().message.as_deref(),
        Some("Video not found")
    );
}

#[test]
fn switching_videos_discards_the_stale_attempt() {
    let first = id("aaaaaaaaaaa");
    let second = id("bbbbbbbbbbb");
    let service = Arc::new(Scripted::default());
    service.reply(&first, transient());
    let release_first = service.gate(&first);
    service.reply(&second, Ok(set(&second, 2)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(first.clone());
    settle(&mut controller);
    fire_backoff(&mut controller);
    assert_eq!(controller.status(), Status::InFlight { attempt: 2 });

    controller.select(second.clone());
    assert_eq!(settle(&mut controller), Status::Succeeded { from_cache: false });

    release_first.send(Ok(set(&first, 9))).unwrap();
    drain(&mut controller);

    let dataset = controller.dataset().expect("dataset");
    assert_eq!(dataset.set.video_id, second);
    assert_eq!(dataset.distribution.total(), 2);
    assert_eq!(controller.session().unwrap().video_id(), &second);
    assert_eq!(service.calls(&first), 2);
}

#[test]
fn losing_the_network_mid_session_fails_then_resumes() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    let release = service.gate(&video);
    service.reply(&video, Ok(set(&video, 4)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    assert_eq!(controller.phase(), Phase::InFlight);

    monitor.set_reachable(false);
    controller.poll(Instant::now());
    assert_eq!(
        controller.status(),
        Status::Failed {
            error: FetchError::Offline,
            attempts: 1
        }
    );
    assert_eq!(controller.last_error(), Some(&FetchError::Offline));

    // The in-flight answer arrives after cancellation and is ignored.
    release.send(Ok(set(&video, 1))).unwrap();
    drain(&mut controller);
    assert_eq!(controller.phase(), Phase::Failed);
    assert!(controller.dataset().is_none());
    assert_eq!(service.calls(&video), 1);

    monitor.set_reachable(true);
    controller.poll(Instant::now());
    assert!(controller.last_error().is_none());
    assert_eq!(controller.status(), Status::InFlight { attempt: 1 });
    assert_eq!(settle(&mut controller), Status::Succeeded { from_cache: false });
    assert_eq!(controller.distribution().total(), 4);
    assert_eq!(service.calls(&video), 2);
}

#[test]
fn selecting_while_offline_issues_no_request() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    let monitor = Monitor::new(false);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    assert_eq!(
        controller.status(),
        Status::Failed {
            error: FetchError::Offline,
            attempts: 0
        }
    );
    assert_eq!(
        controller.progress().message.as_deref(),
        Some("No internet connection. Please check your network.")
    );
    drain(&mut controller);
    assert_eq!(service.calls(&video), 0);
}

#[test]
fn going_offline_during_backoff_fails_immediately() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    service.reply(&video, transient());
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    assert_eq!(controller.phase(), Phase::InFlight);
    settle(&mut controller);
    assert_eq!(controller.phase(), Phase::Retrying);

    monitor.set_reachable(false);
    controller.poll(Instant::now());
    assert_eq!(controller.phase(), Phase::Failed);
    assert_eq!(controller.last_error(), Some(&FetchError::Offline));
    assert_eq!(service.calls(&video), 1);
}

#[test]
fn revisiting_a_video_uses_the_cache() {
    let first = id("aaaaaaaaaaa");
    let second = id("bbbbbbbbbbb");
    let service = Arc::new(Scripted::default());
    service.reply(&first, Ok(set(&first, 5)));
    service.reply(&second, Ok(set(&second, 1)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(first.clone());
    settle(&mut controller);
    // Same id again is a no-op while the data is showing.
    controller.select(first.clone());
    assert_eq!(controller.status(), Status::Succeeded { from_cache: false });

    controller.select(second.clone());
    settle(&mut controller);
    controller.select(first.clone());
    assert_eq!(controller.status(), Status::Succeeded { from_cache: true });
    assert_eq!(controller.distribution().total(), 5);
    assert_eq!(service.calls(&first), 1);
}

#[test]
fn view_state_pages_through_loaded_comments() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    service.reply(&video, Ok(set(&video, 250)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    settle(&mut controller);

    let page = controller.visible();
    assert_eq!(page.items.len(), PAGE_SIZE);
    assert_eq!(page.total_pages, 3);

    controller.set_page(3);
    assert_eq!(controller.visible().items.len(), 50);
    controller.next_page();
    assert_eq!(controller.view().page(), 3);

    controller.set_filter(Filter::Only(Sentiment::Negative));
    assert_eq!(controller.view().page(), 1);
    let page = controller.visible();
    assert_eq!(page.filtered_count, 125);
    assert_eq!(page.total_pages, 2);
    assert!(page
        .items
        .iter()
        .all(|comment| comment.sentiment == Sentiment::Negative));
}

#[test]
fn teardown_cancels_and_releases_the_subscription() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    let release = service.gate(&video);
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);
    assert_eq!(monitor.subscriber_count(), 1);

    controller.select(video.clone());
    controller.teardown();
    assert_eq!(controller.status(), Status::Cancelled);
    assert_eq!(monitor.subscriber_count(), 0);

    release.send(Ok(set(&video, 2))).unwrap();
    drain(&mut controller);
    assert_eq!(controller.status(), Status::Cancelled);
    assert!(controller.dataset().is_none());

    monitor.set_reachable(false);
    monitor.set_reachable(true);
    controller.poll(Instant::now());
    assert_eq!(controller.status(), Status::Cancelled);
}

#[test]
fn dropping_the_controller_releases_the_subscription() {
    let service = Arc::new(Scripted::default());
    let monitor = Monitor::new(true);
    let controller = controller(&service, &monitor);
    assert_eq!(monitor.subscriber_count(), 1);
    drop(controller);
    assert_eq!(monitor.subscriber_count(), 0);
}

#[test]
fn refresh_skips_the_cache_and_refetches() {
    let first = id("aaaaaaaaaaa");
    let second = id("bbbbbbbbbbb");
    let service = Arc::new(Scripted::default());
    service.reply(&first, Ok(set(&first, 2)));
    let release = service.gate(&first);
    service.reply(&second, Ok(set(&second, 1)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(first.clone());
    settle(&mut controller);

    assert!(controller.refresh());
    assert_eq!(controller.status(), Status::InFlight { attempt: 1 });
    assert!(controller.dataset().is_none());
    assert!(!controller.refresh());

    release.send(Ok(set(&first, 6))).unwrap();
    assert_eq!(settle(&mut controller), Status::Succeeded { from_cache: false });
    assert_eq!(controller.distribution().total(), 6);
    assert_eq!(service.calls(&first), 2);

    // The refetched copy replaced the old cache entry.
    controller.select(second.clone());
    settle(&mut controller);
    controller.select(first.clone());
    assert_eq!(controller.status(), Status::Succeeded { from_cache: true });
    assert_eq!(controller.distribution().total(), 6);
}

#[test]
fn teardown_drops_cached_comments() {
    let video = id("dQw4w9WgXcQ");
    let service = Arc::new(Scripted::default());
    service.reply(&video, Ok(set(&video, 2)));
    service.reply(&video, Ok(set(&video, 2)));
    let monitor = Monitor::new(true);
    let mut controller = controller(&service, &monitor);

    controller.select(video.clone());
    settle(&mut controller);
    controller.teardown();

    controller.select(video.clone());
    assert_eq!(controller.status(), Status::InFlight { attempt: 1 });
    assert_eq!(settle(&mut controller), Status::Succeeded { from_cache: false });
    assert_eq!(service.calls(&video), 2);
}
