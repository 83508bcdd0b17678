//! Lifecycle and locking around the section tracker.
//!
//! The controller is the public surface of the crate. `start` publishes a
//! fresh [`TrackingState`] and scans history on a background thread; posts
//! that arrive meanwhile are buffered and replayed in arrival order once the
//! scan lands. `stop` only unpublishes the state, so it is always quick. Any
//! background work still holding the old state keeps running against an
//! orphan, and every externally visible effect first checks that its state is
//! still the published one.
//!
//! Lock order: the slot lock (which state is live) is never held while a
//! state lock is taken, and it is only held for flag checks and pointer swaps.

use crate::activity::{create_shared_log, SharedActivityLog};
use crate::clock::{Clock, SystemClock};
use crate::config::{ConfigError, NotifySettings};
use crate::core::{NotifyTrigger, PostOutcome, SectionEstimate, SectionFinder, SectionTracker};
use crate::notifier::{format_release, Notifier};
use crate::post::Post;
use crate::provider::{HistoryError, HistoryProvider, IdentityCheck, NotifyAction, NotifyError};
use crate::status::Status;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use serde::Serialize;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Per-observer event buffer.
const EVENT_CHANNEL_CAPACITY: usize = 1_024;

/// Why a bootstrap did not produce a live section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BootstrapError {
    /// History could not be fetched; the controller stopped
    HistoryFetch(HistoryError),
    /// The controller was stopped or restarted before the scan finished
    Superseded,
}

impl std::fmt::Display for BootstrapError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BootstrapError::HistoryFetch(e) => write!(f, "Bootstrap failed: {e}"),
            BootstrapError::Superseded => {
                write!(f, "Bootstrap result discarded: tracking was stopped")
            }
        }
    }
}

impl std::error::Error for BootstrapError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            BootstrapError::HistoryFetch(e) => Some(e),
            BootstrapError::Superseded => None,
        }
    }
}

/// Events broadcast to every subscriber.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrackerEvent {
    BootstrapSucceeded {
        tracking_id: Uuid,
        accurate: bool,
        post_count: usize,
    },
    BootstrapFailed {
        tracking_id: Uuid,
        error: HistoryError,
    },
    Notified {
        tracking_id: Uuid,
        post_count: usize,
        message: String,
    },
    NotifyFailed {
        tracking_id: Uuid,
        error: NotifyError,
    },
}

/// Lifecycle phase of the controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Stopped,
    Bootstrapping,
    Tracking,
}

/// Everything that belongs to one start of the controller. Replaced, never
/// reset, on restart.
struct TrackingState {
    id: Uuid,
    inner: Mutex<TrackingInner>,
}

struct TrackingInner {
    tracker: SectionTracker,
    buffered: Vec<Post>,
    bootstrapping: bool,
}

impl TrackingState {
    fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            inner: Mutex::new(TrackingInner {
                tracker: SectionTracker::new(),
                buffered: Vec::new(),
                bootstrapping: true,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackingInner> {
        lock(&self.inner)
    }
}

struct Shared {
    history: Arc<dyn HistoryProvider>,
    identity: Arc<dyn IdentityCheck>,
    notifier: Notifier,
    clock: Arc<dyn Clock>,
    finder: SectionFinder,
    settings: RwLock<NotifySettings>,
    /// The live tracking state; `None` while stopped
    slot: Mutex<Option<Arc<TrackingState>>>,
    observers: Mutex<Vec<Sender<TrackerEvent>>>,
    activity: SharedActivityLog,
}

/// Builder for [`Controller`].
pub struct ControllerBuilder {
    history: Arc<dyn HistoryProvider>,
    identity: Arc<dyn IdentityCheck>,
    action: Arc<dyn NotifyAction>,
    clock: Arc<dyn Clock>,
    finder: SectionFinder,
    settings: NotifySettings,
    activity: Option<SharedActivityLog>,
}

impl ControllerBuilder {
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn finder(mut self, finder: SectionFinder) -> Self {
        self.finder = finder;
        self
    }

    pub fn settings(mut self, settings: NotifySettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn activity_log(mut self, activity: SharedActivityLog) -> Self {
        self.activity = Some(activity);
        self
    }

    pub fn build(self) -> Result<Controller, ConfigError> {
        self.settings.validate()?;

        Ok(Controller {
            shared: Arc::new(Shared {
                history: self.history,
                identity: self.identity,
                notifier: Notifier::new(self.action),
                clock: self.clock,
                finder: self.finder,
                settings: RwLock::new(self.settings),
                slot: Mutex::new(None),
                observers: Mutex::new(Vec::new()),
                activity: self.activity.unwrap_or_else(create_shared_log),
            }),
        })
    }
}

/// Single-account update limit tracker.
///
/// Cloning yields another handle to the same controller.
#[derive(Clone)]
pub struct Controller {
    shared: Arc<Shared>,
}

impl Controller {
    /// Start building a controller around its three collaborators.
    pub fn builder(
        history: Arc<dyn HistoryProvider>,
        identity: Arc<dyn IdentityCheck>,
        action: Arc<dyn NotifyAction>,
    ) -> ControllerBuilder {
        ControllerBuilder {
            history,
            identity,
            action,
            clock: Arc::new(SystemClock),
            finder: SectionFinder::default(),
            settings: NotifySettings::default(),
            activity: None,
        }
    }

    /// Start tracking. Returns `false` (and does nothing) if already started.
    pub fn start(&self) -> bool {
        self.start_with(|_| {})
    }

    /// Start tracking and call `on_complete` with the bootstrap outcome.
    ///
    /// Returns immediately. When already started, no bootstrap is launched,
    /// `on_complete` is called with `Ok(())` on the calling thread and `false`
    /// is returned.
    pub fn start_with<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce(Result<(), BootstrapError>) + Send + 'static,
    {
        let launched = {
            let mut slot = lock(&self.shared.slot);
            if slot.is_some() {
                None
            } else {
                let state = Arc::new(TrackingState::new());
                *slot = Some(Arc::clone(&state));
                Some(state)
            }
        };
        let Some(state) = launched else {
            on_complete(Ok(()));
            return false;
        };

        info!(tracking_id = %state.id, "tracking started, scanning history");

        let shared = Arc::clone(&self.shared);
        thread::spawn(move || {
            let result = shared.bootstrap(&state);
            on_complete(result);
        });

        true
    }

    /// Start tracking and wait for the bootstrap to finish.
    ///
    /// Returns `Ok(())` right away if tracking was already started.
    pub fn start_blocking(&self) -> Result<(), BootstrapError> {
        let (tx, rx) = bounded(1);
        let launched = self.start_with(move |result| {
            let _ = tx.send(result);
        });
        if !launched {
            return Ok(());
        }
        rx.recv().unwrap_or(Err(BootstrapError::Superseded))
    }

    /// Stop tracking and discard all section state.
    pub fn stop(&self) {
        let previous = lock(&self.shared.slot).take();
        if let Some(state) = previous {
            info!(tracking_id = %state.id, "tracking stopped");
        }
    }

    /// Stop, then start with a fresh history scan.
    pub fn restart(&self) -> bool {
        self.stop();
        self.start()
    }

    pub fn restart_with<F>(&self, on_complete: F) -> bool
    where
        F: FnOnce(Result<(), BootstrapError>) + Send + 'static,
    {
        self.stop();
        self.start_with(on_complete)
    }

    pub fn restart_blocking(&self) -> Result<(), BootstrapError> {
        self.stop();
        self.start_blocking()
    }

    /// The connected account changed: rebuild everything for the new one.
    pub fn on_account_changed(&self) {
        info!("account changed, restarting tracking");
        self.restart();
    }

    /// Feed one observed post. Never fails; unrelated posts are ignored.
    pub fn on_external_post(&self, post: &Post) {
        let Some(state) = self.shared.current() else {
            return;
        };
        self.shared.activity.record_post_received();

        let trigger = {
            let mut inner = state.lock();
            if inner.bootstrapping {
                inner.buffered.push(post.clone());
                self.shared.activity.record_post_buffered();
                debug!(post_id = post.id, "bootstrap running, post buffered");
                None
            } else {
                let threshold = self.shared.threshold();
                self.shared.apply(&mut inner.tracker, post, threshold)
            }
        };

        if let Some(trigger) = trigger {
            self.shared.dispatch_notify(&state, trigger);
        }
    }

    /// Swap in new notification settings without touching the section.
    ///
    /// A changed threshold re-arms the notify latch of the current section.
    pub fn change_settings(&self, settings: NotifySettings) -> Result<(), ConfigError> {
        settings.validate()?;

        let threshold_changed = {
            let mut current = self
                .shared
                .settings
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let changed = current.notify_threshold != settings.notify_threshold;
            *current = settings;
            changed
        };

        if threshold_changed {
            if let Some(state) = self.shared.current() {
                state.lock().tracker.reset_notified();
                debug!(tracking_id = %state.id, "threshold changed, notify latch re-armed");
            }
        }
        Ok(())
    }

    pub fn settings(&self) -> NotifySettings {
        self.shared.settings()
    }

    pub fn is_started(&self) -> bool {
        lock(&self.shared.slot).is_some()
    }

    pub fn phase(&self) -> Phase {
        match self.shared.current() {
            None => Phase::Stopped,
            Some(state) if state.lock().bootstrapping => Phase::Bootstrapping,
            Some(_) => Phase::Tracking,
        }
    }

    /// Consistent copy of the current state.
    pub fn snapshot(&self) -> Status {
        let Some(state) = self.shared.current() else {
            return Status::stopped();
        };
        let settings = self.shared.settings();
        let now = self.shared.clock.now();

        let inner = state.lock();
        let section = inner.tracker.section();
        let release = section.release_at();

        Status {
            started: true,
            bootstrapping: inner.bootstrapping,
            accurate: section.accurate,
            already_notified: inner.tracker.has_notified(),
            section_start_post: section.start_post.clone(),
            post_count_in_section: inner.tracker.post_count(),
            boundary_time: section.boundary_time,
            release_instant: release,
            section_open: section.is_open_at(now),
            release_instant_formatted: release.and_then(|r| format_release(r, &settings).ok()),
            buffered_posts: inner.buffered.len(),
            tracking_id: Some(state.id),
        }
    }

    /// Register an observer. Every observer gets every event.
    pub fn subscribe(&self) -> Receiver<TrackerEvent> {
        let (tx, rx) = bounded(EVENT_CHANNEL_CAPACITY);
        lock(&self.shared.observers).push(tx);
        rx
    }

    pub fn activity(&self) -> SharedActivityLog {
        Arc::clone(&self.shared.activity)
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("phase", &self.phase())
            .finish_non_exhaustive()
    }
}

impl Shared {
    fn current(&self) -> Option<Arc<TrackingState>> {
        lock(&self.slot).clone()
    }

    fn is_live(&self, state: &Arc<TrackingState>) -> bool {
        lock(&self.slot)
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, state))
    }

    fn settings(&self) -> NotifySettings {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn threshold(&self) -> usize {
        self.settings
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .notify_threshold
    }

    /// Run on the bootstrap thread.
    fn bootstrap(self: &Arc<Self>, state: &Arc<TrackingState>) -> Result<(), BootstrapError> {
        let now = self.clock.now();
        let page = match self.history.fetch_recent(self.finder.page_size(), 0) {
            Ok(page) => page,
            Err(error) => {
                self.fail_bootstrap(state, &error);
                return Err(BootstrapError::HistoryFetch(error));
            }
        };

        let estimate = self.finder.find(&page, now);
        self.complete_bootstrap(state, estimate)
    }

    fn complete_bootstrap(
        self: &Arc<Self>,
        state: &Arc<TrackingState>,
        estimate: SectionEstimate,
    ) -> Result<(), BootstrapError> {
        // Outcomes are only accounted for once the state is known to be live.
        let (replayed, accurate, post_count) = {
            let mut inner = state.lock();
            inner.tracker.apply_estimate(estimate);
            inner.bootstrapping = false;

            let threshold = self.threshold();
            let buffered = std::mem::take(&mut inner.buffered);
            let replayed: Vec<(Post, PostOutcome)> = buffered
                .into_iter()
                .map(|post| {
                    let outcome = inner.tracker.check_post(&post, self.identity.as_ref(), threshold);
                    (post, outcome)
                })
                .collect();

            (
                replayed,
                inner.tracker.section().accurate,
                inner.tracker.post_count(),
            )
        };

        if !self.is_live(state) {
            debug!(tracking_id = %state.id, "bootstrap finished after stop, result discarded");
            return Err(BootstrapError::Superseded);
        }

        let replayed_count = replayed.len();
        let triggers: Vec<NotifyTrigger> = replayed
            .into_iter()
            .filter_map(|(post, outcome)| self.record_outcome(&post, outcome))
            .collect();

        self.activity.record_bootstrap(true);
        info!(
            tracking_id = %state.id,
            accurate,
            post_count,
            replayed = replayed_count,
            "bootstrap complete"
        );
        self.emit(TrackerEvent::BootstrapSucceeded {
            tracking_id: state.id,
            accurate,
            post_count,
        });

        for trigger in triggers {
            self.dispatch_notify(state, trigger);
        }
        Ok(())
    }

    /// Stop, but only if the failed scan belongs to the live state.
    fn fail_bootstrap(&self, state: &Arc<TrackingState>, error: &HistoryError) {
        let was_live = {
            let mut slot = lock(&self.slot);
            let live = slot
                .as_ref()
                .is_some_and(|current| Arc::ptr_eq(current, state));
            if live {
                *slot = None;
            }
            live
        };

        if !was_live {
            debug!(tracking_id = %state.id, error = %error, "stale bootstrap failed");
            return;
        }

        self.activity.record_bootstrap(false);
        warn!(tracking_id = %state.id, error = %error, "bootstrap failed, tracking stopped");
        self.emit(TrackerEvent::BootstrapFailed {
            tracking_id: state.id,
            error: error.clone(),
        });
    }

    /// Run one post through the tracker and account for the outcome.
    fn apply(
        &self,
        tracker: &mut SectionTracker,
        post: &Post,
        threshold: usize,
    ) -> Option<NotifyTrigger> {
        let outcome = tracker.check_post(post, self.identity.as_ref(), threshold);
        self.record_outcome(post, outcome)
    }

    /// Count and log one tracker outcome, handing back its trigger if any.
    fn record_outcome(&self, post: &Post, outcome: PostOutcome) -> Option<NotifyTrigger> {
        match &outcome {
            PostOutcome::Rejected(reason) => {
                self.activity.record_post_rejected();
                debug!(post_id = post.id, ?reason, "post rejected");
            }
            PostOutcome::Counted { post_count } => {
                self.activity.record_post_counted();
                debug!(post_id = post.id, post_count, "post counted");
            }
            PostOutcome::RolledOver { evicted } => {
                self.activity.record_post_counted();
                self.activity.record_rollover();
                info!(post_id = post.id, evicted, "new section started");
            }
            PostOutcome::Triggered(trigger) => {
                self.activity.record_post_counted();
                info!(
                    post_id = post.id,
                    post_count = trigger.post_count,
                    "notify threshold reached"
                );
            }
        }
        outcome.into_trigger()
    }

    /// Send the notification on a worker thread. The latch is already set.
    fn dispatch_notify(self: &Arc<Self>, state: &Arc<TrackingState>, trigger: NotifyTrigger) {
        let shared = Arc::clone(self);
        let state = Arc::clone(state);
        let settings = self.settings();

        thread::spawn(move || {
            if !shared.is_live(&state) {
                debug!(tracking_id = %state.id, "tracking stopped, notification suppressed");
                return;
            }

            match shared.notifier.notify(&trigger, &settings) {
                Ok(message) => {
                    shared.activity.record_notification(true);
                    info!(tracking_id = %state.id, post_count = trigger.post_count, "notification sent");
                    shared.emit(TrackerEvent::Notified {
                        tracking_id: state.id,
                        post_count: trigger.post_count,
                        message,
                    });
                }
                Err(error) => {
                    shared.activity.record_notification(false);
                    warn!(tracking_id = %state.id, error = %error, "notification failed");
                    shared.emit(TrackerEvent::NotifyFailed {
                        tracking_id: state.id,
                        error,
                    });
                }
            }
        });
    }

    fn emit(&self, event: TrackerEvent) {
        let mut observers = lock(&self.observers);
        observers.retain(|tx| match tx.try_send(event.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("event observer is not keeping up, event dropped");
                true
            }
            Err(TrySendError::Disconnected(_)) => false,
        });
    }
}

/// Lock, recovering the data if another thread panicked while holding it.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
