// Shared fakes for the integration tests.
#![allow(dead_code)]

use chrono::{DateTime, Local, TimeZone};
use dailylist::agent::{AgentMessage, NotificationDispatch};
use dailylist::alert::{AlertBackend, AlertPlayer, EndCallback, Playback};
use dailylist::context::TestContext;
use dailylist::controller::TaskController;
use dailylist::model::Task;
use dailylist::permission::{Permission, PermissionGate, PermissionHost, UserNotice};
use dailylist::scheduler::{ReminderScheduler, ReminderStyle};
use dailylist::storage::LocalStore;
use dailylist::timer::ManualClock;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Midday in June, clear of DST transitions in most zones.
pub fn start() -> DateTime<Local> {
    Local.with_ymd_and_hms(2030, 6, 1, 12, 0, 0).unwrap()
}

pub fn minutes(n: i64) -> chrono::Duration {
    chrono::Duration::minutes(n)
}

/// A reminder-bearing task due at `at`.
pub fn task_at(id: &str, title: &str, at: DateTime<Local>) -> Task {
    let mut task = Task::new(title, Some(at.date_naive()), Some(at.time()), true);
    task.id = id.to_string();
    task
}

#[derive(Default)]
pub struct RecordingDispatch {
    messages: Mutex<Vec<AgentMessage>>,
}

impl RecordingDispatch {
    pub fn messages(&self) -> Vec<AgentMessage> {
        self.messages.lock().unwrap().clone()
    }

    pub fn tags(&self) -> Vec<String> {
        self.messages().iter().map(|m| m.tag().to_string()).collect()
    }
}

impl NotificationDispatch for RecordingDispatch {
    fn dispatch(&self, message: AgentMessage) {
        self.messages.lock().unwrap().push(message);
    }
}

struct FakePlayback {
    stops: Arc<AtomicUsize>,
}

impl Playback for FakePlayback {
    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// Sound backend that never ends on its own until `finish_all` is called.
#[derive(Default)]
pub struct FakeBackend {
    pub plays: AtomicUsize,
    pub stops: Arc<AtomicUsize>,
    pub fail: AtomicBool,
    pub vibration: bool,
    pub vibrations: Mutex<Vec<Vec<u64>>>,
    endings: Mutex<Vec<EndCallback>>,
}

impl FakeBackend {
    pub fn with_vibration() -> Self {
        Self {
            vibration: true,
            ..Self::default()
        }
    }

    /// Simulates every started sound reaching its natural end.
    pub fn finish_all(&self) {
        let endings: Vec<EndCallback> = self.endings.lock().unwrap().drain(..).collect();
        for end in endings {
            end();
        }
    }
}

impl AlertBackend for FakeBackend {
    fn play(&self, on_end: EndCallback) -> anyhow::Result<Box<dyn Playback>> {
        if self.fail.load(Ordering::SeqCst) {
            anyhow::bail!("autoplay blocked");
        }
        self.plays.fetch_add(1, Ordering::SeqCst);
        self.endings.lock().unwrap().push(on_end);
        Ok(Box::new(FakePlayback {
            stops: Arc::clone(&self.stops),
        }))
    }

    fn supports_vibration(&self) -> bool {
        self.vibration
    }

    fn vibrate(&self, pattern: &[u64]) -> anyhow::Result<()> {
        self.vibrations.lock().unwrap().push(pattern.to_vec());
        Ok(())
    }
}

/// A scheduler on a simulated clock with recording collaborators.
pub struct Harness {
    pub clock: Arc<ManualClock>,
    pub dispatch: Arc<RecordingDispatch>,
    pub backend: Arc<FakeBackend>,
    pub player: AlertPlayer,
    pub scheduler: ReminderScheduler,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_backend(FakeBackend::default())
    }

    pub fn with_backend(backend: FakeBackend) -> Self {
        let clock = Arc::new(ManualClock::new(start()));
        let dispatch = Arc::new(RecordingDispatch::default());
        let backend = Arc::new(backend);
        let player = AlertPlayer::new(backend.clone());
        let scheduler = ReminderScheduler::new(
            clock.clone(),
            dispatch.clone(),
            player.clone(),
            ReminderStyle::default(),
        );
        Self {
            clock,
            dispatch,
            backend,
            player,
            scheduler,
        }
    }
}

pub struct FakeHost {
    pub supported: bool,
    pub answer: Permission,
    pub requests: AtomicUsize,
}

impl FakeHost {
    pub fn answering(answer: Permission) -> Self {
        Self {
            supported: true,
            answer,
            requests: AtomicUsize::new(0),
        }
    }

    pub fn unsupported() -> Self {
        Self {
            supported: false,
            answer: Permission::Granted,
            requests: AtomicUsize::new(0),
        }
    }
}

impl PermissionHost for FakeHost {
    fn supports_notifications(&self) -> bool {
        self.supported
    }

    async fn request(&self) -> Permission {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.answer
    }
}

#[derive(Default)]
pub struct RecordingNotice {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotice {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl UserNotice for RecordingNotice {
    fn alert(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

/// A controller wired to fakes and a throwaway data directory.
pub struct ControllerFixture {
    pub ctx: Arc<TestContext>,
    pub harness: Harness,
    pub notice: Arc<RecordingNotice>,
    pub controller: Arc<TaskController<FakeHost>>,
}

impl ControllerFixture {
    pub fn new(host: FakeHost) -> Self {
        let ctx = Arc::new(TestContext::new());
        Self::in_context(ctx, host)
    }

    /// A second controller over an existing data directory.
    pub fn in_context(ctx: Arc<TestContext>, host: FakeHost) -> Self {
        let harness = Harness::new();
        let notice = Arc::new(RecordingNotice::default());
        let gate = PermissionGate::new(host, notice.clone());
        let controller = Arc::new(TaskController::new(
            Arc::new(LocalStore::new(ctx.clone())),
            harness.scheduler.clone(),
            gate,
            notice.clone(),
        ));
        Self {
            ctx,
            harness,
            notice,
            controller,
        }
    }
}
