/*! Background delivery of system notifications.

The scheduler never talks to the notification server directly. It posts an
`AgentMessage` to the agent, which runs on its own thread so it keeps working
while no foreground view is open.

Wire format (JSON):

```text
{ "type": "SHOW_NOTIFICATION",
  "payload": { "title": "...", "options": { "body": "...", "icon": "...", "tag": "<task id>", "renotify": true } } }
{ "type": "NOTIFICATION_CLICKED", "payload": { "tag": "<task id>" } }
```
*/

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

/// Route opened when a click finds no existing view.
pub const DEFAULT_ROUTE: &str = "/";

const AGENT_QUEUE: usize = 64;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationOptions {
    pub body: String,
    pub icon: String,
    /// Notifications sharing a tag replace each other.
    pub tag: String,
    pub renotify: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ShowNotification {
    pub title: String,
    pub options: NotificationOptions,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AgentMessage {
    ShowNotification(ShowNotification),
    NotificationClicked { tag: String },
}

impl AgentMessage {
    pub fn show(title: &str, body: &str, icon: &str, tag: &str) -> Self {
        AgentMessage::ShowNotification(ShowNotification {
            title: title.to_string(),
            options: NotificationOptions {
                body: body.to_string(),
                icon: icon.to_string(),
                tag: tag.to_string(),
                renotify: true,
            },
        })
    }

    pub fn tag(&self) -> &str {
        match self {
            AgentMessage::ShowNotification(n) => &n.options.tag,
            AgentMessage::NotificationClicked { tag } => tag,
        }
    }
}

/// Where the scheduler sends notification requests. Must not block.
pub trait NotificationDispatch: Send + Sync {
    fn dispatch(&self, message: AgentMessage);
}

/// The system notification area.
pub trait NotificationSurface: Send {
    /// Shows a notification, replacing a visible one with the same tag.
    fn show(&mut self, title: &str, options: &NotificationOptions) -> Result<()>;
    fn close(&mut self, tag: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientView {
    pub id: String,
    pub focused: bool,
}

/// Open application views the agent can bring forward.
pub trait WindowClients: Send {
    fn list(&mut self) -> Vec<ClientView>;
    fn focus(&mut self, id: &str) -> Result<()>;
    fn open(&mut self, route: &str) -> Result<()>;
}

pub struct BackgroundAgent<S, W> {
    surface: S,
    clients: W,
}

impl<S: NotificationSurface, W: WindowClients> BackgroundAgent<S, W> {
    pub fn new(surface: S, clients: W) -> Self {
        Self { surface, clients }
    }

    pub fn handle(&mut self, message: AgentMessage) -> Result<()> {
        match message {
            AgentMessage::ShowNotification(n) => self.surface.show(&n.title, &n.options),
            AgentMessage::NotificationClicked { tag } => self.on_click(&tag),
        }
    }

    /// Closes the notification, then focuses a view: the last focused one,
    /// else the first, else a new one on the default route.
    fn on_click(&mut self, tag: &str) -> Result<()> {
        self.surface.close(tag);

        let views = self.clients.list();
        let target = views
            .iter()
            .filter(|v| v.focused)
            .last()
            .or_else(|| views.first());

        match target {
            Some(view) => self.clients.focus(&view.id),
            None => self.clients.open(DEFAULT_ROUTE),
        }
    }

    pub fn surface(&self) -> &S {
        &self.surface
    }

    pub fn clients(&self) -> &W {
        &self.clients
    }
}

// --- Channel plumbing ---

/// Sending side of the agent queue.
#[derive(Debug, Clone)]
pub struct AgentHandle {
    tx: mpsc::Sender<AgentMessage>,
}

/// Receiving side, consumed by `spawn_agent`.
#[derive(Debug)]
pub struct AgentInbox {
    rx: mpsc::Receiver<AgentMessage>,
}

pub fn agent_channel() -> (AgentHandle, AgentInbox) {
    let (tx, rx) = mpsc::channel(AGENT_QUEUE);
    (AgentHandle { tx }, AgentInbox { rx })
}

impl NotificationDispatch for AgentHandle {
    fn dispatch(&self, message: AgentMessage) {
        match self.tx.try_send(message) {
            Ok(()) => {}
            Err(TrySendError::Full(m)) => {
                log::warn!("Agent queue full, dropping message for tag {}", m.tag());
            }
            Err(TrySendError::Closed(m)) => {
                log::warn!("Agent stopped, dropping message for tag {}", m.tag());
            }
        }
    }
}

/// Runs the agent on a dedicated thread until every `AgentHandle` is dropped.
/// Surfaces may block (D-Bus round trips), so this is not a tokio task.
pub fn spawn_agent<S, W>(mut agent: BackgroundAgent<S, W>, inbox: AgentInbox) -> JoinHandle<()>
where
    S: NotificationSurface + 'static,
    W: WindowClients + 'static,
{
    let mut rx = inbox.rx;
    std::thread::spawn(move || {
        while let Some(message) = rx.blocking_recv() {
            let tag = message.tag().to_string();
            if let Err(e) = agent.handle(message) {
                log::warn!("Agent failed to handle message for {}: {:#}", tag, e);
            }
        }
        log::debug!("Agent channel closed, exiting");
    })
}

// --- Desktop notification server ---

/// Shows notifications through the platform notification server.
///
/// On XDG desktops a notification is replaced in place when its tag is shown
/// again, and invoking its default action is forwarded to the agent as a click.
/// Servers dismiss a notification when its default action is invoked, so
/// `close` only drops the bookkeeping.
pub struct DesktopSurface {
    appname: String,
    #[cfg_attr(not(all(unix, not(target_os = "macos"))), allow(dead_code))]
    clicks: AgentHandle,
    shown: Arc<Mutex<HashMap<String, u32>>>,
}

impl DesktopSurface {
    pub fn new(appname: &str, clicks: AgentHandle) -> Self {
        Self {
            appname: appname.to_string(),
            clicks,
            shown: Arc::new(Mutex::new(HashMap::new())),
        }
    }
}

impl NotificationSurface for DesktopSurface {
    #[cfg(all(unix, not(target_os = "macos")))]
    fn show(&mut self, title: &str, options: &NotificationOptions) -> Result<()> {
        let mut notification = notify_rust::Notification::new();
        notification
            .summary(title)
            .body(&options.body)
            .icon(&options.icon)
            .appname(&self.appname)
            .action("default", "Open");

        let existing = self
            .shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&options.tag)
            .copied();
        if let Some(id) = existing {
            notification.id(id);
        }

        let handle = notification.show()?;
        let id = handle.id();
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(options.tag.clone(), id);

        let clicks = self.clicks.clone();
        let shown = Arc::clone(&self.shown);
        let tag = options.tag.clone();
        std::thread::spawn(move || {
            handle.wait_for_action(|action| {
                if action == "default" {
                    clicks.dispatch(AgentMessage::NotificationClicked { tag: tag.clone() });
                }
                let mut shown = shown.lock().unwrap_or_else(PoisonError::into_inner);
                if shown.get(&tag) == Some(&id) {
                    shown.remove(&tag);
                }
            });
        });
        Ok(())
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn show(&mut self, title: &str, options: &NotificationOptions) -> Result<()> {
        notify_rust::Notification::new()
            .summary(title)
            .body(&options.body)
            .icon(&options.icon)
            .appname(&self.appname)
            .show()?;
        Ok(())
    }

    fn close(&mut self, tag: &str) {
        self.shown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag);
    }
}

/// Has no views of its own; a click launches `open_command`, if configured.
#[derive(Debug, Clone, Default)]
pub struct LauncherClients {
    open_command: Option<String>,
}

impl LauncherClients {
    pub fn new(open_command: Option<String>) -> Self {
        Self { open_command }
    }
}

impl WindowClients for LauncherClients {
    fn list(&mut self) -> Vec<ClientView> {
        Vec::new()
    }

    fn focus(&mut self, _id: &str) -> Result<()> {
        Ok(())
    }

    fn open(&mut self, route: &str) -> Result<()> {
        let Some(command) = self.open_command.as_deref() else {
            log::info!("Notification clicked; no open_command configured");
            return Ok(());
        };
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            anyhow::bail!("open_command is empty");
        };
        std::process::Command::new(program)
            .args(parts)
            .env("DAILYLIST_ROUTE", route)
            .spawn()?;
        Ok(())
    }
}
