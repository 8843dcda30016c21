// Notification authorization checks.
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use strum::{Display, EnumString};

pub const UNSUPPORTED_MESSAGE: &str = "This system does not support desktop notifications";

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// The user has not decided yet.
    #[default]
    Default,
}

impl Permission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Permission::Granted)
    }
}

/// Blocking, user-visible message (the equivalent of an alert dialog).
pub trait UserNotice: Send + Sync {
    fn alert(&self, message: &str);
}

/// Writes notices to stderr and the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleNotice;

impl UserNotice for ConsoleNotice {
    fn alert(&self, message: &str) {
        log::warn!("{}", message);
        eprintln!("{}", message);
    }
}

pub trait PermissionHost: Send + Sync {
    fn supports_notifications(&self) -> bool;

    /// Asks the host for permission to show notifications.
    fn request(&self) -> impl Future<Output = Permission> + Send;
}

pub struct PermissionGate<H> {
    host: H,
    notice: Arc<dyn UserNotice>,
    reported_unsupported: AtomicBool,
}

impl<H: PermissionHost> PermissionGate<H> {
    pub fn new(host: H, notice: Arc<dyn UserNotice>) -> Self {
        Self {
            host,
            notice,
            reported_unsupported: AtomicBool::new(false),
        }
    }

    /// Requests notification permission.
    ///
    /// A host without notification support yields `Denied`; the user is told
    /// about it the first time only.
    pub async fn request_permission(&self) -> Permission {
        if !self.host.supports_notifications() {
            if !self.reported_unsupported.swap(true, Ordering::SeqCst) {
                self.notice.alert(UNSUPPORTED_MESSAGE);
            }
            return Permission::Denied;
        }
        let outcome = self.host.request().await;
        log::debug!("Notification permission: {}", outcome);
        outcome
    }
}

/// Desktop hosts have no consent prompt: a reachable notification server is
/// taken as consent.
#[derive(Debug, Default, Clone, Copy)]
pub struct DesktopPermissionHost;

impl DesktopPermissionHost {
    #[cfg(all(unix, not(target_os = "macos")))]
    fn probe() -> bool {
        match notify_rust::get_server_information() {
            Ok(info) => {
                log::debug!("Notification server: {} {}", info.name, info.version);
                true
            }
            Err(e) => {
                log::warn!("No notification server: {}", e);
                false
            }
        }
    }

    #[cfg(not(all(unix, not(target_os = "macos"))))]
    fn probe() -> bool {
        true
    }
}

impl PermissionHost for DesktopPermissionHost {
    fn supports_notifications(&self) -> bool {
        Self::probe()
    }

    async fn request(&self) -> Permission {
        match tokio::task::spawn_blocking(Self::probe).await {
            Ok(true) => Permission::Granted,
            Ok(false) => Permission::Denied,
            Err(e) => {
                log::warn!("Permission probe failed: {}", e);
                Permission::Denied
            }
        }
    }
}
