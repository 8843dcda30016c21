// Long-running reminder process: watches the store for external changes.
use crate::controller::TaskController;
use crate::permission::PermissionHost;
use std::future::Future;
use std::sync::Arc;
use crate::storage::FileStamp;
use std::time::Duration;

type Fingerprint = (Option<FileStamp>, Option<FileStamp>);

/// Reloads the controller whenever the task or settings file changes on disk,
/// e.g. after `dailylist add` ran in another process.
pub struct StoreWatcher<H> {
    controller: Arc<TaskController<H>>,
    poll_interval: Duration,
    last: Fingerprint,
}

impl<H: PermissionHost> StoreWatcher<H> {
    /// Changes made after this call are picked up by `run`.
    pub fn new(controller: Arc<TaskController<H>>, poll_interval: Duration) -> Self {
        let last = Self::fingerprint(&controller);
        Self {
            controller,
            poll_interval: poll_interval.max(Duration::from_millis(10)),
            last,
        }
    }

    fn fingerprint(controller: &TaskController<H>) -> Fingerprint {
        let storage = &controller.storage;
        (storage.tasks_stamp(), storage.settings_stamp())
    }

    /// Polls until `shutdown` resolves, then clears every pending reminder.
    pub async fn run(self, shutdown: impl Future<Output = ()>) {
        let mut last = self.last;
        log::info!(
            "Watching store every {:?}, {} reminder(s) pending",
            self.poll_interval,
            self.controller.scheduler.pending_count()
        );
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    log::info!("Store watcher stopping");
                    break;
                }
                _ = tokio::time::sleep(self.poll_interval) => {
                    let current = Self::fingerprint(&self.controller);
                    if current != last {
                        last = current;
                        if let Err(e) = self.controller.reload().await {
                            log::error!("Reload failed: {:#}", e);
                        }
                    }
                }
            }
        }

        self.controller.scheduler.clear_all_notifications();
    }
}
