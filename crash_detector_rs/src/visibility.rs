use crate::error::{CrashDetectorError, Result};
use crate::service::CrashDetectionService;
use crate::settings::CrashSettings;
use std::sync::{Arc, Mutex};
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

struct Visibility {
    foreground: bool,
    watcher: Option<JoinHandle<()>>,
}

/// Ties detection to the host app's foreground/background transitions.
///
/// While the app is visible detection follows the `detection_enabled`
/// setting; going to the background always stops it.
pub struct AppVisibilityObserver {
    service: Arc<CrashDetectionService>,
    settings: watch::Receiver<CrashSettings>,
    handle: Handle,
    visibility: Arc<Mutex<Visibility>>,
}

impl AppVisibilityObserver {
    pub fn new(
        service: Arc<CrashDetectionService>,
        settings: watch::Receiver<CrashSettings>,
        handle: Handle,
    ) -> Self {
        Self {
            service,
            settings,
            handle,
            visibility: Arc::new(Mutex::new(Visibility {
                foreground: false,
                watcher: None,
            })),
        }
    }

    pub fn on_foreground(&self) -> Result<()> {
        log::info!("App entered FOREGROUND");
        let mut visibility = self
            .visibility
            .lock()
            .map_err(|_| CrashDetectorError::lock("visibility"))?;
        visibility.foreground = true;
        if let Some(watcher) = visibility.watcher.take() {
            watcher.abort();
        }

        let mut settings = self.settings.clone();
        let enabled = settings.borrow_and_update().detection_enabled;
        apply(&self.service, enabled)?;

        let service = self.service.clone();
        let shared = self.visibility.clone();
        visibility.watcher = Some(self.handle.spawn(async move {
            while settings.changed().await.is_ok() {
                let enabled = settings.borrow_and_update().detection_enabled;
                let Ok(visibility) = shared.lock() else {
                    break;
                };
                if !visibility.foreground {
                    break;
                }
                if let Err(e) = apply(&service, enabled) {
                    log::error!("Failed to apply detection_enabled={}: {}", enabled, e);
                }
            }
        }));
        Ok(())
    }

    pub fn on_background(&self) -> Result<()> {
        log::info!("App entered BACKGROUND");
        let mut visibility = self
            .visibility
            .lock()
            .map_err(|_| CrashDetectorError::lock("visibility"))?;
        visibility.foreground = false;
        if let Some(watcher) = visibility.watcher.take() {
            watcher.abort();
        }
        self.service.stop()
    }

    pub fn is_foreground(&self) -> bool {
        self.visibility
            .lock()
            .map(|v| v.foreground)
            .unwrap_or(false)
    }
}

fn apply(service: &CrashDetectionService, enabled: bool) -> Result<()> {
    if enabled {
        service.start()
    } else {
        service.stop()
    }
}
