use crate::error::{CrashDetectorError, Result};
use crate::sensitivity::SensitivityLevel;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tokio::sync::watch;

/// The two user settings the detector depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CrashSettings {
    pub sensitivity: SensitivityLevel,
    pub detection_enabled: bool,
}

impl Default for CrashSettings {
    fn default() -> Self {
        Self {
            sensitivity: SensitivityLevel::Medium,
            detection_enabled: true,
        }
    }
}

/// On-disk form. Values are kept as strings, as a preferences store would.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    sensitivity_level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    detection_enabled: Option<String>,
}

impl StoredSettings {
    fn resolve(&self) -> CrashSettings {
        let sensitivity = self
            .sensitivity_level
            .as_deref()
            .map(SensitivityLevel::parse_or_default)
            .unwrap_or_default();
        let detection_enabled = self
            .detection_enabled
            .as_deref()
            .map(|v| v.trim().eq_ignore_ascii_case("true"))
            .unwrap_or(true);
        CrashSettings {
            sensitivity,
            detection_enabled,
        }
    }

    fn from_settings(settings: &CrashSettings) -> Self {
        Self {
            sensitivity_level: Some(settings.sensitivity.name().to_string()),
            detection_enabled: Some(settings.detection_enabled.to_string()),
        }
    }
}

/// Persisted crash settings with change notification.
///
/// Subscribers get the current value immediately and every later change.
pub struct CrashSettingsRepository {
    path: Option<PathBuf>,
    tx: watch::Sender<CrashSettings>,
    write_lock: Mutex<()>,
}

impl CrashSettingsRepository {
    /// Load settings from `path`. A missing file yields the defaults.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let settings = Self::load(&path)?;
        log::info!(
            "Crash settings loaded from {}: sensitivity={}, enabled={}",
            path.display(),
            settings.sensitivity,
            settings.detection_enabled
        );
        let (tx, _) = watch::channel(settings);
        Ok(Self {
            path: Some(path),
            tx,
            write_lock: Mutex::new(()),
        })
    }

    /// Non-persistent repository, starting from `settings`
    pub fn in_memory(settings: CrashSettings) -> Self {
        let (tx, _) = watch::channel(settings);
        Self {
            path: None,
            tx,
            write_lock: Mutex::new(()),
        }
    }

    fn load(path: &Path) -> Result<CrashSettings> {
        let text = match fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(CrashSettings::default()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str::<StoredSettings>(&text) {
            Ok(stored) => Ok(stored.resolve()),
            Err(e) => {
                log::warn!("Unreadable crash settings in {}: {}", path.display(), e);
                Ok(CrashSettings::default())
            }
        }
    }

    pub fn current(&self) -> CrashSettings {
        *self.tx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<CrashSettings> {
        self.tx.subscribe()
    }

    pub fn set_sensitivity_level(&self, level: SensitivityLevel) -> Result<()> {
        self.update(|s| s.sensitivity = level)
    }

    pub fn set_detection_enabled(&self, enabled: bool) -> Result<()> {
        self.update(|s| s.detection_enabled = enabled)
    }

    fn update(&self, change: impl FnOnce(&mut CrashSettings)) -> Result<()> {
        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| CrashDetectorError::lock("settings"))?;

        let mut next = self.current();
        change(&mut next);

        if let Some(path) = &self.path {
            Self::persist(path, &next)?;
        }

        self.tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
        Ok(())
    }

    fn persist(path: &Path, settings: &CrashSettings) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let json = serde_json::to_string_pretty(&StoredSettings::from_settings(settings))?;
        fs::write(path, json)?;
        Ok(())
    }
}
