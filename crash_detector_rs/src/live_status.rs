use crate::detector::DetectionState;
use crate::sensitivity::SensitivityLevel;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;

/// Diagnostics snapshot of a detector. No format stability promised.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DetectorStatus {
    pub captured_at: String,
    pub running: bool,
    pub sample_count: u64,
    pub crash_count: u64,
    pub state: DetectionState,
    pub sensitivity: SensitivityLevel,
    pub accel_buffer_len: usize,
    pub gyro_buffer_len: usize,
    pub last_impact_time: Option<u64>,
}

impl DetectorStatus {
    pub fn save(&self, path: impl AsRef<Path>) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

impl fmt::Display for DetectorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Samples: {}", self.sample_count)?;
        writeln!(f, "Crashes Detected: {}", self.crash_count)?;
        writeln!(f, "State: {}", self.state)?;
        writeln!(f, "Sensitivity: {}", self.sensitivity)?;
        writeln!(f, "Accel Buffer: {}", self.accel_buffer_len)?;
        write!(f, "Gyro Buffer: {}", self.gyro_buffer_len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn status() -> DetectorStatus {
        DetectorStatus {
            captured_at: "2026-10-16T12:00:00+00:00".to_string(),
            running: true,
            sample_count: 250,
            crash_count: 1,
            state: DetectionState::AwaitResponse,
            sensitivity: SensitivityLevel::Medium,
            accel_buffer_len: 50,
            gyro_buffer_len: 48,
            last_impact_time: Some(1234),
        }
    }

    #[test]
    fn test_debug_string() {
        let text = status().to_string();
        assert!(text.starts_with("Samples: 250\n"));
        assert!(text.contains("State: AWAIT_RESPONSE"));
        assert!(text.contains("Sensitivity: MEDIUM"));
        assert!(text.ends_with("Gyro Buffer: 48"));
    }

    #[test]
    fn test_save_json() {
        let path = std::env::temp_dir().join(format!("crash_status_{}.json", std::process::id()));
        status().save(&path).unwrap();
        let json = fs::read_to_string(&path).unwrap();
        let _ = fs::remove_file(&path);
        assert!(json.contains("\"state\": \"AWAIT_RESPONSE\""));
        assert!(json.contains("\"last_impact_time\": 1234"));
    }
}
