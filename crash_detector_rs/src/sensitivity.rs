use crate::error::CrashDetectorError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Detection sensitivity. Each level is a fixed bundle of thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "UPPERCASE")]
pub enum SensitivityLevel {
    Low,
    #[default]
    Medium,
    High,
}

impl SensitivityLevel {
    pub const ALL: [SensitivityLevel; 3] = [
        SensitivityLevel::Low,
        SensitivityLevel::Medium,
        SensitivityLevel::High,
    ];

    /// Impact threshold in g
    pub fn impact_threshold(&self) -> f64 {
        match self {
            SensitivityLevel::Low => 4.5,
            SensitivityLevel::Medium => 3.5,
            SensitivityLevel::High => 2.5,
        }
    }

    /// Rotation threshold in rad/s
    pub fn rotation_threshold(&self) -> f64 {
        match self {
            SensitivityLevel::Low => 6.5,
            SensitivityLevel::Medium => 5.0,
            SensitivityLevel::High => 3.5,
        }
    }

    /// Free-fall threshold in g
    pub fn free_fall_threshold(&self) -> f64 {
        match self {
            SensitivityLevel::Low => 0.3,
            SensitivityLevel::Medium => 0.5,
            SensitivityLevel::High => 0.7,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SensitivityLevel::Low => "LOW",
            SensitivityLevel::Medium => "MEDIUM",
            SensitivityLevel::High => "HIGH",
        }
    }

    /// Lenient parse used by the settings layer: anything unrecognized
    /// falls back to MEDIUM.
    pub fn parse_or_default(name: &str) -> Self {
        name.parse().unwrap_or_else(|_| {
            log::warn!("Unknown sensitivity {:?}, falling back to MEDIUM", name);
            SensitivityLevel::Medium
        })
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for SensitivityLevel {
    type Err = CrashDetectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "LOW" => Ok(SensitivityLevel::Low),
            "MEDIUM" => Ok(SensitivityLevel::Medium),
            "HIGH" => Ok(SensitivityLevel::High),
            other => Err(CrashDetectorError::UnknownSensitivity(other.to_string())),
        }
    }
}
