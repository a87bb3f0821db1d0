//! Deployment levels and the persisted checkpoint used to resume a run.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ordered deployment level. The derive order is the execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
#[serde(rename_all = "snake_case")]
pub enum StageLevel {
    /// Networks, images, containers, databases.
    Infrastructure,
    /// Repository service and its agents.
    #[cfg_attr(feature = "clap", value(name = "control-plane", alias = "sardines"))]
    ControlPlane,
    /// Application services deployed through the agents.
    Services,
}

impl StageLevel {
    /// All levels in execution order.
    pub const ALL: [StageLevel; 3] = [Self::Infrastructure, Self::ControlPlane, Self::Services];

    #[must_use]
    pub fn index(self) -> usize {
        match self {
            Self::Infrastructure => 0,
            Self::ControlPlane => 1,
            Self::Services => 2,
        }
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Infrastructure => "infrastructure",
            Self::ControlPlane => "control-plane",
            Self::Services => "services",
        }
    }

    /// The level after this one, if any.
    #[must_use]
    pub fn next(self) -> Option<Self> {
        Self::ALL.get(self.index() + 1).copied()
    }
}

impl fmt::Display for StageLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("illegal level '{0}': expected one of infrastructure, control-plane, services")]
pub struct ParseLevelError(pub String);

impl FromStr for StageLevel {
    type Err = ParseLevelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "infrastructure" => Ok(Self::Infrastructure),
            "control-plane" | "control_plane" | "controlplane" | "sardines" => {
                Ok(Self::ControlPlane)
            }
            "services" => Ok(Self::Services),
            _ => Err(ParseLevelError(s.to_string())),
        }
    }
}

/// Highest level completed by the last run, persisted between invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunCheckpoint {
    pub completed: StageLevel,
    pub completed_at: DateTime<Utc>,
}
