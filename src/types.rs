// src/types.rs

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identity of a supervised worker.
///
/// `0` is reserved for the global/shared scope used by the retention tasks.
pub type WorkerId = u32;

/// Identity used by retention tasks to address shared (non-worker) artifacts.
pub const GLOBAL_SCOPE: WorkerId = 0;

/// Worker flavour. Selects the graceful-shutdown protocol, the broadcast
/// grammar and the default admin-token marker.
///
/// - `Interactive`: full-duplex console without a save/exit convention. Stopped
///   by closing the channel and sending SIGTERM.
/// - `Line`: line-oriented console that understands `save` and `exit`.
/// - `Bare`: no console protocol at all; signals only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerKind {
    Interactive,
    #[serde(alias = "line_oriented")]
    Line,
    #[default]
    Bare,
}

impl WorkerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerKind::Interactive => "interactive",
            WorkerKind::Line => "line",
            WorkerKind::Bare => "bare",
        }
    }

    /// Console command announcing `message` to everyone connected to the worker.
    pub fn broadcast_command(&self, message: &str) -> Option<String> {
        match self {
            WorkerKind::Interactive => Some(format!("broadcast {message}")),
            WorkerKind::Line => Some(format!("say {message}")),
            WorkerKind::Bare => None,
        }
    }

    /// Marker preceding the one-time setup code in the worker's startup output.
    pub fn default_token_marker(&self) -> Option<&'static str> {
        match self {
            WorkerKind::Interactive => Some("/setup"),
            WorkerKind::Line | WorkerKind::Bare => None,
        }
    }
}

impl fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "interactive" => Ok(WorkerKind::Interactive),
            "line" | "line_oriented" => Ok(WorkerKind::Line),
            "bare" => Ok(WorkerKind::Bare),
            other => Err(format!(
                "invalid worker kind: {other} (expected \"interactive\", \"line\" or \"bare\")"
            )),
        }
    }
}

/// Maintenance operation a scheduled task performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TaskType {
    Backup,
    Restart,
    CleanupBackup,
    CleanupLog,
    Broadcast,
    CustomCommand,
}

impl TaskType {
    pub const ALL: [TaskType; 6] = [
        TaskType::Backup,
        TaskType::Restart,
        TaskType::CleanupBackup,
        TaskType::CleanupLog,
        TaskType::Broadcast,
        TaskType::CustomCommand,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::Backup => "backup",
            TaskType::Restart => "restart",
            TaskType::CleanupBackup => "cleanup_backup",
            TaskType::CleanupLog => "cleanup_log",
            TaskType::Broadcast => "broadcast",
            TaskType::CustomCommand => "custom_command",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        TaskType::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| wanted.to_string())
    }
}

/// Outcome recorded on a task row and on each execution-log row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Success,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Success => "success",
            RunStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Parse a duration string like `"3s"`, `"250ms"`, `"1m"`, `"2h"` or a
/// concatenation such as `"1m30s"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let mut total = Duration::ZERO;
    let mut rest = s;

    while !rest.is_empty() {
        let digits_end = rest
            .find(|c: char| !c.is_ascii_digit())
            .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;
        if digits_end == 0 {
            return Err(format!("invalid duration '{s}': expected a number"));
        }

        let (num_part, tail) = rest.split_at(digits_end);
        let unit_end = tail
            .find(|c: char| c.is_ascii_digit())
            .unwrap_or(tail.len());
        let (unit_part, remainder) = tail.split_at(unit_end);

        let value: u64 = num_part
            .parse()
            .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;

        let piece = match unit_part.trim().to_lowercase().as_str() {
            "ms" => Duration::from_millis(value),
            "s" => Duration::from_secs(value),
            "m" => Duration::from_secs(value * 60),
            "h" => Duration::from_secs(value * 60 * 60),
            unit => {
                return Err(format!(
                    "unsupported duration unit '{}'; expected ms, s, m, or h",
                    unit
                ));
            }
        };

        total += piece;
        rest = remainder;
    }

    Ok(total)
}
