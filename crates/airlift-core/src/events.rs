use serde::{Deserialize, Serialize};

use crate::request::PackageRequest;
use crate::tree::{Conflict, DependencyTree, FailedPackage};

/// Artifact download lifecycle states, as seen on the event stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DownloadStatus {
    Pending,
    Downloading,
    Paused,
    Completed,
    Failed,
    Skipped,
    Cancelled,
}

impl DownloadStatus {
    /// Terminal states emit no further progress.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadStatus::Completed
                | DownloadStatus::Failed
                | DownloadStatus::Skipped
                | DownloadStatus::Cancelled
        )
    }
}

/// Per-artifact progress snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEvent {
    /// Artifact identity key.
    pub id: String,
    pub status: DownloadStatus,
    /// 0..=100, best-effort when total size is unknown.
    pub progress: u8,
    pub downloaded: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// Bytes per second over the last measurement window.
    pub speed: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Typed session events broadcast to the owning client.
///
/// The discriminator doubles as the SSE `event:` name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case", tag = "event", content = "data")]
pub enum SessionEvent {
    Status {
        phase: String,
        message: String,
    },
    DepsResolved {
        original_packages: Vec<PackageRequest>,
        all_packages: Vec<crate::artifact::ResolvedArtifact>,
        dependency_trees: Vec<DependencyTree>,
        conflicts: Vec<Conflict>,
        failed_packages: Vec<FailedPackage>,
    },
    Progress(ProgressEvent),
    Complete {
        success: bool,
        output_path: String,
    },
    Cancelled {},
}

impl SessionEvent {
    /// The SSE event name for this variant.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionEvent::Status { .. } => "status",
            SessionEvent::DepsResolved { .. } => "deps-resolved",
            SessionEvent::Progress(_) => "progress",
            SessionEvent::Complete { .. } => "complete",
            SessionEvent::Cancelled {} => "cancelled",
        }
    }

    /// Serialize as one server-sent event frame:
    /// `event: <kind>\ndata: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        let data = match self {
            SessionEvent::Status { phase, message } => serde_json::json!({
                "phase": phase,
                "message": message,
            }),
            SessionEvent::DepsResolved {
                original_packages,
                all_packages,
                dependency_trees,
                conflicts,
                failed_packages,
            } => serde_json::json!({
                "originalPackages": original_packages,
                "allPackages": all_packages,
                "dependencyTrees": dependency_trees,
                "conflicts": conflicts,
                "failedPackages": failed_packages,
            }),
            SessionEvent::Progress(p) => serde_json::to_value(p).unwrap_or_default(),
            SessionEvent::Complete {
                success,
                output_path,
            } => serde_json::json!({
                "success": success,
                "outputPath": output_path,
            }),
            SessionEvent::Cancelled {} => serde_json::json!({}),
        };
        format!("event: {}\ndata: {}\n\n", self.kind(), data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_states() {
        assert!(DownloadStatus::Completed.is_terminal());
        assert!(DownloadStatus::Cancelled.is_terminal());
        assert!(!DownloadStatus::Paused.is_terminal());
        assert!(!DownloadStatus::Downloading.is_terminal());
    }

    #[test]
    fn sse_frame_shape() {
        let event = SessionEvent::Status {
            phase: "resolving".into(),
            message: "expanding dependency graph".into(),
        };
        let frame = event.to_sse();
        assert!(frame.starts_with("event: status\ndata: {"));
        assert!(frame.ends_with("\n\n"));
        assert!(frame.contains("\"phase\":\"resolving\""));
    }

    #[test]
    fn progress_sse_uses_camel_case() {
        let event = SessionEvent::Progress(ProgressEvent {
            id: "pip:requests:2.31.0:any".into(),
            status: DownloadStatus::Downloading,
            progress: 42,
            downloaded: 4200,
            total: Some(10000),
            speed: 1024,
            error: None,
        });
        let frame = event.to_sse();
        assert!(frame.starts_with("event: progress\n"));
        assert!(frame.contains("\"downloaded\":4200"));
        assert!(!frame.contains("\"error\""));
    }

    #[test]
    fn cancelled_has_empty_payload() {
        let frame = SessionEvent::Cancelled {}.to_sse();
        assert_eq!(frame, "event: cancelled\ndata: {}\n\n");
    }
}
