//! Template, profile, and workflow-artifact file operations.

use reqwest::multipart::{Form, Part};
use std::path::Path;
use tracing::info;
use uuid::Uuid;

use crate::api::ApiClient;
use crate::errors::ClientError;

/// The two user-managed file collections on the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// LaTeX resume templates (`.tex`).
    Template,
    /// Source profile documents (`.pdf`).
    Profile,
}

impl FileKind {
    fn endpoint(self) -> &'static str {
        match self {
            FileKind::Template => "/files/templates",
            FileKind::Profile => "/files/profiles",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            FileKind::Template => "template",
            FileKind::Profile => "profile",
        }
    }
}

pub async fn list(api: &ApiClient, kind: FileKind) -> Result<Vec<String>, ClientError> {
    api.get_json(kind.endpoint()).await
}

/// Uploads a local file as a template or profile. The backend keys files by
/// their original name, so the part carries the file's basename.
pub async fn upload(api: &ApiClient, kind: FileKind, path: &Path) -> Result<(), ClientError> {
    let filename = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| ClientError::NotFound(format!("{} has no usable filename", path.display())))?
        .to_string();

    let bytes = tokio::fs::read(path).await?;
    let part = Part::bytes(bytes)
        .file_name(filename.clone())
        .mime_str(mime_for(&filename))?;
    let form = Form::new().part("file", part);

    let _: serde_json::Value = api.post_multipart(kind.endpoint(), form).await?;
    info!("Uploaded {} '{filename}'", kind.label());
    Ok(())
}

pub async fn delete(api: &ApiClient, kind: FileKind, filename: &str) -> Result<(), ClientError> {
    api.delete(&format!("{}/{filename}", kind.endpoint())).await
}

/// Resource path for a generated artifact of a specific workflow version.
pub fn artifact_path(workflow_id: Uuid, version: &str, filename: &str) -> String {
    format!("/files/workflows/{workflow_id}/{version}/{filename}")
}

/// Downloads a workflow artifact to a local path and returns the byte count.
pub async fn download_artifact(
    api: &ApiClient,
    workflow_id: Uuid,
    version: &str,
    filename: &str,
    dest: &Path,
) -> Result<usize, ClientError> {
    let bytes = api
        .get_bytes(&artifact_path(workflow_id, version, filename))
        .await?;
    let len = bytes.len();
    tokio::fs::write(dest, bytes).await?;
    info!("Saved {filename} ({len} bytes) to {}", dest.display());
    Ok(len)
}

fn mime_for(filename: &str) -> &'static str {
    match filename.rsplit_once('.').map(|(_, ext)| ext) {
        Some("pdf") => "application/pdf",
        Some("tex") => "text/x-tex",
        Some("log") | Some("txt") => "text/plain",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_artifact_path_shape() {
        let id = Uuid::nil();
        assert_eq!(
            artifact_path(id, "v2", "Resume_Optimized_v2.pdf"),
            format!("/files/workflows/{id}/v2/Resume_Optimized_v2.pdf")
        );
    }

    #[test]
    fn test_mime_by_extension() {
        assert_eq!(mime_for("resume.pdf"), "application/pdf");
        assert_eq!(mime_for("resume.tex"), "text/x-tex");
        assert_eq!(mime_for("build.log"), "text/plain");
        assert_eq!(mime_for("noext"), "application/octet-stream");
    }
}
