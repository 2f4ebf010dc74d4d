//! Job manifest: JSON file describing the batch to run.

use crate::error::BatchError;
use crate::job::{AuxiliaryInput, JobKind, JobPayload, JobRequest};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;

const REFERENCE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];
const ASPECT_RATIOS: &[&str] = &["16:9", "4:3", "1:1"];

/// One manifest entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestEntry {
    pub id: String,
    pub prompt: String,
    #[serde(default)]
    pub kind: JobKind,
    #[serde(default)]
    pub parameters: BTreeMap<String, String>,
    /// Reference image paths, relative to the manifest's directory
    #[serde(default)]
    pub references: Vec<PathBuf>,
}

/// Read a manifest and build requests, loading every reference file.
pub fn load_manifest(path: &Path) -> Result<Vec<JobRequest>, BatchError> {
    let raw = std::fs::read_to_string(path).map_err(|e| {
        BatchError::Manifest(format!("cannot read {}: {}", path.display(), e))
    })?;
    let entries: Vec<ManifestEntry> = serde_json::from_str(&raw)
        .map_err(|e| BatchError::Manifest(format!("{}: {}", path.display(), e)))?;
    let base = path.parent().unwrap_or_else(|| Path::new("."));

    let requests = entries
        .into_iter()
        .map(|entry| entry.into_request(base))
        .collect::<Result<Vec<_>, _>>()?;
    debug!(manifest = %path.display(), jobs = requests.len(), "Manifest loaded");
    Ok(requests)
}

impl ManifestEntry {
    fn into_request(self, base: &Path) -> Result<JobRequest, BatchError> {
        if self.id.trim().is_empty() {
            return Err(BatchError::Manifest("job id must not be empty".to_string()));
        }
        if self.id.contains(['/', '\\']) || self.id == "." || self.id == ".." {
            return Err(BatchError::Manifest(format!(
                "job id '{}' cannot be used as a file name",
                self.id
            )));
        }
        if self.prompt.trim().is_empty() {
            return Err(BatchError::Manifest(format!("job '{}' has an empty prompt", self.id)));
        }
        if let Some(ratio) = self.parameters.get("aspect_ratio") {
            if !ASPECT_RATIOS.contains(&ratio.as_str()) {
                return Err(BatchError::Manifest(format!(
                    "job '{}': aspect_ratio must be one of {}, got {}",
                    self.id,
                    ASPECT_RATIOS.join(", "),
                    ratio
                )));
            }
        }

        let mut payload = JobPayload::new(self.prompt);
        payload.parameters = self.parameters;
        let mut request = JobRequest::new(self.id, payload).with_kind(self.kind);
        for reference in &self.references {
            let input = load_reference(&base.join(reference), &request.id)?;
            request = request.with_auxiliary(input);
        }
        Ok(request)
    }
}

fn load_reference(path: &Path, job_id: &crate::job::JobId) -> Result<AuxiliaryInput, BatchError> {
    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    if !REFERENCE_EXTENSIONS.contains(&extension.as_str()) {
        return Err(BatchError::Manifest(format!(
            "job '{}': unsupported reference format '{}' (use .jpg, .jpeg, .png, or .webp)",
            job_id,
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(BatchError::Manifest(format!(
            "job '{}': reference image not found: {}",
            job_id,
            path.display()
        )));
    }
    let data = std::fs::read(path)?;
    let media_type = match extension.as_str() {
        "jpg" | "jpeg" => "image/jpeg",
        "webp" => "image/webp",
        _ => "image/png",
    };
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    Ok(AuxiliaryInput::new(name, data).with_media_type(media_type))
}
