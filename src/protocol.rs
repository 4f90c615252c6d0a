//! Public protocol structs for the HTTP API (serde ready).
//! Keep this small and stable to evolve backend and frontend independently.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::{
    Assignment, AssignmentStatus, AssignmentVersion, Difficulty, Subject, VariantType,
};

#[derive(Debug, Deserialize)]
pub struct CreateAssignmentIn {
    pub title: String,
    pub subject: Subject,
    #[serde(rename = "originalText")]
    pub original_text: Option<String>,
    #[serde(rename = "sourceFile")]
    pub source_file: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateIn {
    #[serde(rename = "variantType")]
    pub variant_type: VariantType,
    #[serde(default)]
    pub difficulty: Difficulty,
}

/// DTO for assignment delivery. Original sources are echoed back so the
/// frontend can prefill an edit form.
#[derive(Debug, Serialize)]
pub struct AssignmentOut {
    pub id: String,
    pub title: String,
    pub subject: Subject,
    pub status: AssignmentStatus,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "originalText")]
    pub original_text: Option<String>,
    #[serde(rename = "sourceFile")]
    pub source_file: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// DTO for a generated variant. `content` is the structured payload parsed
/// back out of storage; `assets` values that point into the upload root are
/// rewritten as `/uploads/...` URLs.
#[derive(Debug, Serialize)]
pub struct VariantOut {
    pub id: String,
    #[serde(rename = "assignmentId")]
    pub assignment_id: String,
    #[serde(rename = "variantType")]
    pub variant_type: VariantType,
    pub subject: Subject,
    pub content: Value,
    pub assets: BTreeMap<String, String>,
    pub ready: bool,
    #[serde(rename = "errorMessage")]
    pub error_message: Option<String>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

/// Assignment plus its variants, for the detail endpoint.
#[derive(Debug, Serialize)]
pub struct AssignmentDetailOut {
    #[serde(flatten)]
    pub assignment: AssignmentOut,
    pub variants: Vec<VariantOut>,
}

#[derive(Serialize)]
pub struct HealthOut {
    pub ok: bool,
}

#[derive(Serialize)]
pub struct ErrorOut {
    pub message: String,
}

/// Convert full `Assignment` (internal) to the public DTO.
pub fn to_assignment_out(a: &Assignment) -> AssignmentOut {
    AssignmentOut {
        id: a.id.clone(),
        title: a.title.clone(),
        subject: a.subject,
        status: a.status,
        error_message: a.error_message.clone(),
        original_text: a.original_text.clone(),
        source_file: a.source_file.clone(),
        created_at: a.created_at,
        updated_at: a.updated_at,
    }
}

/// Convert a stored variant to the public DTO, mapping artifact paths under
/// `upload_root` to servable `/uploads/...` URLs. Asset values outside the
/// upload root (e.g. inline summaries) pass through unchanged.
pub fn to_variant_out(upload_root: &Path, v: &AssignmentVersion) -> VariantOut {
    let assets = v
        .assets
        .iter()
        .map(|(k, val)| (k.clone(), asset_url(upload_root, val)))
        .collect();
    VariantOut {
        id: v.id.clone(),
        assignment_id: v.assignment_id.clone(),
        variant_type: v.variant_type,
        subject: v.subject,
        content: serde_json::from_str(&v.content_text).unwrap_or(Value::Null),
        assets,
        ready: v.ready,
        error_message: v.error_message.clone(),
        created_at: v.created_at,
        updated_at: v.updated_at,
    }
}

fn asset_url(upload_root: &Path, value: &str) -> String {
    match Path::new(value).strip_prefix(upload_root) {
        Ok(rel) => format!("/uploads/{}", rel.to_string_lossy()),
        Err(_) => value.to_string(),
    }
}
