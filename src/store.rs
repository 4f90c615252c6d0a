//! In-memory persistence for assignments and their variants.
//!
//! This module owns the record maps and enforces the two invariants the
//! pipeline relies on:
//!   - at most one variant per (assignment, variant_type) pair
//!   - variants are listed in creation order
//!
//! Mutations take a write lock, which gives single-writer-per-record
//! semantics; concurrent regeneration of the same variant is not guarded
//! beyond that and callers should serialize such requests per assignment.

use std::collections::{BTreeMap, HashMap};

use chrono::Utc;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::domain::{Assignment, AssignmentStatus, AssignmentVersion, VariantType};
use crate::error::StoreError;

#[derive(Default)]
pub struct Store {
    assignments: RwLock<HashMap<String, Assignment>>,
    variants: RwLock<HashMap<String, AssignmentVersion>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    #[instrument(level = "debug", skip(self, assignment), fields(id = %assignment.id))]
    pub async fn insert_assignment(&self, assignment: Assignment) {
        self.assignments
            .write()
            .await
            .insert(assignment.id.clone(), assignment);
    }

    pub async fn get_assignment(&self, id: &str) -> Option<Assignment> {
        self.assignments.read().await.get(id).cloned()
    }

    /// All assignments, newest first.
    pub async fn list_assignments(&self) -> Vec<Assignment> {
        let mut all: Vec<Assignment> = self.assignments.read().await.values().cloned().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        all
    }

    /// Transition an assignment's lifecycle status, recording the error
    /// message for `failed` and clearing it otherwise.
    #[instrument(level = "debug", skip(self, error_message), fields(%id, ?status))]
    pub async fn set_assignment_status(
        &self,
        id: &str,
        status: AssignmentStatus,
        error_message: Option<String>,
    ) -> Result<Assignment, StoreError> {
        let mut assignments = self.assignments.write().await;
        let a = assignments
            .get_mut(id)
            .ok_or_else(|| StoreError::AssignmentNotFound(id.to_string()))?;
        a.status = status;
        a.error_message = error_message;
        a.updated_at = Utc::now();
        Ok(a.clone())
    }

    /// Delete an assignment and cascade to its variants.
    pub async fn delete_assignment(&self, id: &str) -> Result<(), StoreError> {
        let mut assignments = self.assignments.write().await;
        if assignments.remove(id).is_none() {
            return Err(StoreError::AssignmentNotFound(id.to_string()));
        }
        let mut variants = self.variants.write().await;
        variants.retain(|_, v| v.assignment_id != id);
        Ok(())
    }

    /// Persist a fully-formed variant. Rejects a second variant of the same
    /// type for the same assignment.
    #[instrument(level = "debug", skip(self, variant), fields(assignment_id = %variant.assignment_id, variant_type = %variant.variant_type))]
    pub async fn insert_variant(
        &self,
        variant: AssignmentVersion,
    ) -> Result<AssignmentVersion, StoreError> {
        {
            let assignments = self.assignments.read().await;
            if !assignments.contains_key(&variant.assignment_id) {
                return Err(StoreError::AssignmentNotFound(variant.assignment_id.clone()));
            }
        }
        let mut variants = self.variants.write().await;
        let duplicate = variants.values().any(|v| {
            v.assignment_id == variant.assignment_id && v.variant_type == variant.variant_type
        });
        if duplicate {
            return Err(StoreError::DuplicateVariant {
                assignment_id: variant.assignment_id.clone(),
                variant_type: variant.variant_type.to_string(),
            });
        }
        debug!(target: "pipeline", id = %variant.id, "Variant persisted");
        variants.insert(variant.id.clone(), variant.clone());
        Ok(variant)
    }

    /// Update an existing variant's payload and assets in place.
    pub async fn update_variant(
        &self,
        id: &str,
        content_text: String,
        assets: BTreeMap<String, String>,
    ) -> Result<AssignmentVersion, StoreError> {
        let mut variants = self.variants.write().await;
        let v = variants
            .get_mut(id)
            .ok_or_else(|| StoreError::VariantNotFound(id.to_string()))?;
        v.content_text = content_text;
        v.assets = assets;
        v.ready = true;
        v.error_message = None;
        v.updated_at = Utc::now();
        Ok(v.clone())
    }

    pub async fn find_variant(
        &self,
        assignment_id: &str,
        variant_type: VariantType,
    ) -> Option<AssignmentVersion> {
        self.variants
            .read()
            .await
            .values()
            .find(|v| v.assignment_id == assignment_id && v.variant_type == variant_type)
            .cloned()
    }

    /// All variants of one assignment, oldest first (creation order).
    pub async fn variants_for(&self, assignment_id: &str) -> Vec<AssignmentVersion> {
        let mut out: Vec<AssignmentVersion> = self
            .variants
            .read()
            .await
            .values()
            .filter(|v| v.assignment_id == assignment_id)
            .cloned()
            .collect();
        out.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        out
    }
}
