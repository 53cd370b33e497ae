//! External collaborators: persistence, the correction service, and the
//! render validator, plus the JSON payloads exchanged with them.
//!
//! The editor never talks to storage or the network itself. Hosts implement
//! [`Persistence`] and [`CorrectionService`] over whatever transport they
//! use; the payload types serialize with camelCase field names.

use crate::error::CollaboratorError;
use duet_core::{DiagramAdapter, DiagramCategory, registry};
use serde::{Deserialize, Serialize};
use std::future::Future;

// ─── Wire types ──────────────────────────────────────────────────────────

/// Body of a save call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SaveRequest {
    pub artifact_id: String,
    pub content: String,
}

/// Body of a correction ("repair" / "improve") call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionRequest {
    pub content: String,
    pub category: DiagramCategory,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Reply of the correction service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CorrectionResponse {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub improved_content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CorrectionResponse {
    pub fn improved(content: impl Into<String>) -> Self {
        Self {
            success: true,
            improved_content: Some(content.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            improved_content: None,
            error: Some(error.into()),
        }
    }

    /// The candidate text, if the reply carries a usable one.
    /// A missing or blank `improvedContent` counts as no candidate.
    pub fn candidate(&self) -> Option<&str> {
        self.improved_content
            .as_deref()
            .filter(|c| self.success && !c.trim().is_empty())
    }

    pub fn from_json(json: &str) -> Result<Self, CollaboratorError> {
        Ok(serde_json::from_str(json)?)
    }
}

impl SaveRequest {
    pub fn to_json(&self) -> Result<String, CollaboratorError> {
        Ok(serde_json::to_string(self)?)
    }
}

impl CorrectionRequest {
    pub fn to_json(&self) -> Result<String, CollaboratorError> {
        Ok(serde_json::to_string(self)?)
    }
}

// ─── Collaborator traits ─────────────────────────────────────────────────

/// Stores diagram text. Timeouts are the implementor's concern.
pub trait Persistence {
    fn save(
        &self,
        request: SaveRequest,
    ) -> impl Future<Output = Result<(), CollaboratorError>> + Send;
}

/// Produces corrected or improved diagram text.
pub trait CorrectionService {
    fn correct(
        &self,
        request: CorrectionRequest,
    ) -> impl Future<Output = Result<CorrectionResponse, CollaboratorError>> + Send;
}

/// Decides whether text can be rendered. `Err` carries a readable reason.
pub trait Validator {
    fn validate(&self, category: DiagramCategory, text: &str) -> Result<(), String>;
}

/// Accepts text that the category adapter parses into a non-empty, lint-clean graph.
#[derive(Debug, Default, Clone, Copy)]
pub struct AdapterValidator;

impl Validator for AdapterValidator {
    fn validate(&self, category: DiagramCategory, text: &str) -> Result<(), String> {
        let graph = registry()
            .get(category)
            .parse(text)
            .map_err(|e| e.to_string())?;
        if graph.is_empty() {
            return Err(format!("no {category} diagram elements found"));
        }
        Ok(())
    }
}
