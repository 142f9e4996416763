//! Template Manifest YAML Parser
//!
//! This module provides infrastructure for parsing workflow-template YAML
//! manifests into domain objects.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Parse external YAML → Domain objects
//! - **Anti-Corruption:** Translates YAML schema to domain model
//!
//! # Manifest Format
//!
//! ```yaml
//! apiVersion: caseflow.dev/v1
//! kind: WorkflowTemplate
//! metadata:
//!   programKey: foreclosure_stabilization_v1
//!   version: 1
//!   name: Foreclosure Stabilization v1
//! steps:
//!   - stepKey: contact_homeowner
//!     displayName: Contact Homeowner
//!     responsibleRole: operator
//!     requiredActions:
//!       - contact_attempt_logged
//!     blockingConditions:
//!       - requires_valid_contact_channel
//!     displayColumn: Contact & Qualification
//!     slaDays: 3
//! ```
//!
//! Step order is the list order; `order_index` is assigned from position.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use crate::domain::workflow::{
    ResponsibleRole, StepKey, TemplateDefinition, TemplateError, TemplateId, WorkflowStep,
    WorkflowTemplate,
};

pub const MANIFEST_API_VERSION: &str = "caseflow.dev/v1";
pub const MANIFEST_KIND: &str = "WorkflowTemplate";

// ============================================================================
// YAML Schema (External Representation)
// ============================================================================

/// External YAML representation of a template manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateManifest {
    pub api_version: String,
    pub kind: String,
    pub metadata: TemplateMetadataYaml,
    pub steps: Vec<TemplateStepYaml>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateMetadataYaml {
    pub program_key: String,
    pub version: i32,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateStepYaml {
    pub step_key: String,
    pub display_name: String,
    pub responsible_role: ResponsibleRole,
    #[serde(default)]
    pub required_documents: Vec<String>,
    #[serde(default)]
    pub required_actions: Vec<String>,
    #[serde(default)]
    pub blocking_conditions: Vec<String>,
    pub display_column: String,
    #[serde(default)]
    pub auto_advance: bool,
    pub sla_days: i64,
}

// ============================================================================
// Parser
// ============================================================================

pub struct TemplateManifestParser;

impl TemplateManifestParser {
    /// Parse a manifest file into a validated domain template
    pub fn parse_file<P: AsRef<Path>>(path: P) -> Result<TemplateDefinition, ManifestError> {
        let yaml = fs::read_to_string(path.as_ref())
            .map_err(|e| ManifestError::Io(path.as_ref().display().to_string(), e))?;
        Self::parse_str(&yaml)
    }

    /// Parse manifest YAML into a validated domain template
    pub fn parse_str(yaml: &str) -> Result<TemplateDefinition, ManifestError> {
        let manifest: TemplateManifest = serde_yaml::from_str(yaml)?;
        Self::to_domain(manifest)
    }

    /// Serialize a domain template back to manifest YAML
    pub fn to_yaml(definition: &TemplateDefinition) -> Result<String, ManifestError> {
        let manifest = TemplateManifest {
            api_version: MANIFEST_API_VERSION.to_string(),
            kind: MANIFEST_KIND.to_string(),
            metadata: TemplateMetadataYaml {
                program_key: definition.template.program_key.clone(),
                version: definition.template.version,
                name: definition.template.name.clone(),
            },
            steps: definition
                .steps()
                .iter()
                .map(|step| TemplateStepYaml {
                    step_key: step.step_key.as_str().to_string(),
                    display_name: step.display_name.clone(),
                    responsible_role: step.responsible_role,
                    required_documents: step.required_documents.iter().cloned().collect(),
                    required_actions: step.required_actions.iter().cloned().collect(),
                    blocking_conditions: step.blocking_conditions.clone(),
                    display_column: step.display_column.clone(),
                    auto_advance: step.auto_advance,
                    sla_days: step.sla_days,
                })
                .collect(),
        };
        Ok(serde_yaml::to_string(&manifest)?)
    }

    /// Convert the external schema to the validated domain aggregate
    fn to_domain(manifest: TemplateManifest) -> Result<TemplateDefinition, ManifestError> {
        if manifest.api_version != MANIFEST_API_VERSION {
            return Err(ManifestError::InvalidApiVersion(manifest.api_version));
        }
        if manifest.kind != MANIFEST_KIND {
            return Err(ManifestError::InvalidKind(manifest.kind));
        }

        let template = WorkflowTemplate {
            id: TemplateId::new(),
            program_key: manifest.metadata.program_key,
            version: manifest.metadata.version,
            name: manifest.metadata.name,
            created_at: chrono::Utc::now(),
        };

        let steps = manifest
            .steps
            .into_iter()
            .enumerate()
            .map(|(i, step)| {
                Ok(WorkflowStep {
                    template_id: template.id,
                    step_key: StepKey::new(step.step_key)?,
                    display_name: step.display_name,
                    responsible_role: step.responsible_role,
                    required_documents: step.required_documents.into_iter().collect::<BTreeSet<_>>(),
                    required_actions: step.required_actions.into_iter().collect::<BTreeSet<_>>(),
                    blocking_conditions: step.blocking_conditions,
                    display_column: step.display_column,
                    order_index: (i + 1) as i32,
                    auto_advance: step.auto_advance,
                    sla_days: step.sla_days,
                })
            })
            .collect::<Result<Vec<_>, TemplateError>>()?;

        Ok(TemplateDefinition::new(template, steps)?)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read manifest '{0}': {1}")]
    Io(String, #[source] std::io::Error),

    #[error("Failed to parse manifest YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Invalid API version: expected '{MANIFEST_API_VERSION}', got '{0}'")]
    InvalidApiVersion(String),

    #[error("Invalid kind: expected '{MANIFEST_KIND}', got '{0}'")]
    InvalidKind(String),

    #[error(transparent)]
    Template(#[from] TemplateError),
}

#[cfg(test)]
mod tests {
    use super::*;

    const MANIFEST: &str = r#"
apiVersion: caseflow.dev/v1
kind: WorkflowTemplate
metadata:
  programKey: test_program
  version: 1
  name: Test Program
steps:
  - stepKey: intake
    displayName: Intake
    responsibleRole: system
    requiredActions:
      - case_created
    displayColumn: Intake
    autoAdvance: true
    slaDays: 1
  - stepKey: review
    displayName: Review
    responsibleRole: operator
    requiredDocuments:
      - id_verification
    blockingConditions:
      - requires_valid_contact_channel
    displayColumn: Review
    slaDays: 5
"#;

    #[test]
    fn test_parse_manifest() {
        let definition = TemplateManifestParser::parse_str(MANIFEST).unwrap();
        assert_eq!(definition.template.program_key, "test_program");
        assert_eq!(definition.template.version, 1);
        assert_eq!(definition.steps().len(), 2);

        let intake = definition.first_step();
        assert_eq!(intake.step_key.as_str(), "intake");
        assert_eq!(intake.order_index, 1);
        assert!(intake.auto_advance);
        assert!(intake.required_actions.contains("case_created"));

        let review = &definition.steps()[1];
        assert_eq!(review.order_index, 2);
        assert!(!review.auto_advance);
        assert!(review.required_documents.contains("id_verification"));
        assert_eq!(
            review.blocking_conditions,
            vec!["requires_valid_contact_channel"]
        );
    }

    #[test]
    fn test_rejects_wrong_api_version() {
        let yaml = MANIFEST.replace("caseflow.dev/v1", "caseflow.dev/v2");
        let result = TemplateManifestParser::parse_str(&yaml);
        assert!(matches!(result, Err(ManifestError::InvalidApiVersion(_))));
    }

    #[test]
    fn test_rejects_wrong_kind() {
        let yaml = MANIFEST.replace("kind: WorkflowTemplate", "kind: Workflow");
        let result = TemplateManifestParser::parse_str(&yaml);
        assert!(matches!(result, Err(ManifestError::InvalidKind(_))));
    }

    #[test]
    fn test_yaml_round_trip() {
        let definition = TemplateManifestParser::parse_str(MANIFEST).unwrap();
        let yaml = TemplateManifestParser::to_yaml(&definition).unwrap();
        let reparsed = TemplateManifestParser::parse_str(&yaml).unwrap();
        assert_eq!(reparsed.template.program_key, definition.template.program_key);
        assert_eq!(reparsed.steps().len(), definition.steps().len());
    }
}
