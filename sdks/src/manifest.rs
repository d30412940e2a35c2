// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool manifests (`kind: Tool`)
//!
//! Declares a tool the way a consumer sees it: its code reference, parameter
//! schema, result schemas, and the policies it supports. Phase bodies live on
//! the executor, so manifest tools are remote-only and manifest policies have
//! no local phases unless a local definition is supplied.
//!
//! ```yaml
//! apiVersion: warrant/v1
//! kind: Tool
//! metadata:
//!   name: native-send
//! spec:
//!   package_name: "@warrant/native-send"
//!   tool_ipfs_cid: QmNativeSend
//!   parameters: { type: object, properties: { amount: { type: integer } } }
//!   execute:
//!     success: { type: object, required: [txHash] }
//!   policies:
//!     - package_name: "@warrant/spend-limit"
//!       parameters: { type: object, properties: { amountUsd: { type: integer } } }
//!       mapping: { amount: amountUsd }
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

use warrant_core::domain::client_config::{ManifestMetadata, API_VERSION};
use warrant_core::domain::policy::{PolicyDefinition, PolicyId};
use warrant_core::domain::schema::{OutcomeSchemas, ResultSchema, SchemaContract, SchemaError};
use warrant_core::domain::tool::{ParameterMapping, ToolDefinition};

pub const TOOL_KIND: &str = "Tool";

#[derive(Debug, Error)]
pub enum ManifestError {
    #[error("failed to read manifest {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse manifest: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid apiVersion '{0}', expected '{expected}'", expected = API_VERSION)]
    ApiVersion(String),

    #[error("invalid kind '{0}', expected '{expected}'", expected = TOOL_KIND)]
    Kind(String),

    #[error("invalid contract in manifest: {0}")]
    Contract(#[from] SchemaError),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ToolManifestSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolManifestSpec {
    pub package_name: String,

    /// Content identifier the executor runs.
    pub tool_ipfs_cid: String,

    /// JSON Schema for the tool parameters
    pub parameters: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precheck: Option<ResultSchemasSpec>,

    #[serde(default)]
    pub execute: ResultSchemasSpec,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub policies: Vec<SupportedPolicySpec>,
}

/// Absent branch schema means the branch carries no value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ResultSchemasSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub success: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupportedPolicySpec {
    pub package_name: String,

    pub parameters: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_parameters: Option<Value>,

    /// tool parameter name → policy parameter name
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mapping: BTreeMap<String, String>,
}

impl ResultSchemasSpec {
    fn to_schemas(&self, owner: &str, phase: &str) -> Result<OutcomeSchemas, ManifestError> {
        let branch = |name: &str, raw: &Option<Value>| -> Result<ResultSchema, ManifestError> {
            match raw {
                Some(raw) => Ok(ResultSchema::value(SchemaContract::from_value(
                    format!("{owner} {phase} {name}"),
                    raw.clone(),
                )?)),
                None => Ok(ResultSchema::NoValue),
            }
        };
        Ok(OutcomeSchemas::new(
            branch("success", &self.success)?,
            branch("failure", &self.failure)?,
        ))
    }
}

impl SupportedPolicySpec {
    /// Phase-less definition: evaluation happens on the executor.
    fn to_definition(&self) -> Result<PolicyDefinition, ManifestError> {
        let mut builder = PolicyDefinition::builder(self.package_name.as_str()).params_schema(
            SchemaContract::from_value(format!("{} parameters", self.package_name), self.parameters.clone())?,
        );
        if let Some(raw) = &self.user_parameters {
            builder = builder.user_params_schema(SchemaContract::from_value(
                format!("{} user parameters", self.package_name),
                raw.clone(),
            )?);
        }
        Ok(builder.build()?)
    }

    fn to_mapping(&self) -> ParameterMapping {
        self.mapping
            .iter()
            .map(|(tool, policy)| (tool.clone(), policy.clone()))
            .collect()
    }
}

impl ToolManifest {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ManifestError> {
        let manifest: Self = serde_yaml::from_str(yaml)?;
        manifest.validate()?;
        Ok(manifest)
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self, ManifestError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn to_yaml_str(&self) -> Result<String, ManifestError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn validate(&self) -> Result<(), ManifestError> {
        if self.api_version != API_VERSION {
            return Err(ManifestError::ApiVersion(self.api_version.clone()));
        }
        if self.kind != TOOL_KIND {
            return Err(ManifestError::Kind(self.kind.clone()));
        }
        Ok(())
    }

    pub fn into_definition(self) -> Result<ToolDefinition, ManifestError> {
        self.into_definition_with(&[])
    }

    /// Build the definition, substituting locally implemented policies for
    /// the phase-less declarations with the same package name.
    pub fn into_definition_with(
        self,
        local_policies: &[Arc<PolicyDefinition>],
    ) -> Result<ToolDefinition, ManifestError> {
        self.validate()?;
        let spec = self.spec;
        let owner = spec.package_name.clone();

        let mut builder = ToolDefinition::builder(spec.package_name, spec.tool_ipfs_cid).params_schema(
            SchemaContract::from_value(format!("{owner} parameters"), spec.parameters)?,
        );

        for policy in &spec.policies {
            let id = PolicyId::from(policy.package_name.as_str());
            let definition = match local_policies.iter().find(|local| local.id() == &id) {
                Some(local) => local.clone(),
                None => Arc::new(policy.to_definition()?),
            };
            builder = builder.supported_policy(definition, policy.to_mapping());
        }

        if let Some(precheck) = &spec.precheck {
            builder = builder.precheck_remote(precheck.to_schemas(&owner, "precheck")?);
        }
        builder = builder.execute_remote(spec.execute.to_schemas(&owner, "execute")?);

        Ok(builder.build()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use warrant_core::domain::policy::{PolicyPhaseArgs, PolicyPhaseContext, PolicyPhaseKind};
    use warrant_core::domain::schema::VerdictSchemas;

    const SAMPLE: &str = r#"
apiVersion: warrant/v1
kind: Tool
metadata:
  name: native-send
spec:
  package_name: "@warrant/native-send"
  tool_ipfs_cid: QmNativeSend
  parameters:
    type: object
    properties:
      amount: { type: integer }
      to: { type: string }
    required: [amount, to]
  execute:
    success:
      type: object
      properties:
        txHash: { type: string }
      required: [txHash]
  policies:
    - package_name: "@warrant/spend-limit"
      parameters:
        type: object
        properties:
          amountUsd: { type: integer }
      user_parameters:
        type: object
        properties:
          maxUsd: { type: integer }
      mapping:
        amount: amountUsd
"#;

    #[test]
    fn test_parse_and_convert() {
        let manifest = ToolManifest::from_yaml_str(SAMPLE).unwrap();
        assert_eq!(manifest.metadata.name, "native-send");

        let tool = manifest.into_definition().unwrap();
        assert_eq!(tool.tool_ipfs_cid(), "QmNativeSend");
        assert!(tool.execute_phase().is_remote_only());
        assert!(tool.precheck_phase().is_none());

        let policy = tool
            .supported_policy(&PolicyId::from("@warrant/spend-limit"))
            .unwrap();
        assert!(policy.definition.phase(PolicyPhaseKind::Evaluate).is_none());
        assert!(policy.definition.user_params_schema().is_some());
        assert_eq!(
            policy.mapping.project(&json!({"amount": 3, "to": "0x1"})),
            json!({"amountUsd": 3})
        );
    }

    #[test]
    fn test_wrong_kind_rejected() {
        let yaml = SAMPLE.replace("kind: Tool", "kind: ClientConfig");
        assert!(matches!(
            ToolManifest::from_yaml_str(&yaml),
            Err(ManifestError::Kind(kind)) if kind == "ClientConfig"
        ));
    }

    #[test]
    fn test_mapping_to_unknown_parameter_rejected() {
        let yaml = SAMPLE.replace("amount: amountUsd", "amount: amountEth");
        let manifest = ToolManifest::from_yaml_str(&yaml).unwrap();
        assert!(matches!(manifest.into_definition(), Err(ManifestError::Contract(_))));
    }

    #[test]
    fn test_local_policy_replaces_declaration() {
        let local = Arc::new(
            PolicyDefinition::builder("@warrant/spend-limit")
                .params_schema(
                    SchemaContract::from_value(
                        "local",
                        json!({"type": "object", "properties": {"amountUsd": {"type": "integer"}}}),
                    )
                    .unwrap(),
                )
                .evaluate(VerdictSchemas::none(), |_a: PolicyPhaseArgs, ctx: PolicyPhaseContext| async move {
                    anyhow::Ok(ctx.allow_empty())
                })
                .build()
                .unwrap(),
        );

        let tool = ToolManifest::from_yaml_str(SAMPLE)
            .unwrap()
            .into_definition_with(&[local])
            .unwrap();
        let policy = tool
            .supported_policy(&PolicyId::from("@warrant/spend-limit"))
            .unwrap();
        assert!(policy.definition.phase(PolicyPhaseKind::Evaluate).is_some());
    }

    #[test]
    fn test_missing_file() {
        let err = ToolManifest::from_yaml_file("/nonexistent/tool.yaml").unwrap_err();
        assert!(matches!(err, ManifestError::Io { .. }));
    }
}
