//! Project artifacts pushed to source control.

use integrator_model::{Integration, Revision, RevisionSpec};
use itertools::Itertools;
use serde::Serialize;

use crate::backend::ProjectFiles;
use crate::error::{Error, Result};

/// Produces the files of an integration's deployable project.
pub trait ProjectGenerator: Send + Sync {
    /// Render the project for `integration` at `revision`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ProjectGeneration`] when a file cannot be rendered.
    fn generate(&self, integration: &Integration, revision: &Revision) -> Result<ProjectFiles>;
}

#[derive(Serialize)]
struct ProjectDocument<'a> {
    id: &'a str,
    name: &'a str,
    version: Option<u32>,
    #[serde(flatten)]
    revision: &'a RevisionSpec,
}

/// Writes `integration.json`, `integration.yml` and `README.md`.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultProjectGenerator;

impl DefaultProjectGenerator {
    fn readme(integration: &Integration, revision: &Revision) -> String {
        let steps = revision
            .steps()
            .iter()
            .map(|step| match &step.connector {
                Some(connector) => format!("- {} `{}` via {connector}", step.kind, step.name),
                None => format!("- {} `{}`", step.kind, step.name),
            })
            .join("\n");

        format!(
            "# {}\n\nGenerated project for integration `{}`.\n\n## Steps\n\n{}\n",
            integration.name,
            integration.id,
            if steps.is_empty() { "(none)".to_string() } else { steps }
        )
    }
}

impl ProjectGenerator for DefaultProjectGenerator {
    fn generate(&self, integration: &Integration, revision: &Revision) -> Result<ProjectFiles> {
        let document = ProjectDocument {
            id: integration.id.as_str(),
            name: &integration.name,
            version: revision.version,
            revision: &revision.spec,
        };

        let json = serde_json::to_vec_pretty(&document)
            .map_err(|e| Error::project_generation(format!("integration.json: {e}")))?;
        let yaml = serde_yaml::to_string(&document)
            .map_err(|e| Error::project_generation(format!("integration.yml: {e}")))?;

        let mut files = ProjectFiles::new();
        files.insert("integration.json".to_string(), json);
        files.insert("integration.yml".to_string(), yaml.into_bytes());
        files.insert(
            "README.md".to_string(),
            Self::readme(integration, revision).into_bytes(),
        );
        Ok(files)
    }
}

/// Turn a display name into a repository / deployment name.
///
/// Lowercases, maps runs of non-alphanumerics to a single `-` and trims
/// dashes at both ends.
pub fn sanitize_name(name: &str) -> String {
    name.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .join("-")
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use integrator_model::{IntegrationId, Step};

    use super::*;

    #[test]
    fn test_sanitize_name() {
        assert_eq!(sanitize_name("My Orders Flow"), "my-orders-flow");
        assert_eq!(sanitize_name("  --Salesforce -> DB!! "), "salesforce-db");
        assert_eq!(sanitize_name("a__b"), "a-b");
        assert_eq!(sanitize_name("***"), "");
    }

    #[test]
    fn test_default_generator_writes_three_files() {
        let integration = Integration::with_id(IntegrationId::new("i-1"), "Orders");
        let revision = Revision::from_steps(vec![
            Step::endpoint("from-sf", "salesforce").with_property("topic", "orders"),
            Step::new("log", "audit"),
        ])
        .with_version(4);

        let files = DefaultProjectGenerator.generate(&integration, &revision).unwrap();

        assert_eq!(
            files.keys().cloned().collect::<Vec<_>>(),
            vec!["README.md", "integration.json", "integration.yml"]
        );
        let json: serde_json::Value =
            serde_json::from_slice(&files["integration.json"]).unwrap();
        assert_eq!(json["id"], "i-1");
        assert_eq!(json["version"], 4);

        let readme = String::from_utf8(files["README.md"].clone()).unwrap();
        assert!(readme.contains("# Orders"));
        assert!(readme.contains("via salesforce"));
    }
}
