use std::collections::BTreeMap;

use async_trait::async_trait;
use thiserror::Error;

/// Generated project files, keyed by path.
pub type ProjectFiles = BTreeMap<String, Vec<u8>>;

/// Source-control backend failure.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceControlError {
    /// The repository does not exist.
    #[error("repository '{repo}' not found")]
    RepositoryNotFound { repo: String },

    /// Any other failure.
    #[error("source control '{operation}' failed: {reason}")]
    Failed { operation: String, reason: String },
}

impl SourceControlError {
    /// Create a repository not found error.
    pub fn repository_not_found(repo: impl Into<String>) -> Self {
        Self::RepositoryNotFound { repo: repo.into() }
    }

    /// Create a generic failure.
    pub fn failed(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Failed {
            operation: operation.into(),
            reason: reason.into(),
        }
    }
}

/// Stores generated project artifacts.
#[async_trait]
pub trait SourceControlBackend: Send + Sync {
    /// Create the repository if needed, commit `files`, register the webhook
    /// and return the clone URL.
    async fn create_or_update_project_files(
        &self,
        repo: &str,
        commit_message: &str,
        files: &ProjectFiles,
        webhook_url: &str,
    ) -> Result<String, SourceControlError>;

    /// Clone URL of an existing repository.
    async fn clone_url(&self, repo: &str) -> Result<String, SourceControlError>;
}
