//! Errors returned by cache loads

use std::sync::Arc;

use taskqueue::TaskError;
use thiserror::Error;

/// A failed load.
///
/// Cloneable so every caller waiting on the same key gets the same error.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    #[error("failed to load {key}: {source}")]
    Load {
        key: String,
        #[source]
        source: Arc<TaskError>,
    },
}

impl LoadError {
    pub(crate) fn load(key: impl Into<String>, source: TaskError) -> Self {
        Self::Load {
            key: key.into(),
            source: Arc::new(source),
        }
    }

    pub fn key(&self) -> &str {
        match self {
            Self::Load { key, .. } => key,
        }
    }

    /// The scheduler error behind this failure
    pub fn task_error(&self) -> &TaskError {
        match self {
            Self::Load { source, .. } => source,
        }
    }
}
