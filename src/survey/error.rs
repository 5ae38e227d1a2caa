use thiserror::Error;

use crate::index::error::IndexError;

/// Failures that abort a whole survey run
#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("Aborting survey while resolving {module}: {source}")]
    Fatal {
        module: String,
        #[source]
        source: IndexError,
    },
}

impl SurveyError {
    pub fn fatal(module: impl Into<String>, source: IndexError) -> Self {
        SurveyError::Fatal {
            module: module.into(),
            source,
        }
    }

    pub fn index_error(&self) -> &IndexError {
        match self {
            SurveyError::Fatal { source, .. } => source,
        }
    }
}
