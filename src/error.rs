use thiserror::Error;

pub type ConvertResult<T> = Result<T, ConvertError>;

#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Read error: {0}")]
    Read(String),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Unsupported file format: {0}")]
    UnsupportedFormat(String),

    #[error("Profile error: {0}")]
    Profile(String),

    #[error("cancelled due to missing columns: {}", .0.join(", "))]
    MissingColumnsAbort(Vec<String>),

    #[error("{context}: {source}")]
    Processing {
        context: &'static str,
        source: Box<ConvertError>,
    },

    #[error("Worker error: {0}")]
    Worker(String),
}

impl ConvertError {
    /// Wrap an error raised while handling a header or a row
    pub fn processing(context: &'static str, source: ConvertError) -> Self {
        ConvertError::Processing {
            context,
            source: Box::new(source),
        }
    }

    /// True when the sink failed, looking through processing wrappers.
    pub fn is_write_failure(&self) -> bool {
        match self {
            ConvertError::Write(_) => true,
            ConvertError::Processing { source, .. } => source.is_write_failure(),
            _ => false,
        }
    }
}
