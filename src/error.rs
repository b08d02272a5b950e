use std::path::PathBuf;

#[derive(thiserror::Error, Debug)]
pub enum PatchError {
    #[error("load failed for {path}: {reason}")]
    Load { path: PathBuf, reason: String },
    #[error("{0}")]
    Validation(String),
    #[error("patching failed: {0}")]
    Subprocess(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl PatchError {
    pub fn validation(message: impl Into<String>) -> Self {
        PatchError::Validation(message.into())
    }

    pub fn load(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        PatchError::Load {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}
