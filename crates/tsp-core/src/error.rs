use thiserror::Error;

#[derive(Debug, Error)]
pub enum TspError {
    #[error("invalid schedule: {0}")]
    InvalidSchedule(String),

    #[error("invalid phase {0}: phases are numbered 1-8 (0 means clear)")]
    InvalidPhase(u8),

    #[error("invalid controller backup time {0}s: must be at least 2 seconds")]
    InvalidBackupTime(u32),

    #[error("invalid interval: {0}")]
    InvalidInterval(String),

    #[error("invalid phase timing translation: {0}")]
    InvalidTranslation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TspError>;
