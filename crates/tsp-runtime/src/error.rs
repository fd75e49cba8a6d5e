use thiserror::Error;

use crate::controller::ControllerError;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("controller error: {0}")]
    Controller(#[from] ControllerError),

    #[error(transparent)]
    Core(#[from] tsp_core::TspError),

    #[error("scheduler has been shut down")]
    Stopped,

    #[error("no tokio runtime available: the scheduler must be created inside a runtime")]
    NoRuntime,

    #[error("all job ids are held by live jobs")]
    JobIdsExhausted,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RuntimeError>;
