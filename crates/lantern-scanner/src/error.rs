use thiserror::Error;

#[derive(Debug, Error)]
pub enum ScanError {
    #[error("worker pool is closed")]
    PoolClosed,

    #[error("failed to launch worker: {0}")]
    WorkerLaunch(String),

    #[error("stage {stage} panicked for route {route}")]
    StagePanicked { stage: String, route: String },
}

pub type Result<T> = std::result::Result<T, ScanError>;
