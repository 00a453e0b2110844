// bases/download_server/src/error.rs
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("startup precondition failed: {0}")]
    Startup(#[from] media_probe::ProbeError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
