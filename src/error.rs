use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to create {}: {source}", path.display())]
    CreateOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write {}: {source}", path.display())]
    WriteOutput {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize scope tree: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("workload thread {0} panicked")]
    WorkerPanicked(usize),

    #[error("{0}")]
    InvalidArgument(String),
}
