use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Index operation failed: {0}")]
    Index(String),

    #[error("Search unavailable: {0}")]
    Search(String),

    #[error("Queue operation failed: {0}")]
    Queue(String),

    #[error("Queue is full ({capacity} items pending)")]
    QueueFull { capacity: usize },

    #[error("Issue store failed: {0}")]
    Store(String),

    #[error("Operation failed: {0}")]
    Operation(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
