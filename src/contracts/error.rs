use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    /// The key is empty or otherwise unusable. Client error, never retried.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// The backing store could not be reached or rejected the write.
    /// Transient; safe for the caller to retry, the service itself does not.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be decoded as a counter record. Fatal
    /// data-integrity condition, never coerced to a count.
    #[error("Serialization error: {0}")]
    Serialization(String),
}
