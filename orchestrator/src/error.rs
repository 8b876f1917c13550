/// The only failure `collect()` reports. Individual probe failures never
/// surface here.
#[derive(thiserror::Error, Debug)]
pub enum CollectError {
    #[error("Serializing the collected components failed: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("Hashing the collected components failed: {0}")]
    Hashing(eyre::Report),
}
