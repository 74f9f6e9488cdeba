use thiserror::Error;

#[derive(Error, Debug)]
pub enum PricingError {
    #[error(transparent)]
    Cloud(#[from] cloud::error::CloudError),

    #[error("failed to write price file: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode price file: {0}")]
    Encode(#[from] serde_json::Error),
}
