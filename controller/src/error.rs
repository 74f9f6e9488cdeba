use thiserror::Error;

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Pricing(#[from] pricing::error::PricingError),

    #[error(transparent)]
    Cloud(#[from] cloud::error::CloudError),
}
