use thiserror::Error;

#[derive(Error, Debug)]
pub enum CloudError {
    #[error("cloud api error: {0}")]
    Api(String),

    #[error("no network interface specification matches zone group {zone}")]
    NoInterfacesForZone { zone: String },
}
