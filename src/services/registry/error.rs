use tonic::Status;

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("Invalid token")]
    InvalidToken,
    #[error("Invalid registration: {0}")]
    InvalidRegistration(String),
    #[error("Unknown instance: {0}")]
    UnknownInstance(String),
}

impl From<RegistryError> for Status {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::InvalidToken => Status::unauthenticated(err.to_string()),
            RegistryError::InvalidRegistration(_) => Status::invalid_argument(err.to_string()),
            RegistryError::UnknownInstance(_) => Status::not_found(err.to_string()),
        }
    }
}
