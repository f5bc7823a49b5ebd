use tonic::Status;

/// 领域服务统一错误类型
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    BusinessRule(String),
    #[error("{0}")]
    Validation(String),
    #[error("{0}")]
    AlreadyExists(String),
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    PermissionDenied(String),
    #[error("External service {service} error: {message}")]
    ExternalService { service: String, message: String },
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("Password hashing error: {0}")]
    PasswordHash(#[from] bcrypt::BcryptError),
    #[error("Internal error: {0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    /// "Expense not found with id : 5"
    pub fn not_found(resource: &str, field: &str, value: impl std::fmt::Display) -> Self {
        Self::NotFound(format!("{resource} not found with {field} : {value}"))
    }

    pub fn external(service: &str, message: impl Into<String>) -> Self {
        Self::ExternalService {
            service: service.to_string(),
            message: message.into(),
        }
    }
}

fn generate_trace_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()[..8].to_string()
}

impl From<ServiceError> for Status {
    fn from(err: ServiceError) -> Self {
        let trace_id = generate_trace_id();

        let mut status = match &err {
            ServiceError::NotFound(msg) => {
                tracing::warn!(trace_id = %trace_id, message = %msg, "Resource not found");
                Status::not_found(msg.clone())
            }
            ServiceError::BusinessRule(msg) => {
                tracing::warn!(trace_id = %trace_id, message = %msg, "Business rule violation");
                Status::invalid_argument(msg.clone())
            }
            ServiceError::Validation(msg) => {
                tracing::warn!(trace_id = %trace_id, message = %msg, "Validation error");
                Status::invalid_argument(msg.clone())
            }
            ServiceError::AlreadyExists(msg) => {
                tracing::warn!(trace_id = %trace_id, message = %msg, "Resource already exists");
                Status::already_exists(msg.clone())
            }
            ServiceError::Unauthenticated(msg) => {
                tracing::warn!(trace_id = %trace_id, message = %msg, "Unauthenticated request");
                Status::unauthenticated(msg.clone())
            }
            ServiceError::PermissionDenied(msg) => {
                tracing::warn!(trace_id = %trace_id, message = %msg, "Permission denied");
                Status::permission_denied(msg.clone())
            }
            ServiceError::ExternalService { service, message } => {
                tracing::warn!(
                    trace_id = %trace_id,
                    service = %service,
                    message = %message,
                    "External service error"
                );
                Status::unavailable("Service temporarily unavailable. Please try again later.")
            }
            ServiceError::Database(e) => {
                tracing::error!(trace_id = %trace_id, error = %e, "Database error");
                Status::internal("An unexpected error occurred")
            }
            ServiceError::PasswordHash(e) => {
                tracing::error!(trace_id = %trace_id, error = %e, "Password hashing error");
                Status::internal("An unexpected error occurred")
            }
            ServiceError::Internal(msg) => {
                tracing::error!(trace_id = %trace_id, message = %msg, "Unexpected error");
                Status::internal("An unexpected error occurred")
            }
        };

        if let Ok(value) = trace_id.parse() {
            status.metadata_mut().insert("x-trace-id", value);
        }
        status
    }
}
