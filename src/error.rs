//! Error types for the AWS operator
//!
//! The taxonomy separates conditions that are expected during convergence
//! (absent objects, objects already being deleted) from failures that must
//! abort a pass. Only the leaf existence checks convert the former into
//! non-error values; everything else propagates with context.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

/// An error returned by one of the AWS service clients.
///
/// `code` carries the service error code (e.g. `ValidationError`,
/// `AlreadyExistsException`), `message` the human-readable text.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AwsError {
    pub service: &'static str,
    pub code: String,
    pub message: String,
}

impl AwsError {
    pub fn new(service: &'static str, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            service,
            code: code.into(),
            message: message.into(),
        }
    }

    /// CloudFormation reports a missing stack as a `ValidationError` whose
    /// message contains "does not exist".
    pub fn is_stack_not_found(&self) -> bool {
        self.code == "ValidationError" && self.message.contains("does not exist")
    }

    pub fn is_already_exists(&self) -> bool {
        matches!(
            self.code.as_str(),
            "AlreadyExistsException" | "BucketAlreadyOwnedByYou" | "AlreadyExists"
        )
    }

    /// Operations against a stack that is already being deleted fail with a
    /// validation error naming the DELETE_IN_PROGRESS state.
    pub fn is_delete_in_progress(&self) -> bool {
        self.message.contains("DELETE_IN_PROGRESS")
            || self.message.to_lowercase().contains("delete in progress")
    }

    pub fn is_no_updates(&self) -> bool {
        self.message.contains("No updates are to be performed")
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self.code.as_str(),
            "NotFoundException" | "NoSuchBucket" | "NotFound" | "NoSuchKey"
        ) || self.is_stack_not_found()
    }

    /// Throttling, server-side faults and failures without a service code
    /// (dispatch errors, timeouts) are worth another attempt. Everything
    /// else, e.g. `AccessDenied` or a template `ValidationError`, fails the
    /// same way on every attempt.
    pub fn is_transient(&self) -> bool {
        matches!(
            self.code.as_str(),
            "Unknown"
                | "RequestTimeout"
                | "Throttling"
                | "ThrottlingException"
                | "RequestLimitExceeded"
                | "ServiceUnavailable"
                | "InternalFailure"
                | "InternalError"
        )
    }
}

impl fmt::Display for AwsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}: {}", self.service, self.code, self.message)
    }
}

impl std::error::Error for AwsError {}

#[derive(Error, Debug)]
pub enum Error {
    /// A required dependency or setting is missing. Fatal at construction.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// An external object is absent.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("delete in progress: {0}")]
    DeleteInProgress(String),

    /// A loosely typed payload could not be unpacked. Indicates a bug.
    #[error("wrong type: {0}")]
    WrongType(String),

    #[error("invalid version bundle: {0}")]
    InvalidVersionBundle(String),

    #[error("invalid account id: {0:?}")]
    InvalidAccountId(String),

    /// An unexpected failure of an external system.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    #[error("AWS API error: {0}")]
    Aws(#[from] AwsError),

    #[error("Kubernetes API error: {0}")]
    KubeError(#[from] kube::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("template error: {0}")]
    Template(#[from] minijinja::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Whether a failed resource call is worth another attempt.
    ///
    /// Programmer errors, misconfiguration and unroutable objects are not;
    /// external failures are.
    pub fn is_retriable(&self) -> bool {
        match self {
            Error::InvalidConfig(_)
            | Error::WrongType(_)
            | Error::InvalidVersionBundle(_)
            | Error::InvalidAccountId(_)
            | Error::SerializationError(_)
            | Error::Template(_) => false,
            Error::NotFound(_)
            | Error::AlreadyExists(_)
            | Error::DeleteInProgress(_)
            | Error::ExecutionFailed(_) => true,
            Error::Aws(e) => e.is_transient(),
            Error::KubeError(e) => !matches!(e, kube::Error::Api(resp) if resp.code == 400 || resp.code == 422),
        }
    }

    /// Short label used for metrics and events.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidConfig(_) => "invalid_config",
            Error::NotFound(_) => "not_found",
            Error::AlreadyExists(_) => "already_exists",
            Error::DeleteInProgress(_) => "delete_in_progress",
            Error::WrongType(_) => "wrong_type",
            Error::InvalidVersionBundle(_) => "invalid_version_bundle",
            Error::InvalidAccountId(_) => "invalid_account_id",
            Error::ExecutionFailed(_) => "execution_failed",
            Error::Aws(_) => "aws",
            Error::KubeError(_) => "kube",
            Error::SerializationError(_) => "serialization",
            Error::Template(_) => "template",
        }
    }

    pub fn is_not_found(&self) -> bool {
        match self {
            Error::NotFound(_) => true,
            Error::Aws(e) => e.is_not_found(),
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 404,
            _ => false,
        }
    }

    pub fn is_already_exists(&self) -> bool {
        match self {
            Error::AlreadyExists(_) => true,
            Error::Aws(e) => e.is_already_exists(),
            Error::KubeError(kube::Error::Api(resp)) => resp.code == 409,
            _ => false,
        }
    }

    pub fn is_delete_in_progress(&self) -> bool {
        match self {
            Error::DeleteInProgress(_) => true,
            Error::Aws(e) => e.is_delete_in_progress(),
            _ => false,
        }
    }

    pub fn is_stack_not_found(&self) -> bool {
        matches!(self, Error::Aws(e) if e.is_stack_not_found())
    }
}

/// Errors of loaders shared between concurrent cache callers come back
/// behind an `Arc`.
impl From<Arc<Error>> for Error {
    fn from(shared: Arc<Error>) -> Self {
        Arc::try_unwrap(shared).unwrap_or_else(|shared| shared.duplicate())
    }
}

impl Error {
    fn duplicate(&self) -> Error {
        match self {
            Error::InvalidConfig(s) => Error::InvalidConfig(s.clone()),
            Error::NotFound(s) => Error::NotFound(s.clone()),
            Error::AlreadyExists(s) => Error::AlreadyExists(s.clone()),
            Error::DeleteInProgress(s) => Error::DeleteInProgress(s.clone()),
            Error::WrongType(s) => Error::WrongType(s.clone()),
            Error::InvalidVersionBundle(s) => Error::InvalidVersionBundle(s.clone()),
            Error::InvalidAccountId(s) => Error::InvalidAccountId(s.clone()),
            Error::ExecutionFailed(s) => Error::ExecutionFailed(s.clone()),
            Error::Aws(e) => Error::Aws(e.clone()),
            other => Error::ExecutionFailed(other.to_string()),
        }
    }
}
