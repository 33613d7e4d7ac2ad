//! # Classified Errors
//!
//! A closed taxonomy every remote-facing failure is normalized into. Callers
//! show `user_message` and `suggested_action` instead of raw technical text,
//! and use `is_recoverable`/`retry_after` to decide whether to retry.
//!
//! ## Code Groups
//!
//! | Group          | Codes |
//! |----------------|-------|
//! | Credentials    | `InvalidCredentials`, `CredentialsExpired`, `AccessDenied`, `CredentialStorageFailed` |
//! | File           | `FileNotFound`, `FilePermissionDenied`, `FileAlreadyExists`, `FileTooLarge`, `FileReadFailed` |
//! | Upload         | `UploadFailed`, `MultipartUploadFailed`, `ChecksumMismatch` |
//! | Network        | `NetworkError`, `ConnectionTimeout`, `DnsResolutionFailed` |
//! | Remote service | `BucketNotFound`, `ObjectNotFound`, `ServiceUnavailable`, `PresignedUrlFailed`, `QuotaExceeded` |
//! | Local store    | `DatabaseError`, `DatabaseConnectionFailed`, `DatabaseLocked`, `RecordNotFound`, `DuplicateRecord` |
//! | Validation     | `InvalidInput`, `InvalidFileName` |
//! | Configuration  | `InvalidConfiguration`, `MissingConfiguration` |
//! | App state      | `Canceled`, `OperationInProgress`, `NotInitialized` |
//! | Unknown        | `UnknownError` |

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::error::Error as StdError;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Boxed error accepted by the classifier and stored as a cause
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Stable error code
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Credentials and authorization
    InvalidCredentials,
    CredentialsExpired,
    AccessDenied,
    CredentialStorageFailed,

    // Local files
    FileNotFound,
    FilePermissionDenied,
    FileAlreadyExists,
    FileTooLarge,
    FileReadFailed,

    // Upload transfer
    UploadFailed,
    MultipartUploadFailed,
    ChecksumMismatch,

    // Network
    NetworkError,
    ConnectionTimeout,
    DnsResolutionFailed,

    // Remote service
    BucketNotFound,
    ObjectNotFound,
    ServiceUnavailable,
    PresignedUrlFailed,
    QuotaExceeded,

    // Local store
    DatabaseError,
    DatabaseConnectionFailed,
    DatabaseLocked,
    RecordNotFound,
    DuplicateRecord,

    // Validation
    InvalidInput,
    InvalidFileName,

    // Configuration
    InvalidConfiguration,
    MissingConfiguration,

    // Application state
    Canceled,
    OperationInProgress,
    NotInitialized,

    UnknownError,
}

/// Taxonomy group of an [`ErrorCode`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    Credentials,
    File,
    Upload,
    Network,
    RemoteService,
    LocalStore,
    Validation,
    Configuration,
    AppState,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        use ErrorCode::*;

        match self {
            InvalidCredentials => "INVALID_CREDENTIALS",
            CredentialsExpired => "CREDENTIALS_EXPIRED",
            AccessDenied => "ACCESS_DENIED",
            CredentialStorageFailed => "CREDENTIAL_STORAGE_FAILED",
            FileNotFound => "FILE_NOT_FOUND",
            FilePermissionDenied => "FILE_PERMISSION_DENIED",
            FileAlreadyExists => "FILE_ALREADY_EXISTS",
            FileTooLarge => "FILE_TOO_LARGE",
            FileReadFailed => "FILE_READ_FAILED",
            UploadFailed => "UPLOAD_FAILED",
            MultipartUploadFailed => "MULTIPART_UPLOAD_FAILED",
            ChecksumMismatch => "CHECKSUM_MISMATCH",
            NetworkError => "NETWORK_ERROR",
            ConnectionTimeout => "CONNECTION_TIMEOUT",
            DnsResolutionFailed => "DNS_RESOLUTION_FAILED",
            BucketNotFound => "BUCKET_NOT_FOUND",
            ObjectNotFound => "OBJECT_NOT_FOUND",
            ServiceUnavailable => "SERVICE_UNAVAILABLE",
            PresignedUrlFailed => "PRESIGNED_URL_FAILED",
            QuotaExceeded => "QUOTA_EXCEEDED",
            DatabaseError => "DATABASE_ERROR",
            DatabaseConnectionFailed => "DATABASE_CONNECTION_FAILED",
            DatabaseLocked => "DATABASE_LOCKED",
            RecordNotFound => "RECORD_NOT_FOUND",
            DuplicateRecord => "DUPLICATE_RECORD",
            InvalidInput => "INVALID_INPUT",
            InvalidFileName => "INVALID_FILE_NAME",
            InvalidConfiguration => "INVALID_CONFIGURATION",
            MissingConfiguration => "MISSING_CONFIGURATION",
            Canceled => "CANCELED",
            OperationInProgress => "OPERATION_IN_PROGRESS",
            NotInitialized => "NOT_INITIALIZED",
            UnknownError => "UNKNOWN_ERROR",
        }
    }

    pub fn category(&self) -> ErrorCategory {
        use ErrorCode::*;

        match self {
            InvalidCredentials | CredentialsExpired | AccessDenied | CredentialStorageFailed => {
                ErrorCategory::Credentials
            }
            FileNotFound | FilePermissionDenied | FileAlreadyExists | FileTooLarge
            | FileReadFailed => ErrorCategory::File,
            UploadFailed | MultipartUploadFailed | ChecksumMismatch => ErrorCategory::Upload,
            NetworkError | ConnectionTimeout | DnsResolutionFailed => ErrorCategory::Network,
            BucketNotFound | ObjectNotFound | ServiceUnavailable | PresignedUrlFailed
            | QuotaExceeded => ErrorCategory::RemoteService,
            DatabaseError | DatabaseConnectionFailed | DatabaseLocked | RecordNotFound
            | DuplicateRecord => ErrorCategory::LocalStore,
            InvalidInput | InvalidFileName => ErrorCategory::Validation,
            InvalidConfiguration | MissingConfiguration => ErrorCategory::Configuration,
            Canceled | OperationInProgress | NotInitialized => ErrorCategory::AppState,
            UnknownError => ErrorCategory::Unknown,
        }
    }

    /// Transient failures where trying again later can succeed
    pub fn is_recoverable(&self) -> bool {
        self.retry_after().is_some()
    }

    /// Suggested wait before retrying; `None` outside the recoverable set
    pub fn retry_after(&self) -> Option<Duration> {
        use ErrorCode::*;

        let secs = match self {
            NetworkError => 5,
            ConnectionTimeout => 10,
            DnsResolutionFailed => 30,
            ServiceUnavailable => 30,
            DatabaseConnectionFailed => 5,
            DatabaseLocked => 3,
            _ => return None,
        };
        Some(Duration::from_secs(secs))
    }

    pub fn suggested_action(&self) -> Option<&'static str> {
        use ErrorCode::*;

        let action = match self {
            InvalidCredentials => "Check the access key and secret in your storage settings.",
            CredentialsExpired => "Refresh your credentials and sign in again.",
            AccessDenied => "Make sure your credentials are allowed to access this bucket.",
            CredentialStorageFailed => "Check that the system keychain is unlocked and try again.",
            FileNotFound => "Check that the file still exists at its original location.",
            FilePermissionDenied => "Check the file permissions and try again.",
            FileTooLarge => "Choose a smaller file or raise the size limit in settings.",
            BucketNotFound => "Verify the bucket name and region in your storage settings.",
            QuotaExceeded => "Free up space in the bucket or raise its quota.",
            InvalidConfiguration | MissingConfiguration => {
                "Review your storage settings and save them again."
            }
            NetworkError | DnsResolutionFailed => "Check your internet connection and try again.",
            ConnectionTimeout | ServiceUnavailable => "Try again in a few moments.",
            DatabaseLocked | DatabaseConnectionFailed => {
                "Close other copies of the application and try again."
            }
            _ => return None,
        };
        Some(action)
    }

    /// Default user-facing text; `UnknownError` uses the original message instead.
    pub fn user_message(&self) -> &'static str {
        use ErrorCode::*;

        match self {
            InvalidCredentials => "The storage credentials are not valid.",
            CredentialsExpired => "Your storage credentials have expired.",
            AccessDenied => "Access to the storage bucket was denied.",
            CredentialStorageFailed => "Your credentials could not be saved securely.",
            FileNotFound => "The file could not be found.",
            FilePermissionDenied => "You do not have permission to access this file.",
            FileAlreadyExists => "A file with this name already exists.",
            FileTooLarge => "The file is too large to share.",
            FileReadFailed => "The file could not be read.",
            UploadFailed => "The upload failed.",
            MultipartUploadFailed => "The upload failed partway through.",
            ChecksumMismatch => "The uploaded file did not match the original.",
            NetworkError => "A network error occurred.",
            ConnectionTimeout => "The connection timed out.",
            DnsResolutionFailed => "The storage server could not be reached.",
            BucketNotFound => "The storage bucket does not exist.",
            ObjectNotFound => "The shared file no longer exists in storage.",
            ServiceUnavailable => "The storage service is currently unavailable.",
            PresignedUrlFailed => "A share link could not be created.",
            QuotaExceeded => "The storage quota has been exceeded.",
            DatabaseError => "The local catalog reported an error.",
            DatabaseConnectionFailed => "The local catalog could not be opened.",
            DatabaseLocked => "The local catalog is busy.",
            RecordNotFound => "The shared file is not in the catalog.",
            DuplicateRecord => "This file is already in the catalog.",
            InvalidInput => "Some of the provided values are not valid.",
            InvalidFileName => "The file name is not valid.",
            InvalidConfiguration => "The storage configuration is not valid.",
            MissingConfiguration => "Storage has not been configured yet.",
            Canceled => "The operation was canceled.",
            OperationInProgress => "Another operation is already running.",
            NotInitialized => "The application is still starting up.",
            UnknownError => "An unexpected error occurred.",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A normalized failure
///
/// Fields are fixed at construction; the `with_*` methods consume and return
/// the value so a classified error can be enriched before it is handed out.
#[derive(Clone, Serialize)]
pub struct ClassifiedError {
    code: ErrorCode,
    message: String,
    user_message: String,
    #[serde(skip)]
    cause: Option<Arc<dyn StdError + Send + Sync + 'static>>,
    recoverable: bool,
    retry_after: Option<Duration>,
    suggested_action: Option<String>,
    context: BTreeMap<String, String>,
    created_at: DateTime<Utc>,
}

impl ClassifiedError {
    /// Build an error for `code`, filling recoverability, retry hint,
    /// suggested action and user message from the code tables.
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        let message = message.into();
        let user_message = match code {
            ErrorCode::UnknownError => message.clone(),
            known => known.user_message().to_string(),
        };

        Self {
            code,
            user_message,
            message,
            cause: None,
            recoverable: code.is_recoverable(),
            retry_after: code.retry_after(),
            suggested_action: code.suggested_action().map(str::to_string),
            context: BTreeMap::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_cause(mut self, cause: impl Into<BoxError>) -> Self {
        self.cause = Some(Arc::from(cause.into()));
        self
    }

    pub(crate) fn with_shared_cause(mut self, cause: Arc<dyn StdError + Send + Sync>) -> Self {
        self.cause = Some(cause);
        self
    }

    pub fn with_user_message(mut self, user_message: impl Into<String>) -> Self {
        self.user_message = user_message.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.context.insert(key.into(), value.to_string());
        self
    }

    pub fn code(&self) -> ErrorCode {
        self.code
    }

    pub fn category(&self) -> ErrorCategory {
        self.code.category()
    }

    /// Technical message for logs
    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn cause(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.cause.as_deref()
    }

    pub fn is_recoverable(&self) -> bool {
        self.recoverable
    }

    pub fn retry_after(&self) -> Option<Duration> {
        self.retry_after
    }

    pub fn suggested_action(&self) -> Option<&str> {
        self.suggested_action.as_deref()
    }

    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

impl fmt::Debug for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClassifiedError")
            .field("code", &self.code)
            .field("message", &self.message)
            .field("recoverable", &self.recoverable)
            .field("retry_after", &self.retry_after)
            .field("context", &self.context)
            .field("cause", &self.cause.as_ref().map(|c| c.to_string()))
            .finish_non_exhaustive()
    }
}

impl fmt::Display for ClassifiedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl StdError for ClassifiedError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.cause
            .as_deref()
            .map(|cause| cause as &(dyn StdError + 'static))
    }
}

// The cause is an opaque trait object and takes no part in equality.
impl PartialEq for ClassifiedError {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.message == other.message
            && self.user_message == other.user_message
            && self.recoverable == other.recoverable
            && self.retry_after == other.retry_after
            && self.suggested_action == other.suggested_action
            && self.context == other.context
            && self.created_at == other.created_at
    }
}
