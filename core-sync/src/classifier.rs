//! # Error Classifier
//!
//! Maps any failure into a [`ClassifiedError`]. Classification is total and
//! deterministic, and classifying an already-classified error returns it
//! unchanged.
//!
//! Rules live in [`RULES`] and are evaluated top to bottom; the first match
//! wins. Categories overlap by substring ("not found" appears in remote,
//! filesystem and database messages), so the order is part of the contract:
//!
//! 1. Passthrough of already-classified errors
//! 2. Cancellation and deadline sentinels, then typed local failures
//! 3. Transport timeout / connection capabilities
//! 4. Name resolution
//! 5. Remote-store fragments
//! 6. Filesystem fragments
//! 7. Local-store fragments
//! 8. Fallback to `UnknownError`

use crate::classified::{BoxError, ClassifiedError, ErrorCode};
use crate::error::SyncError;
use bridge_traits::BridgeError;
use core_library::LibraryError;
use std::error::Error as StdError;
use std::io;
use std::iter;
use std::sync::Arc;

/// Rule group, recorded on the classified error under the `rule` context key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sentinel,
    Transport,
    NameResolution,
    RemoteStore,
    Filesystem,
    LocalStore,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Sentinel => "sentinel",
            Stage::Transport => "transport",
            Stage::NameResolution => "name_resolution",
            Stage::RemoteStore => "remote_store",
            Stage::Filesystem => "filesystem",
            Stage::LocalStore => "local_store",
        }
    }
}

/// What a rule inspects
pub struct Probe<'a> {
    error: &'a (dyn StdError + 'static),
    haystack: String,
}

impl<'a> Probe<'a> {
    fn new(error: &'a (dyn StdError + 'static)) -> Self {
        let mut haystack = String::new();
        for link in chain(error) {
            let text = link.to_string().to_lowercase();
            if !haystack.contains(&text) {
                if !haystack.is_empty() {
                    haystack.push_str(": ");
                }
                haystack.push_str(&text);
            }
        }
        Self { error, haystack }
    }

    /// Lowercased messages of the error and every distinct source
    pub fn haystack(&self) -> &str {
        &self.haystack
    }

    fn contains_any(&self, fragments: &[&str]) -> bool {
        fragments.iter().any(|f| self.haystack.contains(f))
    }

    fn find<T: StdError + 'static>(&self) -> Option<&'a T> {
        chain(self.error).find_map(|link| link.downcast_ref::<T>())
    }

    fn any<T: StdError + 'static>(&self, predicate: impl Fn(&T) -> bool) -> bool {
        chain(self.error)
            .filter_map(|link| link.downcast_ref::<T>())
            .any(predicate)
    }
}

/// One ordered (predicate, code) pair
pub struct Rule {
    pub stage: Stage,
    pub code: ErrorCode,
    pub matches: fn(&Probe<'_>) -> bool,
}

/// Classification rules in evaluation order
#[rustfmt::skip]
pub static RULES: &[Rule] = &[
    // Sentinels
    Rule { stage: Stage::Sentinel, code: ErrorCode::Canceled, matches: is_cancellation },
    Rule { stage: Stage::Sentinel, code: ErrorCode::ConnectionTimeout, matches: is_deadline },
    Rule { stage: Stage::Sentinel, code: ErrorCode::RecordNotFound, matches: is_missing_record },
    Rule { stage: Stage::Sentinel, code: ErrorCode::InvalidInput, matches: is_invalid_input },
    // Transport capabilities
    Rule { stage: Stage::Transport, code: ErrorCode::ConnectionTimeout, matches: is_transport_timeout },
    Rule { stage: Stage::Transport, code: ErrorCode::NetworkError, matches: is_transport_failure },
    // Name resolution
    Rule { stage: Stage::NameResolution, code: ErrorCode::DnsResolutionFailed, matches: is_name_resolution },
    // Remote store
    Rule { stage: Stage::RemoteStore, code: ErrorCode::AccessDenied, matches: is_access_denied },
    Rule { stage: Stage::RemoteStore, code: ErrorCode::BucketNotFound, matches: is_missing_bucket },
    Rule { stage: Stage::RemoteStore, code: ErrorCode::ObjectNotFound, matches: is_missing_object },
    Rule { stage: Stage::RemoteStore, code: ErrorCode::InvalidCredentials, matches: is_bad_credentials },
    Rule { stage: Stage::RemoteStore, code: ErrorCode::CredentialsExpired, matches: is_expired_credentials },
    // Filesystem
    Rule { stage: Stage::Filesystem, code: ErrorCode::FileNotFound, matches: is_missing_file },
    Rule { stage: Stage::Filesystem, code: ErrorCode::FilePermissionDenied, matches: is_permission_denied },
    Rule { stage: Stage::Filesystem, code: ErrorCode::FileAlreadyExists, matches: is_existing_file },
    // Local store, most specific first
    Rule { stage: Stage::LocalStore, code: ErrorCode::RecordNotFound, matches: is_store_no_rows },
    Rule { stage: Stage::LocalStore, code: ErrorCode::DuplicateRecord, matches: is_store_duplicate },
    Rule { stage: Stage::LocalStore, code: ErrorCode::DatabaseLocked, matches: is_store_locked },
    Rule { stage: Stage::LocalStore, code: ErrorCode::DatabaseConnectionFailed, matches: is_store_unreachable },
    Rule { stage: Stage::LocalStore, code: ErrorCode::DatabaseError, matches: is_store_error },
];

/// Classify an owned error, keeping it as the cause.
pub fn classify(error: impl Into<BoxError>) -> ClassifiedError {
    let boxed: BoxError = error.into();
    let boxed = match boxed.downcast::<ClassifiedError>() {
        Ok(classified) => return *classified,
        Err(other) => other,
    };

    let cause: Arc<dyn StdError + Send + Sync> = Arc::from(boxed);
    if let Some(classified) = passthrough(cause.as_ref()) {
        return classified;
    }
    apply_rules(cause.as_ref()).with_shared_cause(cause)
}

/// Classify a borrowed error. The result carries no cause unless the input
/// was itself classified.
pub fn classify_ref(error: &(dyn StdError + 'static)) -> ClassifiedError {
    passthrough(error).unwrap_or_else(|| apply_rules(error))
}

fn apply_rules(error: &(dyn StdError + 'static)) -> ClassifiedError {
    let probe = Probe::new(error);
    let message = error.to_string();

    match RULES.iter().find(|rule| (rule.matches)(&probe)) {
        Some(rule) => {
            ClassifiedError::new(rule.code, message).with_context("rule", rule.stage.as_str())
        }
        None => ClassifiedError::new(ErrorCode::UnknownError, message),
    }
}

fn passthrough(error: &(dyn StdError + 'static)) -> Option<ClassifiedError> {
    if let Some(classified) = error.downcast_ref::<ClassifiedError>() {
        return Some(classified.clone());
    }

    match error.downcast_ref::<SyncError>()? {
        SyncError::Classified(classified) => Some(classified.clone()),
        SyncError::Offline { cause, .. } => Some(cause.clone()),
        _ => None,
    }
}

fn chain<'a>(
    error: &'a (dyn StdError + 'static),
) -> impl Iterator<Item = &'a (dyn StdError + 'static)> {
    iter::successors(Some(error), |e| (*e).source())
}

// =============================================================================
// Sentinels
// =============================================================================

fn is_cancellation(probe: &Probe<'_>) -> bool {
    probe.any(|e: &SyncError| matches!(e, SyncError::Cancelled))
        || probe.any(|e: &tokio::task::JoinError| e.is_cancelled())
}

fn is_deadline(probe: &Probe<'_>) -> bool {
    probe.find::<tokio::time::error::Elapsed>().is_some()
        || probe.any(|e: &SyncError| matches!(e, SyncError::Timeout(_)))
}

fn is_missing_record(probe: &Probe<'_>) -> bool {
    probe.any(|e: &SyncError| matches!(e, SyncError::NotFound { .. }))
        || probe.any(LibraryError::is_not_found)
}

fn is_invalid_input(probe: &Probe<'_>) -> bool {
    probe.any(|e: &SyncError| matches!(e, SyncError::InvalidInput { .. }))
        || probe.any(|e: &LibraryError| matches!(e, LibraryError::InvalidInput { .. }))
}

// =============================================================================
// Transport
// =============================================================================

fn is_transport_timeout(probe: &Probe<'_>) -> bool {
    probe.any(|e: &io::Error| e.kind() == io::ErrorKind::TimedOut)
        || probe.any(|e: &BridgeError| matches!(e, BridgeError::Timeout(_)))
}

fn is_transport_failure(probe: &Probe<'_>) -> bool {
    probe.any(|e: &io::Error| {
        matches!(
            e.kind(),
            io::ErrorKind::ConnectionRefused
                | io::ErrorKind::ConnectionReset
                | io::ErrorKind::ConnectionAborted
                | io::ErrorKind::NotConnected
                | io::ErrorKind::BrokenPipe
                | io::ErrorKind::AddrNotAvailable
        )
    }) || probe.any(BridgeError::is_transient)
}

fn is_name_resolution(probe: &Probe<'_>) -> bool {
    probe.any(|e: &BridgeError| matches!(e, BridgeError::DnsResolution { .. }))
        || probe.any(|e: &io::Error| {
            let text = e.to_string().to_lowercase();
            text.contains("failed to lookup address") || text.contains("name or service not known")
        })
}

// =============================================================================
// Remote store
// =============================================================================

fn is_access_denied(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["accessdenied", "access denied"])
}

fn is_missing_bucket(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["nosuchbucket", "bucket not found", "bucket does not exist"])
}

fn is_missing_object(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["nosuchkey", "no such key", "object not found"])
}

fn is_bad_credentials(probe: &Probe<'_>) -> bool {
    probe.contains_any(&[
        "invalidaccesskeyid",
        "signaturedoesnotmatch",
        "invalid credentials",
    ])
}

fn is_expired_credentials(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["expiredtoken", "token expired", "credentials expired"])
}

// =============================================================================
// Filesystem
// =============================================================================

fn is_missing_file(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["no such file", "not found", "does not exist"])
}

fn is_permission_denied(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["permission denied"])
}

fn is_existing_file(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["already exists"])
}

// =============================================================================
// Local store
// =============================================================================

fn is_store_error(probe: &Probe<'_>) -> bool {
    probe.contains_any(&["database", "sql"])
}

fn is_store_no_rows(probe: &Probe<'_>) -> bool {
    is_store_error(probe) && probe.contains_any(&["no rows"])
}

fn is_store_duplicate(probe: &Probe<'_>) -> bool {
    is_store_error(probe) && probe.contains_any(&["unique", "duplicate"])
}

fn is_store_locked(probe: &Probe<'_>) -> bool {
    is_store_error(probe) && probe.contains_any(&["locked", "busy"])
}

fn is_store_unreachable(probe: &Probe<'_>) -> bool {
    is_store_error(probe)
        && probe.contains_any(&["unable to open", "pool timed out", "connection refused"])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code_of(error: impl Into<BoxError>) -> ErrorCode {
        classify(error).code()
    }

    #[test]
    fn test_passthrough_is_identity() {
        let first = classify(BridgeError::Timeout("HEAD shares/a".to_string()));
        let second = classify(first.clone());

        assert_eq!(first, second);
        assert_eq!(second.code(), ErrorCode::ConnectionTimeout);
    }

    #[test]
    fn test_passthrough_through_sync_error() {
        let inner = ClassifiedError::new(ErrorCode::QuotaExceeded, "bucket full");
        let wrapped = SyncError::Classified(inner.clone());
        assert_eq!(classify(wrapped), inner);
    }

    #[test]
    fn test_sentinels() {
        assert_eq!(code_of(SyncError::Cancelled), ErrorCode::Canceled);
        assert_eq!(code_of(SyncError::Timeout(10)), ErrorCode::ConnectionTimeout);
        assert_eq!(
            code_of(SyncError::NotFound {
                entity_type: "CatalogRecord".to_string(),
                id: "r1".to_string(),
            }),
            ErrorCode::RecordNotFound
        );
    }

    #[tokio::test]
    async fn test_elapsed_is_connection_timeout() {
        let elapsed = tokio::time::timeout(
            std::time::Duration::from_millis(1),
            std::future::pending::<()>(),
        )
        .await
        .unwrap_err();

        assert_eq!(code_of(elapsed), ErrorCode::ConnectionTimeout);
    }

    #[test]
    fn test_transport_capabilities() {
        assert_eq!(
            code_of(io::Error::new(io::ErrorKind::TimedOut, "read timed out")),
            ErrorCode::ConnectionTimeout
        );
        assert_eq!(
            code_of(io::Error::new(io::ErrorKind::ConnectionReset, "reset by peer")),
            ErrorCode::NetworkError
        );
        assert_eq!(
            code_of(BridgeError::Network {
                message: "connection closed".to_string(),
                temporary: true,
            }),
            ErrorCode::NetworkError
        );
        assert_eq!(
            code_of(BridgeError::DnsResolution {
                host: "s3.example.com".to_string(),
            }),
            ErrorCode::DnsResolutionFailed
        );
    }

    #[test]
    fn test_permanent_network_failure_is_not_transport() {
        let classified = classify(BridgeError::Network {
            message: "route rejected by policy".to_string(),
            temporary: false,
        });
        assert_eq!(classified.code(), ErrorCode::UnknownError);
        assert!(!classified.is_recoverable());

        // Falls through to the fragment rules
        assert_eq!(
            code_of(BridgeError::Network {
                message: "AccessDenied: bucket policy".to_string(),
                temporary: false,
            }),
            ErrorCode::AccessDenied
        );
    }

    #[test]
    fn test_remote_fragments() {
        let cases = [
            ("AccessDenied: Access Denied", ErrorCode::AccessDenied),
            ("NoSuchBucket: the bucket does not exist", ErrorCode::BucketNotFound),
            ("NoSuchKey: The specified key does not exist.", ErrorCode::ObjectNotFound),
            ("InvalidAccessKeyId", ErrorCode::InvalidCredentials),
            ("SignatureDoesNotMatch", ErrorCode::InvalidCredentials),
            ("ExpiredToken: the provided token has expired", ErrorCode::CredentialsExpired),
        ];

        for (message, expected) in cases {
            let error = BridgeError::OperationFailed(message.to_string());
            assert_eq!(code_of(error), expected, "{}", message);
        }
    }

    #[test]
    fn test_remote_fragments_win_over_filesystem() {
        // "does not exist" is also a filesystem fragment
        let error = BridgeError::OperationFailed("object not found: key does not exist".into());
        assert_eq!(code_of(error), ErrorCode::ObjectNotFound);
    }

    #[test]
    fn test_filesystem_fragments() {
        assert_eq!(
            code_of(io::Error::new(io::ErrorKind::NotFound, "No such file or directory")),
            ErrorCode::FileNotFound
        );
        assert_eq!(
            code_of(io::Error::new(io::ErrorKind::PermissionDenied, "Permission denied")),
            ErrorCode::FilePermissionDenied
        );
        assert_eq!(
            code_of(io::Error::other("target already exists")),
            ErrorCode::FileAlreadyExists
        );
    }

    #[test]
    fn test_local_store_fragments() {
        let cases = [
            ("sql: no rows in result set", ErrorCode::RecordNotFound),
            ("database: UNIQUE constraint failed", ErrorCode::DuplicateRecord),
            ("database is locked", ErrorCode::DatabaseLocked),
            ("database: unable to open database file", ErrorCode::DatabaseConnectionFailed),
            ("database disk image is malformed", ErrorCode::DatabaseError),
        ];

        for (message, expected) in cases {
            assert_eq!(code_of(io::Error::other(message)), expected, "{}", message);
        }
    }

    #[test]
    fn test_library_errors() {
        let missing = LibraryError::NotFound {
            entity_type: "ConfigValue".to_string(),
            id: "last_sync_time".to_string(),
        };
        assert_eq!(code_of(missing), ErrorCode::RecordNotFound);

        let row_not_found = LibraryError::Database(sqlx::Error::RowNotFound);
        assert_eq!(code_of(row_not_found), ErrorCode::RecordNotFound);

        let pool = LibraryError::Database(sqlx::Error::PoolTimedOut);
        assert_eq!(code_of(pool), ErrorCode::DatabaseConnectionFailed);
    }

    #[test]
    fn test_fallback_is_unknown_with_original_message() {
        let classified = classify(io::Error::other("flux capacitor overheated"));

        assert_eq!(classified.code(), ErrorCode::UnknownError);
        assert_eq!(classified.user_message(), "flux capacitor overheated");
        assert!(classified.cause().is_some());
        assert!(classified.context().get("rule").is_none());
    }

    #[test]
    fn test_source_chain_is_inspected() {
        let wrapped = SyncError::Library(LibraryError::Database(sqlx::Error::PoolTimedOut));
        assert_eq!(code_of(wrapped), ErrorCode::DatabaseConnectionFailed);
    }

    #[test]
    fn test_rule_stage_is_recorded() {
        let classified = classify(BridgeError::OperationFailed("AccessDenied".to_string()));
        assert_eq!(classified.context().get("rule").map(String::as_str), Some("remote_store"));
    }

    #[test]
    fn test_classify_is_idempotent() {
        let inputs: Vec<BoxError> = vec![
            Box::new(SyncError::Cancelled),
            Box::new(io::Error::other("database is locked")),
            Box::new(BridgeError::OperationFailed("NoSuchKey".to_string())),
            Box::new(io::Error::other("something odd")),
        ];

        for input in inputs {
            let once = classify(input);
            let twice = classify(once.clone());
            assert_eq!(once, twice);
        }
    }
}
