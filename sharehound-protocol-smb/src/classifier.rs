use std::fmt;

use crate::{NtStatus, SmbError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Dialect or feature not supported, another dialect may work
    Protocol,
    Auth,
    Network,
    Unknown,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Protocol => "PROTOCOL",
            Self::Auth => "AUTH",
            Self::Network => "NETWORK",
            Self::Unknown => "UNKNOWN",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub category: ErrorCategory,
    pub message: String,
    pub retry_with_other_dialect: bool,
}

impl Classification {
    fn new(category: ErrorCategory, message: impl Into<String>, retry: bool) -> Self {
        Self {
            category,
            message: message.into(),
            retry_with_other_dialect: retry,
        }
    }
}

const STATUS_TABLE: &[(NtStatus, ErrorCategory, &str, bool)] = &[
    (
        NtStatus::NOT_SUPPORTED,
        ErrorCategory::Protocol,
        "SMB dialect or feature not supported by server",
        true,
    ),
    (
        NtStatus::LOGON_FAILURE,
        ErrorCategory::Auth,
        "Invalid username or password",
        false,
    ),
    (
        NtStatus::ACCESS_DENIED,
        ErrorCategory::Auth,
        "Access denied - insufficient privileges",
        false,
    ),
    (
        NtStatus::ACCOUNT_DISABLED,
        ErrorCategory::Auth,
        "Account is disabled",
        false,
    ),
    (
        NtStatus::ACCOUNT_LOCKED_OUT,
        ErrorCategory::Auth,
        "Account is locked out",
        false,
    ),
    (
        NtStatus::PASSWORD_EXPIRED,
        ErrorCategory::Auth,
        "Password has expired",
        false,
    ),
    (
        NtStatus::INVALID_LOGON_HOURS,
        ErrorCategory::Auth,
        "Login outside allowed hours",
        false,
    ),
    (
        NtStatus::INVALID_WORKSTATION,
        ErrorCategory::Auth,
        "Login from this workstation not allowed",
        false,
    ),
    (
        NtStatus::ACCOUNT_RESTRICTION,
        ErrorCategory::Auth,
        "Account restriction preventing login",
        false,
    ),
    (
        NtStatus::BAD_NETWORK_NAME,
        ErrorCategory::Network,
        "Share or network name not found",
        false,
    ),
    (
        NtStatus::CONNECTION_REFUSED,
        ErrorCategory::Network,
        "Network connectivity issue",
        false,
    ),
    (
        NtStatus::NETWORK_UNREACHABLE,
        ErrorCategory::Network,
        "Network connectivity issue",
        false,
    ),
    (
        NtStatus::HOST_UNREACHABLE,
        ErrorCategory::Network,
        "Network connectivity issue",
        false,
    ),
];

pub fn classify(status: NtStatus) -> Classification {
    for (code, category, message, retry) in STATUS_TABLE {
        if *code == status {
            return Classification::new(*category, *message, *retry);
        }
    }
    Classification::new(
        ErrorCategory::Unknown,
        SmbError::Status(status).to_string(),
        true,
    )
}

/// Extends [classify] to failures that never reached the status layer.
/// Transport failures abort the host, anything unrecognised is retried.
pub fn classify_error(error: &SmbError) -> Classification {
    match error {
        SmbError::Status(status) => classify(*status),
        SmbError::Io(_) | SmbError::Timeout(_) | SmbError::Unreachable { .. } => {
            Classification::new(ErrorCategory::Network, error.to_string(), false)
        }
        SmbError::AuthenticationRejected(_) => {
            Classification::new(ErrorCategory::Auth, error.to_string(), false)
        }
        SmbError::ConnectionFailed { category, message } => Classification::new(
            *category,
            message.clone(),
            matches!(category, ErrorCategory::Protocol | ErrorCategory::Unknown),
        ),
        _ => Classification::new(ErrorCategory::Unknown, error.to_string(), true),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_supported_is_retried() {
        let c = classify(NtStatus::NOT_SUPPORTED);
        assert_eq!(c.category, ErrorCategory::Protocol);
        assert!(c.retry_with_other_dialect);
    }

    #[test]
    fn test_auth_statuses_never_retry() {
        for status in [
            NtStatus::LOGON_FAILURE,
            NtStatus::ACCESS_DENIED,
            NtStatus::ACCOUNT_DISABLED,
            NtStatus::ACCOUNT_LOCKED_OUT,
            NtStatus::PASSWORD_EXPIRED,
            NtStatus::INVALID_LOGON_HOURS,
            NtStatus::INVALID_WORKSTATION,
            NtStatus::ACCOUNT_RESTRICTION,
        ] {
            let c = classify(status);
            assert_eq!(c.category, ErrorCategory::Auth, "{status}");
            assert!(!c.retry_with_other_dialect);
        }
        assert_eq!(
            classify(NtStatus::LOGON_FAILURE).message,
            "Invalid username or password"
        );
    }

    #[test]
    fn test_network_statuses_never_retry() {
        let c = classify(NtStatus::BAD_NETWORK_NAME);
        assert_eq!(c.category, ErrorCategory::Network);
        assert_eq!(c.message, "Share or network name not found");
        assert!(!c.retry_with_other_dialect);

        let c = classify(NtStatus::HOST_UNREACHABLE);
        assert_eq!(c.message, "Network connectivity issue");
    }

    #[test]
    fn test_unknown_status_is_retried() {
        let c = classify(NtStatus(0xc0000001));
        assert_eq!(c.category, ErrorCategory::Unknown);
        assert!(c.retry_with_other_dialect);
        assert!(c.message.contains("0xc0000001"));
    }

    #[test]
    fn test_transport_errors_abort() {
        let io = SmbError::Io(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "reset",
        ));
        assert_eq!(classify_error(&io).category, ErrorCategory::Network);
        assert!(!classify_error(&io).retry_with_other_dialect);
        assert!(!classify_error(&SmbError::Timeout("login")).retry_with_other_dialect);
        assert!(classify_error(&SmbError::Rpc("bind".into())).retry_with_other_dialect);
    }
}
