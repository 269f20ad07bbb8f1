use core::fmt;

use thiserror::Error;

use drm_core::{InitDataError, ProtectionScheme};

/**
    Error codes as seen by the decoder on the other side of the boundary.

    The numeric values are part of the boundary contract and must not change.
*/
#[repr(i32)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    #[default]
    None = 0,
    SchemeNotSupported = 1,
    InitializationFailed = 2,
    InsufficientOutputProtection = 3,
    OutputProtectionNotSupported = 4,
    KeyUnavailable = 5,
    LicenseExpired = 6,
    ResourceBusy = 7,
    ClosedSessionMisuse = 8,
    UnsupportedOperation = 9,
    InsufficientSecurityLevel = 10,
    FrameTooLarge = 11,
    SessionStateLost = 12,
    UnknownInternal = 13,
}

impl ErrorCode {
    pub const fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::None),
            1 => Some(Self::SchemeNotSupported),
            2 => Some(Self::InitializationFailed),
            3 => Some(Self::InsufficientOutputProtection),
            4 => Some(Self::OutputProtectionNotSupported),
            5 => Some(Self::KeyUnavailable),
            6 => Some(Self::LicenseExpired),
            7 => Some(Self::ResourceBusy),
            8 => Some(Self::ClosedSessionMisuse),
            9 => Some(Self::UnsupportedOperation),
            10 => Some(Self::InsufficientSecurityLevel),
            11 => Some(Self::FrameTooLarge),
            12 => Some(Self::SessionStateLost),
            13 => Some(Self::UnknownInternal),
            _ => None,
        }
    }

    pub const fn to_i32(self) -> i32 {
        self as i32
    }

    pub const fn to_name(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::SchemeNotSupported => "scheme-not-supported",
            Self::InitializationFailed => "initialization-failed",
            Self::InsufficientOutputProtection => "insufficient-output-protection",
            Self::OutputProtectionNotSupported => "output-protection-not-supported",
            Self::KeyUnavailable => "key-unavailable",
            Self::LicenseExpired => "license-expired",
            Self::ResourceBusy => "resource-busy",
            Self::ClosedSessionMisuse => "closed-session-misuse",
            Self::UnsupportedOperation => "unsupported-operation",
            Self::InsufficientSecurityLevel => "insufficient-security-level",
            Self::FrameTooLarge => "frame-too-large",
            Self::SessionStateLost => "session-state-lost",
            Self::UnknownInternal => "unknown-internal",
        }
    }

    pub const fn is_none(self) -> bool {
        matches!(self, Self::None)
    }

    /**
        Whether a key status report may carry both this code and a
        populated key list. Output restriction applies to individual keys,
        so the decoder still needs to know which keys it concerns.
    */
    pub const fn permits_keys(self) -> bool {
        matches!(self, Self::None | Self::InsufficientOutputProtection)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_name())
    }
}

/**
    Failure categories raised by the platform crypto provider.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    #[error("scheme {0} not supported by provider")]
    NotSupported(ProtectionScheme),
    #[error("device is not provisioned")]
    NotProvisioned,
    #[error("output protection level is insufficient")]
    InsufficientOutputProtection,
    #[error("output protection is not supported")]
    OutputProtectionNotSupported,
    #[error("key not available")]
    KeyUnavailable,
    #[error("license expired")]
    LicenseExpired,
    #[error("provider resources exhausted")]
    ResourceBusy,
    #[error("operation on a closed session")]
    SessionClosed,
    #[error("operation not supported: {0}")]
    UnsupportedOperation(String),
    #[error("security level is insufficient")]
    InsufficientSecurityLevel,
    #[error("frame too large")]
    FrameTooLarge,
    #[error("session state lost")]
    StateLost,
    #[error("provider error {code}: {message}")]
    Other { code: i32, message: String },
}

/**
    Errors from the license transport.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransportError {
    #[error("no license server URL configured or suggested")]
    NoServerUrl,
    #[error("license request failed: {0}")]
    Request(String),
    #[error("license server returned HTTP {status}")]
    Status { status: u16, body: Vec<u8> },
    #[error("license request rejected by interceptor: {0}")]
    Rejected(String),
}

/**
    Errors surfaced by the session manager, one variant per wire code.
*/
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DrmError {
    #[error("none of the advertised schemes are supported")]
    SchemeNotSupported,
    #[error("initialization failed: {0}")]
    InitializationFailed(String),
    #[error("insufficient output protection")]
    InsufficientOutputProtection,
    #[error("output protection not supported")]
    OutputProtectionNotSupported,
    #[error("key unavailable: {0}")]
    KeyUnavailable(String),
    #[error("license expired")]
    LicenseExpired,
    #[error("resource busy")]
    ResourceBusy,
    #[error("closed session used")]
    ClosedSessionMisuse,
    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),
    #[error("insufficient security level")]
    InsufficientSecurityLevel,
    #[error("frame too large")]
    FrameTooLarge,
    #[error("session state lost")]
    SessionStateLost,
    #[error("unknown internal error {code}: {message}")]
    UnknownInternal { code: i32, message: String },
}

impl DrmError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::SchemeNotSupported => ErrorCode::SchemeNotSupported,
            Self::InitializationFailed(_) => ErrorCode::InitializationFailed,
            Self::InsufficientOutputProtection => ErrorCode::InsufficientOutputProtection,
            Self::OutputProtectionNotSupported => ErrorCode::OutputProtectionNotSupported,
            Self::KeyUnavailable(_) => ErrorCode::KeyUnavailable,
            Self::LicenseExpired => ErrorCode::LicenseExpired,
            Self::ResourceBusy => ErrorCode::ResourceBusy,
            Self::ClosedSessionMisuse => ErrorCode::ClosedSessionMisuse,
            Self::UnsupportedOperation(_) => ErrorCode::UnsupportedOperation,
            Self::InsufficientSecurityLevel => ErrorCode::InsufficientSecurityLevel,
            Self::FrameTooLarge => ErrorCode::FrameTooLarge,
            Self::SessionStateLost => ErrorCode::SessionStateLost,
            Self::UnknownInternal { .. } => ErrorCode::UnknownInternal,
        }
    }

    pub(crate) fn internal(message: impl Into<String>) -> Self {
        Self::UnknownInternal {
            code: -1,
            message: message.into(),
        }
    }
}

impl From<ProviderError> for DrmError {
    fn from(e: ProviderError) -> Self {
        match e {
            ProviderError::NotSupported(_) => Self::SchemeNotSupported,
            ProviderError::NotProvisioned => {
                Self::InitializationFailed("device is not provisioned".into())
            }
            ProviderError::InsufficientOutputProtection => Self::InsufficientOutputProtection,
            ProviderError::OutputProtectionNotSupported => Self::OutputProtectionNotSupported,
            ProviderError::KeyUnavailable => Self::KeyUnavailable("reported by provider".into()),
            ProviderError::LicenseExpired => Self::LicenseExpired,
            ProviderError::ResourceBusy => Self::ResourceBusy,
            ProviderError::SessionClosed => Self::ClosedSessionMisuse,
            ProviderError::UnsupportedOperation(op) => Self::UnsupportedOperation(op),
            ProviderError::InsufficientSecurityLevel => Self::InsufficientSecurityLevel,
            ProviderError::FrameTooLarge => Self::FrameTooLarge,
            ProviderError::StateLost => Self::SessionStateLost,
            ProviderError::Other { code, message } => Self::UnknownInternal { code, message },
        }
    }
}

impl From<TransportError> for DrmError {
    fn from(e: TransportError) -> Self {
        Self::KeyUnavailable(e.to_string())
    }
}

impl From<InitDataError> for DrmError {
    fn from(e: InitDataError) -> Self {
        Self::InitializationFailed(e.to_string())
    }
}

/**
    Type alias for results that may return a [`DrmError`].
*/
pub type DrmResult<T> = std::result::Result<T, DrmError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_round_trip_through_i32() {
        for v in 0..=13 {
            let code = ErrorCode::from_i32(v).unwrap();
            assert_eq!(code.to_i32(), v);
        }
        assert_eq!(ErrorCode::from_i32(14), None);
        assert_eq!(ErrorCode::from_i32(-1), None);
    }

    #[test]
    fn only_output_restriction_travels_with_keys() {
        assert!(ErrorCode::None.permits_keys());
        assert!(ErrorCode::InsufficientOutputProtection.permits_keys());
        assert!(!ErrorCode::KeyUnavailable.permits_keys());
        assert!(!ErrorCode::UnknownInternal.permits_keys());
    }

    #[test]
    fn provider_categories_translate() {
        let cases = [
            (
                ProviderError::InsufficientOutputProtection,
                ErrorCode::InsufficientOutputProtection,
            ),
            (ProviderError::ResourceBusy, ErrorCode::ResourceBusy),
            (ProviderError::SessionClosed, ErrorCode::ClosedSessionMisuse),
            (ProviderError::NotProvisioned, ErrorCode::InitializationFailed),
            (ProviderError::StateLost, ErrorCode::SessionStateLost),
            (
                ProviderError::InsufficientSecurityLevel,
                ErrorCode::InsufficientSecurityLevel,
            ),
        ];
        for (provider, expected) in cases {
            assert_eq!(DrmError::from(provider).code(), expected);
        }
    }

    #[test]
    fn unknown_provider_error_keeps_original_code() {
        let err = DrmError::from(ProviderError::Other {
            code: -2998,
            message: "vendor failure".into(),
        });
        assert_eq!(err.code(), ErrorCode::UnknownInternal);
        assert_eq!(
            err,
            DrmError::UnknownInternal {
                code: -2998,
                message: "vendor failure".into()
            }
        );
        assert!(err.to_string().contains("-2998"));
    }

    #[test]
    fn transport_failure_means_key_unavailable() {
        let err = DrmError::from(TransportError::Status {
            status: 403,
            body: Vec::new(),
        });
        assert_eq!(err.code(), ErrorCode::KeyUnavailable);
        assert!(err.to_string().contains("403"));
    }

    #[test]
    fn malformed_init_data_is_initialization_failure() {
        let err = DrmError::from(InitDataError::Empty);
        assert_eq!(err.code(), ErrorCode::InitializationFailed);
    }
}
