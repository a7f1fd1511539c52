//! Caller-visible outcome codes.
//!
//! Every public client operation reports exactly one [`Status`]. Codes below
//! [`ERROR_CODES_START`] are normal terminal outcomes (including idempotent
//! no-ops such as "nothing to retry"); codes at or above it are failures.

use std::fmt;

/// First numeric code that denotes a failure.
pub const ERROR_CODES_START: u16 = 100;

/// Outcome of a client operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Status {
    Ok = 0,
    Cached = 1,
    Deleted = 2,
    Archived = 3,
    UpdateQueued = 4,
    UpdateRetryQueued = 5,
    NoDownloadbleResources = 6,
    MessagesConsumed = 7,
    NoMessagesFound = 8,
    SomeMessagesAreOrphaned = 9,
    AllMessagesAreOrphaned = 10,
    ZeroUpdatesProvided = 11,
    UpdateAlreadyQueued = 12,

    NotFound = ERROR_CODES_START,
    MalformedUrl = 101,
    InvalidManifestUrl = 102,
    NetworkError = 103,
    BadHttpCode = 104,
    EncodingNotAcceptable = 105,
    InvalidManifestEncoding = 106,
    PreflightVerificationFailed = 107,
    UpdateImpossible = 108,
    UpdateNotAvailable = 109,
    InsufficentDiskSpace = 110,
    DownloadManagerUnsyncedState = 111,
    UpdateRetryImpossible = 112,
    RemoteResourceNotFound = 113,
    ErrorIndexNotFound = 114,
    NoSegmentsFound = 115,
    InvalidErrorDownloadIndex = 116,
    LiveFetchFailed = 117,
}

impl Status {
    pub fn code(self) -> u16 {
        self as u16
    }

    pub fn is_error(self) -> bool {
        self.code() >= ERROR_CODES_START
    }

    /// Stable camelCase name, as reported by the CLI and in logs.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Cached => "cached",
            Self::Deleted => "deleted",
            Self::Archived => "archived",
            Self::UpdateQueued => "updateQueued",
            Self::UpdateRetryQueued => "updateRetryQueued",
            Self::NoDownloadbleResources => "noDownloadbleResources",
            Self::MessagesConsumed => "messagesConsumed",
            Self::NoMessagesFound => "noMessagesFound",
            Self::SomeMessagesAreOrphaned => "someMessagesAreOrphaned",
            Self::AllMessagesAreOrphaned => "allMessagesAreOrphaned",
            Self::ZeroUpdatesProvided => "zeroUpdatesProvided",
            Self::UpdateAlreadyQueued => "updateAlreadyQueued",
            Self::NotFound => "notFound",
            Self::MalformedUrl => "malformedUrl",
            Self::InvalidManifestUrl => "invalidManifestUrl",
            Self::NetworkError => "networkError",
            Self::BadHttpCode => "badHttpCode",
            Self::EncodingNotAcceptable => "encodingNotAcceptable",
            Self::InvalidManifestEncoding => "invalidManifestEncoding",
            Self::PreflightVerificationFailed => "preflightVerificationFailed",
            Self::UpdateImpossible => "updateImpossible",
            Self::UpdateNotAvailable => "updateNotAvailable",
            Self::InsufficentDiskSpace => "insufficentDiskSpace",
            Self::DownloadManagerUnsyncedState => "downloadManagerUnsyncedState",
            Self::UpdateRetryImpossible => "updateRetryImpossible",
            Self::RemoteResourceNotFound => "remoteResourceNotFound",
            Self::ErrorIndexNotFound => "errorIndexNotFound",
            Self::NoSegmentsFound => "noSegmentsFound",
            Self::InvalidErrorDownloadIndex => "invalidErrorDownloadIndex",
            Self::LiveFetchFailed => "liveFetchFailed",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_threshold() {
        assert!(!Status::Ok.is_error());
        assert!(!Status::UpdateAlreadyQueued.is_error());
        assert!(!Status::NoMessagesFound.is_error());
        assert!(Status::NotFound.is_error());
        assert!(Status::BadHttpCode.is_error());
        assert_eq!(Status::NotFound.code(), ERROR_CODES_START);
    }

    #[test]
    fn test_display() {
        assert_eq!(Status::BadHttpCode.to_string(), "badHttpCode (104)");
    }
}
