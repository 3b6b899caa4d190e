//! Error types for the voice session manager

/// Result type alias using the session Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in voice session operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid configuration parameter
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Ephemeral credential fetch failed
    #[error("Credential error: {0}")]
    CredentialError(String),

    /// Offer/answer exchange with the remote session endpoint failed
    #[error("Signaling error: {0}")]
    SignalingError(String),

    /// Local media device unavailable or permission denied
    #[error("Media access error: {0}")]
    MediaAccessError(String),

    /// Event channel is not open; sends are rejected, never queued
    #[error("Event channel is not ready")]
    ChannelNotReady,

    /// Recording requires an active local media stream
    #[error("No active media stream")]
    NoMediaStream,

    /// A session is already active; callers must `end()` before starting again
    #[error("Session already active (status: {0})")]
    SessionActive(String),

    /// The session was ended while `start()` was still in flight
    #[error("Session ended during start")]
    SessionSuperseded,

    /// SDP negotiation error
    #[error("SDP negotiation error: {0}")]
    SdpError(String),

    /// WebRTC peer connection error
    #[error("Peer connection error: {0}")]
    PeerConnectionError(String),

    /// Data channel error
    #[error("Data channel error: {0}")]
    DataChannelError(String),

    /// Media track error
    #[error("Media track error: {0}")]
    MediaTrackError(String),

    /// Local recording error
    #[error("Recording error: {0}")]
    RecordingError(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// Any other error
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    /// Check if this error is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::InvalidConfig(_))
    }

    /// Check if this error aborts session start
    ///
    /// Setup-phase errors abort the whole `start()` sequence and trigger
    /// teardown before they are surfaced to the caller.
    pub fn is_setup_error(&self) -> bool {
        matches!(
            self,
            Error::CredentialError(_)
                | Error::SignalingError(_)
                | Error::MediaAccessError(_)
                | Error::SdpError(_)
                | Error::PeerConnectionError(_)
                | Error::DataChannelError(_)
                | Error::MediaTrackError(_)
        )
    }

    /// Check if this error is a caller usage error
    pub fn is_usage_error(&self) -> bool {
        matches!(
            self,
            Error::SessionActive(_) | Error::ChannelNotReady | Error::NoMediaStream
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CredentialError("status 500".to_string());
        assert_eq!(err.to_string(), "Credential error: status 500");

        let err = Error::ChannelNotReady;
        assert_eq!(err.to_string(), "Event channel is not ready");
    }

    #[test]
    fn test_error_is_setup_error() {
        assert!(Error::SignalingError("test".to_string()).is_setup_error());
        assert!(Error::MediaAccessError("test".to_string()).is_setup_error());
        assert!(!Error::ChannelNotReady.is_setup_error());
        assert!(!Error::InvalidConfig("test".to_string()).is_setup_error());
    }

    #[test]
    fn test_error_is_usage_error() {
        assert!(Error::SessionActive("connected".to_string()).is_usage_error());
        assert!(Error::ChannelNotReady.is_usage_error());
        assert!(Error::NoMediaStream.is_usage_error());
        assert!(!Error::SdpError("test".to_string()).is_usage_error());
    }

    #[test]
    fn test_error_is_config_error() {
        assert!(Error::InvalidConfig("test".to_string()).is_config_error());
        assert!(!Error::CredentialError("test".to_string()).is_config_error());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "device not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::IoError(_)));
    }
}
