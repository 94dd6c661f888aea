//! Error handling for camguard
//!
//! Every failure below is either camera-scoped or request-scoped.
//! None of them is allowed to reach the fleet control loop.

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error types
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Stream could not be opened at all (halts that camera's acquisition)
    #[error("Stream unavailable for camera {camera_id}: {message}")]
    StreamUnavailable { camera_id: String, message: String },

    /// Transient frame read failure (retried, then reconnect)
    #[error("Frame read failed: {0}")]
    FrameRead(String),

    /// Detection capability failed for one frame
    #[error("Detection failed: {0}")]
    Detection(String),

    /// Alert delivery channel failed
    #[error("Delivery failed: {0}")]
    Delivery(String),

    /// Event store rejected or lost an event
    #[error("Store failed: {0}")]
    Store(String),

    /// Status API rejected a report
    #[error("Status report failed: {0}")]
    Status(String),

    /// Bounded work queue is full
    #[error("Queue full: {0}")]
    QueueFull(String),

    /// Config error
    #[error("Config error: {0}")]
    Config(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image encode/decode error
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// SQLx database error
    #[error("SQLx error: {0}")]
    Sqlx(#[from] sqlx::Error),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Failures that stay inside one camera's acquisition/dispatch pair
    pub fn is_camera_scoped(&self) -> bool {
        matches!(
            self,
            Error::StreamUnavailable { .. } | Error::FrameRead(_) | Error::Detection(_)
        )
    }

    /// Short machine-readable code for structured logs
    pub fn code(&self) -> &'static str {
        match self {
            Error::StreamUnavailable { .. } => "STREAM_UNAVAILABLE",
            Error::FrameRead(_) => "FRAME_READ_FAILURE",
            Error::Detection(_) => "DETECTION_FAILURE",
            Error::Delivery(_) => "DELIVERY_FAILURE",
            Error::Store(_) => "STORE_FAILURE",
            Error::Status(_) => "STATUS_FAILURE",
            Error::QueueFull(_) => "QUEUE_FULL",
            Error::Config(_) => "CONFIG_ERROR",
            Error::Serialization(_) => "SERIALIZATION_ERROR",
            Error::Http(_) => "HTTP_ERROR",
            Error::Io(_) => "IO_ERROR",
            Error::Image(_) => "IMAGE_ERROR",
            Error::Sqlx(_) => "DATABASE_ERROR",
            Error::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_camera_scoped_classification() {
        let open = Error::StreamUnavailable {
            camera_id: "cam-1".to_string(),
            message: "refused".to_string(),
        };
        assert!(open.is_camera_scoped());
        assert!(Error::Detection("timeout".to_string()).is_camera_scoped());
        assert!(!Error::Store("down".to_string()).is_camera_scoped());
        assert!(!Error::Delivery("403".to_string()).is_camera_scoped());
    }

    #[test]
    fn test_error_display() {
        let err = Error::StreamUnavailable {
            camera_id: "cam-1".to_string(),
            message: "connection refused".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Stream unavailable for camera cam-1: connection refused"
        );
        assert_eq!(err.code(), "STREAM_UNAVAILABLE");
    }
}
