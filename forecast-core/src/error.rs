use thiserror::Error;

/// Failures of a single fetch-and-decode call.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The URL could not be parsed or is not http(s). No request was made.
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    /// Transport failure or a non-success HTTP status.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// The body did not match the expected shape.
    #[error("Failed to decode response body: {0}")]
    DecodingError(#[from] serde_json::Error),
}

/// A latitude/longitude pair that is not a point on the globe.
#[derive(Debug, Clone, Copy, PartialEq, Error)]
#[error("Invalid coordinate ({latitude}, {longitude}): expected latitude ±90, longitude ±180")]
pub struct CoordinateError {
    pub latitude: f64,
    pub longitude: f64,
}

/// Failures reported by the location engine.
///
/// None of these are fatal: the engine logs them and keeps running with
/// relaxed requirements until a terminal state is reached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LocationError {
    #[error("Location permission denied")]
    PermissionDenied,
    #[error("No sufficiently accurate location within the timeout")]
    AcquisitionTimeout,
    #[error("Location acquisition failed: {0}")]
    AcquisitionFailed(String),
}
