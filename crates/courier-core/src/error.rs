use thiserror::Error;

/// Errors a collaborator can get back from the public queue API.
///
/// Delivery failures never show up here; they go through `on_error`.
#[derive(Debug, Error)]
pub enum CourierError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("invalid request id: {0}")]
    InvalidId(String),
}
