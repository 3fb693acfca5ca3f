//! Domain model (ids, requests, ordering, outcomes, events).

pub mod events;
pub mod ids;
pub mod outcome;
pub mod priority;
pub mod queue_state;
pub mod request;

pub use events::{PassSummary, QueueEvent};
pub use ids::RequestId;
pub use outcome::{DeliveryError, DeliveryOutcome, FailureKind};
pub use priority::Priority;
pub use queue_state::QueueState;
pub use request::{HttpMethod, QueuedRequest, RequestSpec};
