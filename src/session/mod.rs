//! Query session
//!
//! This module provides:
//! - `QuerySession`: the graph, the compiler and its requests behind one API
//! - `RequestLifecycle`: one cancelable request slot per concern
//! - `SessionEventBus`: broadcast notifications for the rendering layer

mod events;
mod lifecycle;
mod manager;

pub use events::{SessionEvent, SessionEventBus, SessionEventKind};
pub use lifecycle::{Concern, FetchOutcome, FetchResponse, PendingFetch, RequestLifecycle};
pub use manager::{ChooseOutcome, PendingUpdate, QuerySession, RelationDiscovery, UpdateResponses};
