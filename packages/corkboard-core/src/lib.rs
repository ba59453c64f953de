/// Corkboard core: board model, ordering, filtering, and the state
/// synchronization engine (snapshot store, optimistic mutations, drag
/// gestures, push invalidation).
pub mod api;
pub mod config;
pub mod drag;
pub mod error;
pub mod filter;
pub mod hub;
pub mod mutation;
pub mod notice;
pub mod order;
pub mod patch;
pub mod realtime;
pub mod refresh;
pub mod session;
pub mod store;
pub mod types;

#[cfg(test)]
mod testing;

pub use api::{BoardApi, Scope};
pub use config::{ClientConfig, ReconnectPolicy};
pub use error::{PatchError, SyncError};
pub use notice::Notice;
pub use session::{BoardSession, DashboardSession};
