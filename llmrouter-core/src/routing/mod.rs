//! Routing engine: logical-model resolution, candidate scoring, dynamic
//! weights, failure cooldowns, and conversation stickiness.

pub mod catalog;
pub mod selector;
pub mod session;
pub mod state;
pub mod weights;

pub use catalog::LogicalModelCatalog;
pub use selector::{ProviderSelector, SelectionInput, SelectionResult};
pub use session::SessionManager;
pub use state::{CooldownConfig, RoutingStateService};
