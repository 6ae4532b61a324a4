pub mod coordinator;
pub mod edit;
pub mod roster;
pub mod session;

pub use coordinator::{SyncAction, SyncCoordinator, SyncMode};
pub use edit::EditSession;
pub use roster::RosterState;
pub use session::DashboardSession;
