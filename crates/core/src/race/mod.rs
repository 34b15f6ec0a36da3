//! Racing several workers for one request.

mod config;
mod coordinator;

pub use config::RaceConfig;
pub use coordinator::RaceCoordinator;
