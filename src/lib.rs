// Public API for integration tests and potential library usage

pub mod api;
pub mod embed;
pub mod error;
pub mod guard;
pub mod identity;
pub mod notify;
pub mod phase;
pub mod similarity;
pub mod state;
pub mod types;
