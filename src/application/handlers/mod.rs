pub mod correlation;
pub mod reward_handler;

pub use reward_handler::{router, AppState};
