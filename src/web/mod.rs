pub mod auth;
pub mod responses;
pub mod router;
pub mod state;
pub mod templates;
pub mod uploads;

pub use state::AppState;
