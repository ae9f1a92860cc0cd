pub mod error;
pub mod routes;
mod state;

#[cfg(test)]
mod testing;

pub use routes::router;
pub use state::{AppState, ViewState};
