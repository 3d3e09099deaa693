mod models;
mod state;

pub use models::*;
pub use state::{OrderState, RaffleState};
