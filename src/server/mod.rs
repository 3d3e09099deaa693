mod admin;
mod dev;
pub mod dto;
mod public;
pub mod response;
mod router;
pub mod validation;

pub use admin::admin_router;
pub use dev::dev_router;
pub use public::public_router;
pub use router::{AppState, create_router};
