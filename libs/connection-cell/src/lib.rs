pub mod handlers;
pub mod models;
pub mod router;
pub mod services;

pub use models::{
    Connection, ConnectionAction, ConnectionError, ConnectionStatus, InviteStatus, InviteToken,
};
pub use router::connection_routes;
