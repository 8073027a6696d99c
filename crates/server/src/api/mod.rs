pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod tracking;

pub use routes::create_router;
