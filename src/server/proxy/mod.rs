pub mod forwarder;
pub mod handlers;
pub mod routes;

pub use forwarder::RequestForwarder;
