pub mod entity_service;
pub mod http;
pub mod transport;

pub use entity_service::*;
pub use http::*;
pub use transport::*;
