pub mod connection;
pub mod endpoints;

pub use connection::{ApiConnectionError, HttpTransport, ModelTransport};
pub use endpoints::{ChatMessage, ModelCall};
