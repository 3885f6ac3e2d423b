mod connection;

pub use connection::{BackendConnection, ConnectionError};
