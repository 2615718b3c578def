// Remote fetch module.
// Defines the request descriptor, the transport seam, and the reqwest-backed transport.

pub mod client;
pub mod transport;
pub mod types;

pub use client::HttpTransport;
pub use transport::Transport;
pub use types::*;
