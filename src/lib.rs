// Catalog cache library.
// Paginated cache with prefetch, request supersession and stale fallback over a remote listing API.

pub mod cache;
pub mod config;
pub mod error;
pub mod remote;
pub mod store;

pub use config::{ResetHook, StoreConfig};
pub use error::{ErrorKind, Result, StoreError, TransportError};
pub use remote::{FetchRequest, FetchResponse, HttpTransport, ListingBody, Transport};
pub use store::{Connectivity, PageFuture, PageResult, Store, StoreBuilder};
