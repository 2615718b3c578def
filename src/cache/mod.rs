// Page cache module.
// Holds the contiguous window of fetched pages and answers freshness queries.

pub mod page;
pub mod window;

pub use page::{Item, Page};
pub use window::PageWindow;
