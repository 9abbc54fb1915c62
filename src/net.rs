//! Minimal network layer: a single buffered GET used to retrieve the vendor list.

mod fetch;
mod response;

pub use fetch::fetch;
pub use response::Response;
