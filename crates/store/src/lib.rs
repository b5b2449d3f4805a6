//! Content store backends.
//!
//! - [`HttpStore`]: the HTTP upload gateway (flat namespace, needs
//!   directory markers).
//! - [`FileShareStore`]: a mounted directory (real hierarchy, no markers).

pub mod fileshare;
pub mod http;

pub use fileshare::FileShareStore;
pub use http::{HttpStore, HttpStoreOptions};
