pub mod client;
pub mod credentials;
pub mod metadata;

pub use client::*;
pub use credentials::*;
pub use metadata::*;
