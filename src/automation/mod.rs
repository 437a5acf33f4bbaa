pub mod controller;
pub mod pipeline;

pub use controller::*;
pub use pipeline::*;
