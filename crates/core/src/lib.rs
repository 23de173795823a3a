pub mod buffer;
pub mod config;
pub mod error;

pub use buffer::*;
pub use config::Config;
pub use error::*;
