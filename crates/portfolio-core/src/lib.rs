pub mod config;
pub mod error;
pub mod panel;
pub mod stats;
pub mod types;

pub use config::*;
pub use error::*;
pub use panel::*;
pub use types::*;
