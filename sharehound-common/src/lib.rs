mod config;
pub mod credentials;
mod error;
pub mod kinds;
mod types;

pub use config::*;
pub use credentials::{AuthScheme, Credentials};
pub use error::ShareHoundError;
pub use types::*;
