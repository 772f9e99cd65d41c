pub mod acl;
pub mod collector;
mod error;
pub mod graph;
pub mod logging;
pub mod worker;

pub use error::CollectError;
