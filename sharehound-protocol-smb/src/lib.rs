mod classifier;
mod dialect;
mod error;
pub mod path;
mod security;
mod session;
mod shares;
mod sid_resolver;
mod status;
#[cfg(any(test, feature = "testing"))]
pub mod testing;
mod transport;

pub use classifier::{classify, classify_error, Classification, ErrorCategory};
pub use dialect::Dialect;
pub use error::SmbError;
pub use security::{DescriptorSource, RetrievedDescriptor};
pub use session::{SessionState, SmbSession};
pub use shares::{stype_mask, ShareEntry, ShareInfo};
pub use sid_resolver::{well_known_sid_name, SidResolver};
pub use status::NtStatus;
pub use transport::*;
