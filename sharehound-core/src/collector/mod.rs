//! Per-host collection: share rights, NTFS rights and the share walk

mod contents;
mod entry_rights;
mod filter;
mod host;
mod share_rights;

pub use contents::{collect_contents_in_share, TraversalCounts};
pub use entry_rights::collect_entry_rights;
pub use filter::{AllowAll, EntryFilter, ShareSelection};
pub use host::collect_host;
pub use share_rights::{collect_share_rights, ShareRights};
