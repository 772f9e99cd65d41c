//! OpenGraph model, sink and the per-host assembly context

mod context;
mod edge;
mod node;
mod opengraph;

pub use context::OpenGraphContext;
pub use edge::{Edge, EdgeEndpoint, MatchBy};
pub use node::{share_id, Node, ShareFlavour};
pub use opengraph::{GraphSink, OpenGraph};
