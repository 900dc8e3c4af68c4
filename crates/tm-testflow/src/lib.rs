pub mod error;
pub mod flow;
pub mod node;
pub mod operations;
pub mod step;
pub mod testflow;

pub use error::{FlowError, Result};
pub use flow::{Flow, FlowIdentifier};
pub use node::{Graph, Node, NodeId, NodeSet};
pub use step::Step;
pub use testflow::Testflow;
