//! Built-in node library
//!
//! Generic flow-control and value primitives, registered through the same
//! extension API third-party modules use. Domain libraries (HTTP, images,
//! models) live in their own crates and plug into the registry identically.

mod flow;
mod util;

pub use flow::{BranchNode, DelayNode, ForLoopNode, LogNode, SequenceNode, StartNode};
pub use util::{add_definition, multiply_definition, number_definition};

use crate::builder::NodeDefinition;
use crate::node::StaticModule;

/// The standard module shipped with the engine
pub fn standard_module() -> StaticModule {
    StaticModule::new(
        "flowgraph.standard",
        vec![
            NodeDefinition::of::<StartNode>("flow.start"),
            NodeDefinition::of::<BranchNode>("flow.branch"),
            NodeDefinition::of::<ForLoopNode>("flow.for_loop"),
            NodeDefinition::of::<SequenceNode>("flow.sequence"),
            NodeDefinition::of::<DelayNode>("flow.delay"),
            NodeDefinition::of::<LogNode>("flow.log"),
            number_definition(),
            add_definition(),
            multiply_definition(),
        ],
    )
}
