//! Synthetic definitions for graph variables and custom events
//!
//! Variable and event nodes have no instance class. The runtime recognizes
//! them by `definition_id` prefix and executes them directly against
//! storage and the event bus. The definitions built here exist so editors
//! can stamp out nodes for declared variables/events and so the runtime's
//! definition map resolves them like any other node kind.

use crate::builder::{NodeBuilder, NodeDefinition};
use crate::model::{GraphEvent, GraphVariable, SocketData};

/// Prefix of variable-read definitions
pub const VARIABLE_GET_PREFIX: &str = "variable.get.";
/// Prefix of variable-write definitions
pub const VARIABLE_SET_PREFIX: &str = "variable.set.";
/// Prefix of event-publish definitions
pub const EVENT_TRIGGER_PREFIX: &str = "event.trigger.";
/// Prefix of event-subscribe definitions
pub const EVENT_LISTENER_PREFIX: &str = "event.listener.";

/// Socket name shared by variable get/set nodes
pub const VALUE_SOCKET: &str = "Value";

/// Recognized special node kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpecialNode<'a> {
    /// Reads `variables[id]` to its `Value` output; at most once per generation
    VariableGet(&'a str),
    /// Writes its `Value` input to `variables[id]`, mirrors it out, signals Exit
    VariableSet(&'a str),
    /// Publishes the event, then signals Exit
    EventTrigger(&'a str),
    /// Subscribed at run start; its Exit path runs when the event fires
    EventListener(&'a str),
}

/// Classify a definition id by prefix
pub fn recognize(definition_id: &str) -> Option<SpecialNode<'_>> {
    if let Some(id) = definition_id.strip_prefix(VARIABLE_GET_PREFIX) {
        return Some(SpecialNode::VariableGet(id));
    }
    if let Some(id) = definition_id.strip_prefix(VARIABLE_SET_PREFIX) {
        return Some(SpecialNode::VariableSet(id));
    }
    if let Some(id) = definition_id.strip_prefix(EVENT_TRIGGER_PREFIX) {
        return Some(SpecialNode::EventTrigger(id));
    }
    if let Some(id) = definition_id.strip_prefix(EVENT_LISTENER_PREFIX) {
        return Some(SpecialNode::EventListener(id));
    }
    None
}

/// The two definitions induced by a declared variable
pub fn variable_definitions(variable: &GraphVariable) -> [NodeDefinition; 2] {
    let mut get = NodeBuilder::new(format!("{VARIABLE_GET_PREFIX}{}", variable.id))
        .name(format!("Get {}", variable.name))
        .category("Variables")
        .description(format!("Read variable '{}'", variable.name))
        .build();
    get.outputs
        .push(SocketData::data(VALUE_SOCKET, variable.type_name.clone(), false));

    let mut set = NodeBuilder::new(format!("{VARIABLE_SET_PREFIX}{}", variable.id))
        .name(format!("Set {}", variable.name))
        .category("Variables")
        .description(format!("Write variable '{}'", variable.name))
        .callable()
        .build();
    let mut input = SocketData::data(VALUE_SOCKET, variable.type_name.clone(), true);
    input.value = variable.default_value.clone();
    set.inputs.push(input);
    set.outputs
        .push(SocketData::data(VALUE_SOCKET, variable.type_name.clone(), false));

    [get, set]
}

/// The two definitions induced by a declared event
pub fn event_definitions(event: &GraphEvent) -> [NodeDefinition; 2] {
    let listener = NodeBuilder::new(format!("{EVENT_LISTENER_PREFIX}{}", event.id))
        .name(format!("On {}", event.name))
        .category("Events")
        .description(format!("Runs when event '{}' fires", event.name))
        .execution_initiator()
        .build();

    let trigger = NodeBuilder::new(format!("{EVENT_TRIGGER_PREFIX}{}", event.id))
        .name(format!("Fire {}", event.name))
        .category("Events")
        .description(format!("Fire event '{}'", event.name))
        .callable()
        .build();

    [listener, trigger]
}
