//! Flow-control class nodes
//!
//! Loops here are real loops: `ForLoop` re-triggers its body socket per
//! iteration inside `execute` and only then signals Exit. Cancellation is
//! observed at every loop header and before every delay.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::builder::NodeBuilder;
use crate::context::NodeContext;
use crate::error::{EngineError, Result};
use crate::events::FeedbackSeverity;
use crate::model::EXIT_SOCKET;
use crate::node::GraphNode;

/// Begins a control-flow chain when the run starts
#[derive(Default)]
pub struct StartNode;

#[async_trait]
impl GraphNode for StartNode {
    fn configure(builder: NodeBuilder) -> NodeBuilder {
        builder
            .name("Start")
            .category("Flow")
            .description("Begins a control-flow chain when the graph runs")
            .execution_initiator()
    }

    async fn execute(&self, ctx: &NodeContext, _cancel: &CancellationToken) -> Result<()> {
        ctx.trigger(EXIT_SOCKET).await
    }
}

/// Routes control flow along `True` or `False`
#[derive(Default)]
pub struct BranchNode;

#[async_trait]
impl GraphNode for BranchNode {
    fn configure(builder: NodeBuilder) -> NodeBuilder {
        builder
            .name("Branch")
            .category("Flow")
            .description("Route control flow on a boolean condition")
            .execution_input("Enter")
            .execution_output("True")
            .execution_output("False")
            .input_default::<bool>("Condition", false)
    }

    async fn execute(&self, ctx: &NodeContext, _cancel: &CancellationToken) -> Result<()> {
        let condition: bool = ctx.get_input("Condition").await?;
        if condition {
            ctx.trigger("True").await
        } else {
            ctx.trigger("False").await
        }
    }
}

/// Triggers `LoopBody` once per iteration, exposing the index, then Exit
#[derive(Default)]
pub struct ForLoopNode;

#[async_trait]
impl GraphNode for ForLoopNode {
    fn configure(builder: NodeBuilder) -> NodeBuilder {
        builder
            .name("For Loop")
            .category("Flow")
            .description("Run the loop body a fixed number of times")
            .callable()
            .execution_output("LoopBody")
            .input_default::<i64>("Times", 0)
            .output::<i64>("Index")
    }

    async fn execute(&self, ctx: &NodeContext, cancel: &CancellationToken) -> Result<()> {
        let times: i64 = ctx.get_input("Times").await?;
        for index in 0..times.max(0) {
            if cancel.is_cancelled() {
                return Err(EngineError::Cancelled);
            }
            ctx.set_output("Index", index)?;
            ctx.trigger("LoopBody").await?;
        }
        ctx.trigger(EXIT_SOCKET).await
    }
}

/// Triggers its outputs strictly in order
#[derive(Default)]
pub struct SequenceNode;

#[async_trait]
impl GraphNode for SequenceNode {
    fn configure(builder: NodeBuilder) -> NodeBuilder {
        builder
            .name("Sequence")
            .category("Flow")
            .description("Run three chains one after another, then Exit")
            .callable()
            .execution_output("Then0")
            .execution_output("Then1")
            .execution_output("Then2")
    }

    async fn execute(&self, ctx: &NodeContext, _cancel: &CancellationToken) -> Result<()> {
        ctx.trigger("Then0").await?;
        ctx.trigger("Then1").await?;
        ctx.trigger("Then2").await?;
        ctx.trigger(EXIT_SOCKET).await
    }
}

/// Waits, then continues
#[derive(Default)]
pub struct DelayNode;

#[async_trait]
impl GraphNode for DelayNode {
    fn configure(builder: NodeBuilder) -> NodeBuilder {
        builder
            .name("Delay")
            .category("Flow")
            .description("Wait a number of seconds before continuing")
            .callable()
            .input_default::<f64>("Seconds", 0.0)
    }

    async fn execute(&self, ctx: &NodeContext, cancel: &CancellationToken) -> Result<()> {
        let seconds: f64 = ctx.get_input("Seconds").await?;
        if seconds > 0.0 {
            tokio::select! {
                _ = tokio::time::sleep(std::time::Duration::from_secs_f64(seconds)) => {}
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            }
        }
        ctx.trigger(EXIT_SOCKET).await
    }
}

/// Logs a message as feedback and to the tracing subscriber
#[derive(Default)]
pub struct LogNode;

#[async_trait]
impl GraphNode for LogNode {
    fn configure(builder: NodeBuilder) -> NodeBuilder {
        builder
            .name("Log")
            .category("Flow")
            .description("Log a message, then continue")
            .callable()
            .input_default::<String>("Message", String::new())
    }

    async fn execute(&self, ctx: &NodeContext, _cancel: &CancellationToken) -> Result<()> {
        let message: String = ctx.get_input("Message").await?;
        info!(node = %ctx.node_name(), "{message}");
        ctx.emit_feedback(FeedbackSeverity::Info, message, Some("log".into()));
        ctx.trigger(EXIT_SOCKET).await
    }
}
