//! Inline value and arithmetic nodes

use crate::builder::{NodeBuilder, NodeDefinition};

/// `value.number`: a pure constant configured through its input default
pub fn number_definition() -> NodeDefinition {
    NodeBuilder::new("value.number")
        .name("Number")
        .category("Values")
        .description("A constant number")
        .input_default::<f64>("Value", 0.0)
        .output::<f64>("Out")
        .on_execute(|ctx, _cancel| {
            Box::pin(async move {
                let value: f64 = ctx.get_input("Value").await?;
                ctx.set_output("Out", value)
            })
        })
        .build()
}

/// `math.add`: pure sum of two numbers
pub fn add_definition() -> NodeDefinition {
    NodeBuilder::new("math.add")
        .name("Add")
        .category("Math")
        .description("Sum two numbers")
        .input::<f64>("A")
        .input::<f64>("B")
        .output::<f64>("Sum")
        .on_execute(|ctx, _cancel| {
            Box::pin(async move {
                let a: f64 = ctx.get_input("A").await?;
                let b: f64 = ctx.get_input("B").await?;
                ctx.set_output("Sum", a + b)
            })
        })
        .build()
}

/// `math.multiply`: pure product of two numbers
pub fn multiply_definition() -> NodeDefinition {
    NodeBuilder::new("math.multiply")
        .name("Multiply")
        .category("Math")
        .description("Multiply two numbers")
        .input_default::<f64>("A", 1.0)
        .input_default::<f64>("B", 1.0)
        .output::<f64>("Product")
        .on_execute(|ctx, _cancel| {
            Box::pin(async move {
                let a: f64 = ctx.get_input("A").await?;
                let b: f64 = ctx.get_input("B").await?;
                ctx.set_output("Product", a * b)
            })
        })
        .build()
}
