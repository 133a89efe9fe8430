//! Two-state workflow traversed automatically.

use ayatori::prelude::*;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let ctx = Context::new().with("source", "sample data".to_string());

    let mut machine = StateMachine::builder()
        .initial("Load")
        .context(ctx)
        .state(
            "Load",
            StateDefinition::single(StateNode::from_fn(|ctx, _scope| {
                let source = ctx.get::<String>("source").ok_or("missing source")?;
                println!("Loading {}...", source);
                Ok(json!(source.len()))
            }))
            .target("Report"),
        )
        .state(
            "Report",
            StateDefinition::single(StateNode::from_fn(|ctx, _scope| {
                let loaded = ctx
                    .output("Load", Phase::Action)
                    .and_then(|o| o.data.clone())
                    .unwrap_or(Value::Null);
                Ok(json!(format!("loaded {} bytes", loaded)))
            })),
        )
        .build()?;

    let output = machine.start().await?;
    println!("Result: {:?}", output.data);

    for (state, status) in machine.context().statuses() {
        println!("{}: {}", state, status);
    }

    Ok(())
}
