//! Order processing with a guard, a retried payment and parallel fulfilment.
//!
//! Demonstrates:
//! - Typed caller data in the context
//! - Guards that bypass a state
//! - Exponential backoff retries and an error handler
//! - A block state fanning out to concurrent children
//! - Observing lifecycle events through a subscription

use async_trait::async_trait;
use ayatori::prelude::*;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone)]
struct Order {
    id: String,
    items: Vec<(String, u32)>,
    total: f64,
    express: bool,
}

/// Payment gateway that declines the first charge.
struct FlakyGateway {
    charges: Arc<AtomicU32>,
}

#[async_trait]
impl PhaseHandler for FlakyGateway {
    async fn run(&self, ctx: &Context, scope: &PhaseScope) -> Result<Value, PhaseError> {
        let order = ctx.get::<Order>("order").ok_or("no order")?;
        tokio::time::sleep(Duration::from_millis(50)).await;

        if self.charges.fetch_add(1, Ordering::SeqCst) == 0 {
            return Err(PhaseError::failed(format!(
                "gateway declined {} (attempt {})",
                order.id, scope.attempt
            )));
        }
        Ok(json!({ "transaction": format!("tx-{}", order.id), "amount": order.total }))
    }
}

fn pack() -> StateDefinition {
    StateDefinition::single(StateNode::from_fn(|ctx, _scope| {
        let order = ctx.get::<Order>("order").ok_or("no order")?;
        let count: u32 = order.items.iter().map(|(_, quantity)| quantity).sum();
        Ok(json!({ "parcels": count.div_ceil(3) }))
    }))
}

fn label() -> StateDefinition {
    StateDefinition::single(StateNode::from_fn(|ctx, _scope| {
        let order = ctx.get::<Order>("order").ok_or("no order")?;
        Ok(json!(format!("LBL-{}", order.id)))
    }))
}

fn notify() -> StateDefinition {
    StateDefinition::single(
        StateNode::from_fn(|ctx, _scope| {
            let order = ctx.get::<Order>("order").ok_or("no order")?;
            Ok(json!(format!("customer notified about {}", order.id)))
        })
        .pre_action_fn(|ctx, _scope| {
            let fulfilled = ctx.status("Fulfil") == Some(ActionStatus::Finished);
            Ok(json!({ "fulfilled": fulfilled }))
        }),
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let order = Order {
        id: "ORD-001".to_string(),
        items: vec![("book".to_string(), 2), ("pen".to_string(), 5)],
        total: 42.5,
        express: false,
    };
    let charges = Arc::new(AtomicU32::new(0));

    let mut machine = StateMachine::builder()
        .initial("Validate")
        .context(Context::new().with("order", order))
        .state(
            "Validate",
            StateDefinition::single(StateNode::from_fn(|ctx, _scope| {
                let order = ctx.get::<Order>("order").ok_or("no order")?;
                if order.items.is_empty() {
                    return Err("order has no items".into());
                }
                Ok(json!(order.items.len()))
            }))
            .target("Express"),
        )
        .state(
            "Express",
            StateDefinition::single(StateNode::from_fn(|_ctx, _scope| Ok(json!("priority"))))
                .guard(|ctx| ctx.get::<Order>("order").is_some_and(|o| o.express))
                .target("Payment"),
        )
        .state(
            "Payment",
            StateDefinition::single(StateNode::new(FlakyGateway {
                charges: Arc::clone(&charges),
            }))
            .retry(3, 2)
            .on_error(|_ctx, failure| eprintln!("giving up: {}", failure))
            .target("Fulfil"),
        )
        .state(
            "Fulfil",
            StateDefinition::block([("Pack", pack()), ("Label", label())]).target("Notify"),
        )
        .state("Notify", notify())
        .build()?;

    let mut events = machine.subscribe();
    let printer = tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            println!("  event: {}", event);
        }
    });

    let output = machine.start().await?;
    printer.await?;

    println!("Final output: {:?}", output.data);
    println!("Payment attempts: {}", charges.load(Ordering::SeqCst));
    println!(
        "Report:\n{}",
        serde_json::to_string_pretty(&machine.report())?
    );

    Ok(())
}
