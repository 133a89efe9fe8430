//! Stepping through a machine one state at a time.

use ayatori::prelude::*;

fn stage(message: &'static str) -> StateDefinition {
    StateDefinition::single(StateNode::from_fn(move |_ctx, scope| {
        println!("running {}", scope.state);
        Ok(json!(message))
    }))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let mut machine = StateMachine::builder()
        .initial("Draft")
        .transition(TransitionMode::Manual)
        .state("Draft", stage("drafted").target("Review"))
        .state("Review", stage("reviewed").target("Publish"))
        .state("Publish", stage("published"))
        .build()?;

    let output = machine.start().await?;
    println!("Draft -> {:?}", output.data);

    while machine.has_next() {
        let progress = machine.execute_next().await?;
        println!("{}", progress);
        if progress.is_completed() {
            break;
        }
    }

    println!("Publish status: {:?}", machine.context().status("Publish"));
    Ok(())
}
