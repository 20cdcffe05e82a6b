//! A small order pipeline driven by one process instance
//!
//! Net: orders are validated by hand (a fire command), then packed and
//! shipped automatically. Shipping is flaky, so a backoff policy retries it.
//!
//! ```text
//! [received] --validate--> [accepted] --pack--> [packed] --ship--> [shipped]
//!                                      (auto)             (auto, flaky)
//! ```
//!
//! Run with `cargo run --example order_pipeline`.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use petriflow_engine::prelude::*;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter("info,petriflow_engine=debug")
        .init();

    let net = Arc::new(
        PetriNet::builder()
            .place(Place::new("received"))
            .place(Place::new("accepted"))
            .place(Place::new("packed"))
            .place(Place::new("shipped"))
            .transition(Transition::new("validate"))
            .transition(Transition::new("pack").automated())
            .transition(Transition::new("ship").automated())
            .input_arc("received", "validate", 1)
            .output_arc("validate", "accepted", 1)
            .input_arc("accepted", "pack", 1)
            .output_arc("pack", "packed", 1)
            .input_arc("packed", "ship", 1)
            .output_arc("ship", "shipped", 1)
            .build()?,
    );

    let ship_attempts = Arc::new(AtomicU32::new(0));
    let runtime = Arc::new(
        ProcessRuntime::new()
            .with_handler_fn("validate", |job: JobContext| async move {
                let order = job.input;
                Ok(json!({ "validated": order }))
            })
            .with_handler_fn("pack", |_job| async move {
                Ok(json!({ "packed": true }))
            })
            .with_handler_fn("ship", move |_job| {
                let attempts = ship_attempts.clone();
                async move {
                    // The carrier answers on the second try.
                    if attempts.fetch_add(1, Ordering::SeqCst) == 0 {
                        Err(HandlerError::retryable("carrier timeout"))
                    } else {
                        Ok(json!({ "tracking": "TRK-0042" }))
                    }
                }
            })
            .with_failure_policy(BackoffPolicy::fixed(Duration::from_millis(200), 3))
            .with_reducer(MergeReducer),
    );

    let journal = Arc::new(InMemoryJournal::new());
    let handle = ProcessInstance::spawn(
        InstanceConfig::new("order", uuid::Uuid::now_v7().to_string()),
        net,
        runtime,
        journal,
    )
    .await?;

    handle
        .initialize(
            Marking::new().with_token("received", json!({ "order_id": 42 })),
            json!({}),
        )
        .await?;

    // Validate by hand; packing and shipping cascade automatically.
    let mut responses = handle.fire_transition(
        "validate",
        json!({ "order_id": 42, "items": 3 }),
        Some("order-42".to_string()),
    )?;
    let response = responses.recv().await;
    println!("validate -> {response:?}");

    // Wait until the automated tail of the pipeline (including the shipping
    // retry) has moved the token to `shipped`.
    loop {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if let StateReply::State(state) = handle.get_state().await? {
            if state.marking.multiplicity(&"shipped".into()) == 1 {
                println!("final marking : {}", serde_json::to_string(&state.marking)?);
                println!("final state   : {}", state.state);
                println!("events applied: {}", state.sequence_nr);
                break;
            }
        }
    }

    handle.stop(false)?;
    handle.stopped().await;
    Ok(())
}
