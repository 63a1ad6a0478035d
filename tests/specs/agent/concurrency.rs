// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Jobs on separate connections run side by side; a caller leaving
//! stops its own job only.

use crate::prelude::*;

fn rendezvous(agent: &TestAgent, me: &str, peer: &str) -> serde_json::Value {
    let mut request = agent.backup();
    request["target_plugin"] = "rendezvous".into();
    request["target_endpoint"] = json!({ "dir": agent.path("data"), "me": me, "peer": peer });
    request
}

#[tokio::test]
async fn jobs_on_separate_connections_run_concurrently() {
    let agent = TestAgent::start().await;

    // Each job blocks until the other has started, so serial execution fails.
    let left = rendezvous(&agent, "left", "right");
    let right = rendezvous(&agent, "right", "left");
    let (a, b) = tokio::join!(agent.submit(&left), agent.submit(&right));

    assert!(a.succeeded(), "{:?}\n{}", a.status, a.diagnostics);
    assert!(b.succeeded(), "{:?}\n{}", b.status, b.diagnostics);
    assert_ne!(restore_key(&a), restore_key(&b));
    assert_eq!(agent.artifacts().len(), 2);

    agent.stop().await;
}

#[tokio::test]
async fn caller_leaving_mid_job_stops_the_plugins() {
    let agent = TestAgent::start().await;
    let mut request = agent.backup();
    request["target_plugin"] = "endless".into();

    let mut client = agent.client().await;
    let channel = client.open_session().await.unwrap();
    client.send(&Message::exec(channel, request.to_string().as_bytes())).await.unwrap();
    assert!(wait_for_file(&agent.path("data/started")).await, "job never started");
    drop(client);

    assert!(wait_for_file(&agent.path("data/terminated")).await, "plugin was not stopped");
    // The agent keeps serving other callers.
    agent.write("data/source", b"still here");
    let outcome = agent.submit(&agent.backup()).await;
    assert!(outcome.succeeded(), "{:?}\n{}", outcome.status, outcome.diagnostics);

    agent.stop().await;
}

#[tokio::test]
async fn shutdown_stops_running_jobs() {
    let agent = TestAgent::start().await;
    let mut request = agent.backup();
    request["target_plugin"] = "endless".into();

    let mut client = agent.client().await;
    let channel = client.open_session().await.unwrap();
    let payload = request.to_string();
    let job =
        tokio::spawn(async move { client.run_job_on(channel, payload.as_bytes(), |_| {}).await });
    assert!(wait_for_file(&agent.path("data/started")).await, "job never started");

    let terminated = agent.path("data/terminated");
    agent.stop().await;

    let outcome = tokio::time::timeout(Duration::from_secs(10), job).await.unwrap().unwrap().unwrap();
    let error = outcome.report.unwrap().error.unwrap();
    assert_eq!(error.kind, ErrorKind::Cancelled);
    assert!(terminated.exists());
}
