// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Session-level behavior: who may connect and what a channel accepts.

use crate::prelude::*;

#[tokio::test]
async fn invalid_request_is_rejected_with_the_reason() {
    let agent = TestAgent::start().await;
    let mut request = agent.backup();
    request["operation"] = "verify".into();

    let outcome = agent.submit(&request).await;

    let TerminalStatus::Rejected { reason } = &outcome.status else {
        panic!("expected a rejection, got {:?}", outcome.status);
    };
    assert_eq!(reason, "unsupported operation: 'verify'");
    assert!(outcome.report.is_none());
    assert!(agent.artifacts().is_empty());

    agent.stop().await;
}

#[tokio::test]
async fn restore_without_a_key_is_rejected() {
    let agent = TestAgent::start().await;
    let mut request = agent.backup();
    request["operation"] = "restore".into();

    let outcome = agent.submit(&request).await;

    let TerminalStatus::Rejected { reason } = &outcome.status else {
        panic!("expected a rejection, got {:?}", outcome.status);
    };
    assert!(reason.contains("restore_key"), "{reason}");

    agent.stop().await;
}

#[tokio::test]
async fn unknown_channel_type_is_refused() {
    let agent = TestAgent::start().await;
    let mut client = agent.client().await;

    let err = client.open_channel("direct-tcpip").await.unwrap_err();
    let ClientError::OpenRejected { reason, .. } = err else {
        panic!("expected an open failure, got {err:?}");
    };
    assert_eq!(reason, OpenFailureReason::UnknownChannelType);

    // The session is still usable.
    agent.write("data/source", b"x");
    let channel = client.open_session().await.unwrap();
    let payload = agent.backup().to_string();
    let outcome = client.run_job_on(channel, payload.as_bytes(), |_| {}).await.unwrap();
    assert!(outcome.succeeded(), "{:?}\n{}", outcome.status, outcome.diagnostics);

    agent.stop().await;
}

#[tokio::test]
async fn channels_are_refused_while_a_job_runs() {
    let agent = TestAgent::start().await;
    let mut request = agent.backup();
    request["target_plugin"] = "endless".into();

    let mut client = agent.client().await;
    let channel = client.open_session().await.unwrap();
    let payload = shield_wire::encode_string(request.to_string().as_bytes());
    assert!(client.request(channel, "exec", &payload).await.unwrap());

    let err = client.open_session().await.unwrap_err();
    let ClientError::OpenRejected { reason, .. } = err else {
        panic!("expected an open failure, got {err:?}");
    };
    assert_eq!(reason, OpenFailureReason::AdministrativelyProhibited);

    drop(client);
    assert!(wait_for_file(&agent.path("data/terminated")).await);
    agent.stop().await;
}

#[tokio::test]
async fn unauthorized_caller_cannot_run_jobs() {
    let agent = TestAgent::start().await;
    let stranger = Keypair::generate().unwrap();

    let result = async {
        let mut client = AgentClient::connect(agent.addr, &stranger, Some(&agent.host_key)).await?;
        client.open_session().await
    }
    .await;

    assert!(result.is_err(), "stranger opened a channel");
    agent.stop().await;
}

#[tokio::test]
async fn host_key_mismatch_is_refused_by_the_caller() {
    let agent = TestAgent::start().await;
    let impostor = *Keypair::generate().unwrap().public();

    let err = AgentClient::connect(agent.addr, &agent.caller, Some(&impostor)).await.err().unwrap();

    assert!(
        matches!(err, ClientError::Protocol(ProtocolError::Unauthorized(_))),
        "unexpected error: {err:?}"
    );
    agent.stop().await;
}

#[tokio::test]
async fn caller_learns_the_host_key_during_the_handshake() {
    let agent = TestAgent::start().await;

    let client = AgentClient::connect(agent.addr, &agent.caller, None).await.unwrap();

    assert_eq!(client.host_key(), &agent.host_key);
    drop(client);
    agent.stop().await;
}
