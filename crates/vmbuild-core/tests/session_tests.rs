//! End-to-end sessions: host client against a running build server.

use pretty_assertions::assert_eq;
use std::sync::Arc;
use vmbuild_commands::{Add, BuildInstruction, Copy, Run, User, Workdir};
use vmbuild_core::{
    event_channels, start_session, BuildServer, Listen, SessionError, SessionOrchestrator,
    SessionOutcome, SessionState, WorkContext,
};
use vmbuild_resource::ResolvedResource;
use vmbuild_rpc::{BuildClient, Transport};
use vmbuild_test_utils::{
    bytes_supplier, collect_resources, init_tracing, large_content, put_test_resource,
    start_test_session, test_config, CountingStopper,
};

async fn assert_every_call_fails<T: Transport>(client: &mut BuildClient<T>) {
    assert!(client.fetch_instructions().await.is_err());
    assert!(client.resource("anything").await.is_err());
    assert!(client.stdout(vec!["line".to_string()]).await.is_err());
    assert!(client.stderr(vec!["line".to_string()]).await.is_err());
    assert!(client.abort("cause").await.is_err());
    assert!(client.success().await.is_err());
    assert!(client.ping().await.is_err());
}

#[tokio::test]
async fn stopped_tcp_server_rejects_every_call() {
    let session = start_test_session(WorkContext::new()).await.unwrap();
    let mut client = session.client();
    client.ping().await.unwrap();

    session.stop().await;
    assert_every_call_fails(&mut client).await;

    let finished = session.finished().await.unwrap();
    assert_eq!(finished.outcome(), Some(SessionOutcome::Interrupted));
}

#[tokio::test]
async fn stopped_memory_server_rejects_every_call() {
    init_tracing();
    let session = start_session(test_config(), WorkContext::new(), Listen::Memory)
        .await
        .unwrap();
    let mut client = session.client();
    client.ping().await.unwrap();

    session.stop().await;
    assert_every_call_fails(&mut client).await;
}

#[tokio::test]
async fn large_file_copy_round_trips() -> anyhow::Result<()> {
    let dir = tempfile::tempdir()?;
    let contents = large_content(10 * 1024 * 1024);
    let path = dir.path().join("large-file");
    put_test_resource(&path, &contents)?;

    let context = WorkContext::new()
        .with_instruction(Copy {
            original_command: "COPY large-file /etc/large-file".to_string(),
            original_source: "large-file".to_string(),
            source: "large-file".to_string(),
            target: "/etc/large-file".to_string(),
            user: User::default(),
            workdir: Workdir::default(),
            ..Copy::default()
        })
        .with_resource(
            "large-file",
            ResolvedResource::file_from_path(&path, "large-file", "/etc/large-file").with_mode(0o755),
        );

    let session = start_test_session(context).await?;
    let mut client = session.client();
    assert_eq!(client.fetch_instructions().await?, 1);

    let Some(BuildInstruction::Copy(copy)) = client.next_instruction() else {
        anyhow::bail!("expected a COPY instruction");
    };
    assert_eq!(copy.target, "/etc/large-file");

    let resources = collect_resources(&client, &copy.source).await?;
    assert_eq!(resources.len(), 1);
    assert_eq!(resources[0].target_path(), "/etc/large-file");
    assert_eq!(resources[0].target_mode(), 0o755);
    assert!(resources[0].contents() == contents.as_slice(), "contents differ");

    client.success().await?;
    let finished = session.finished().await?;
    assert_eq!(finished.outcome(), Some(SessionOutcome::Succeeded));
    assert!(session.server().is_stopped());
    Ok(())
}

#[tokio::test]
async fn add_from_supplier_round_trips() {
    let contents = large_content(3 * 1024 * 1024 + 17);
    let url = "http://127.0.0.1:1/path/to/the/large-file";

    let context = WorkContext::new()
        .with_instruction(Add {
            original_command: format!("ADD {url} /etc/large-file"),
            original_source: url.to_string(),
            source: url.to_string(),
            target: "/etc/large-file".to_string(),
            ..Add::default()
        })
        .with_resource(
            url,
            ResolvedResource::file_from_supplier(bytes_supplier(contents.clone()), url, url, "/etc/large-file"),
        );

    let session = start_test_session(context).await.unwrap();
    let mut client = session.client();
    client.fetch_instructions().await.unwrap();

    let instruction = client.next_instruction().unwrap();
    let source = instruction.resource_source().unwrap().to_string();
    let resources = collect_resources(&client, &source).await.unwrap();
    assert_eq!(resources.len(), 1);
    assert!(resources[0].contents() == contents.as_slice(), "contents differ");

    client.success().await.unwrap();
    session.finished().await.unwrap();
}

#[tokio::test]
async fn directory_resource_is_walked() {
    let dir = tempfile::tempdir().unwrap();
    put_test_resource(dir.path().join("conf.d/app.conf"), b"key=value").unwrap();
    put_test_resource(dir.path().join("hosts"), b"127.0.0.1 localhost").unwrap();

    let context = WorkContext::new().with_resource(
        "etc",
        ResolvedResource::directory(dir.path(), "etc", "/etc")
            .with_user(User::new("1000:1000"))
            .with_workdir(Workdir::new("/srv")),
    );

    let session = start_test_session(context).await.unwrap();
    let client = session.client();
    let resources = collect_resources(&client, "etc").await.unwrap();

    let targets: Vec<_> = resources.iter().map(|r| r.target_path().to_string()).collect();
    assert_eq!(targets, vec!["/etc", "/etc/conf.d", "/etc/conf.d/app.conf", "/etc/hosts"]);
    assert!(resources[0].is_dir());
    assert_eq!(resources[2].contents(), b"key=value");
    assert!(resources.iter().all(|r| r.target_user().as_str() == "1000:1000"));
    assert!(resources.iter().all(|r| r.target_workdir().as_str() == "/srv"));

    session.stop().await;
}

#[tokio::test]
async fn unknown_resource_is_not_found() {
    let session = start_test_session(WorkContext::new()).await.unwrap();
    let client = session.client();
    let err = client.resource("nope").await.err().unwrap();
    assert!(err.is_not_found());
    session.stop().await;
}

#[tokio::test]
async fn instructions_arrive_in_order() {
    let context = WorkContext::new()
        .with_instruction(Run {
            original_command: "RUN apk add curl".to_string(),
            command: "apk add curl".to_string(),
            ..Run::default()
        })
        .with_instruction(Run {
            original_command: "run echo done".to_string(),
            command: "echo done".to_string(),
            ..Run::default()
        });

    let session = start_test_session(context).await.unwrap();
    let mut client = session.client();
    assert_eq!(client.fetch_instructions().await.unwrap(), 2);

    let commands: Vec<_> = std::iter::from_fn(|| client.next_instruction())
        .map(|i| i.original_command().to_string())
        .collect();
    assert_eq!(commands, vec!["RUN apk add curl", "run echo done"]);
    assert!(client.next_instruction().is_none());
    session.stop().await;
}

#[tokio::test]
async fn output_and_abort_reach_session() {
    let session = start_test_session(WorkContext::new()).await.unwrap();
    let client = session.client();

    client
        .stdout(vec!["building".to_string(), String::new(), "step 2".to_string()])
        .await
        .unwrap();
    client.stderr(vec![String::new(), "warning: x".to_string()]).await.unwrap();
    client.abort("exit status 1").await.unwrap();
    // the stop may already be under way, so the late success can fail
    let _ = client.success().await;

    let finished = session.finished().await.unwrap();
    assert_eq!(finished.stdout(), ["building", "step 2"]);
    assert_eq!(finished.stderr(), ["warning: x"]);
    assert_eq!(finished.outcome(), Some(SessionOutcome::Aborted("exit status 1".to_string())));
    assert!(!finished.succeeded());
    assert_eq!(finished.state(), SessionState::Stopped);
}

#[tokio::test]
async fn rapid_abort_and_success_dispatch_one_stop() {
    let (stopper, stopped) = CountingStopper::new();
    let (sender, events) = event_channels(16, stopped);
    let (orchestrator, _snapshots) = SessionOrchestrator::new(events, Arc::clone(&stopper));
    let task = orchestrator.spawn();

    let first = sender.clone();
    let second = sender.clone();
    let (a, b) = tokio::join!(
        async move { first.abort("boom".to_string()).await },
        async move { second.success().await },
    );
    a.unwrap();
    b.unwrap();

    let session = task.await.unwrap();
    assert_eq!(stopper.calls(), 1);
    match session.outcome() {
        Some(SessionOutcome::Aborted(cause)) => assert_eq!(cause, "boom"),
        Some(SessionOutcome::Succeeded) => assert_eq!(session.aborted(), None),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[tokio::test]
async fn external_stop_without_signal_is_interrupted() {
    let (stopper, stopped) = CountingStopper::new();
    let (_sender, events) = event_channels(16, stopped);
    let (orchestrator, _snapshots) = SessionOrchestrator::new(events, Arc::clone(&stopper));
    let task = orchestrator.spawn();

    stopper.stop_externally();
    let session = task.await.unwrap();
    assert_eq!(session.outcome(), Some(SessionOutcome::Interrupted));
    assert_eq!(stopper.calls(), 0);
}

#[tokio::test]
async fn start_resolves_to_exactly_one_of_ready_or_failed() {
    init_tracing();
    let ready = start_session(test_config(), WorkContext::new(), Listen::Tcp).await;
    let ready = ready.unwrap();
    assert_eq!(ready.snapshot().failure(), None);

    let busy = ready.server().local_addr().unwrap().to_string();
    let failed = start_session(test_config().with_bind_host_port(busy.clone()), WorkContext::new(), Listen::Tcp).await;
    let Err(err @ SessionError::StartFailed { .. }) = failed else {
        panic!("start on a busy port should fail");
    };
    let session = err.session().unwrap();
    assert_eq!(session.state(), SessionState::Failed);
    assert!(session.failure().is_some_and(|cause| cause.contains(&busy)));

    let invalid = test_config().with_max_message_size(16);
    assert!(BuildServer::start(invalid, WorkContext::new(), Listen::Memory).await.is_err());

    ready.stop().await;
}
