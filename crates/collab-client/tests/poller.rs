use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};
use collab_client::{spawn_poller, ApiClient, ApiError, PollEvent};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Notify};

async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind fixture listener");
    let addr = listener.local_addr().expect("fixture addr");
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("serve fixture");
    });
    format!("http://{addr}")
}

fn healthy_router() -> Router {
    Router::new()
        .route(
            "/agents/status",
            get(|| async {
                Json(serde_json::json!({
                    "agents": [
                        {"id": "dango-1", "name": "relay one", "status": "online"},
                        {"id": "dango-2", "name": "relay two", "status": "offline"}
                    ]
                }))
            }),
        )
        .route(
            "/tasks",
            get(|| async {
                Json(serde_json::json!({
                    "tasks": [
                        {
                            "id": "t-2",
                            "title": "Digest the morning report",
                            "status": "running",
                            "created_at": "2026-08-01T10:00:00Z"
                        },
                        {
                            "id": "t-1",
                            "title": "Warm up",
                            "status": "completed",
                            "created_at": "2026-08-01T09:00:00Z",
                            "result": "# Done\nall good"
                        }
                    ]
                }))
            }),
        )
}

#[tokio::test]
async fn fetches_agents_and_tasks() {
    let base = serve(healthy_router()).await;
    let client = ApiClient::new(&base);

    let agents = client.fetch_agents().await.expect("agents fetch");
    assert_eq!(agents.len(), 2);
    assert_eq!(agents[0].id, "dango-1");
    assert!(agents[0].status.is_online());
    assert!(!agents[1].status.is_online());

    let tasks = client.fetch_tasks().await.expect("tasks fetch");
    assert_eq!(tasks.len(), 2);
    assert_eq!(tasks[0].id, "t-2");
    assert!(tasks[1].has_result());
}

#[tokio::test]
async fn missing_envelope_field_defaults_to_empty() {
    let router = Router::new()
        .route("/agents/status", get(|| async { Json(serde_json::json!({})) }))
        .route("/tasks", get(|| async { Json(serde_json::json!({})) }));
    let base = serve(router).await;
    let client = ApiClient::new(&base);

    assert!(client.fetch_agents().await.expect("agents").is_empty());
    assert!(client.fetch_tasks().await.expect("tasks").is_empty());
}

#[tokio::test]
async fn non_json_body_is_a_decode_error() {
    let router = Router::new().route("/agents/status", get(|| async { "not json" }));
    let base = serve(router).await;
    let client = ApiClient::new(&base);

    match client.fetch_agents().await {
        Err(ApiError::Decode { endpoint, .. }) => assert_eq!(endpoint, "agents"),
        other => panic!("expected decode error, got {other:?}"),
    }
}

#[tokio::test]
async fn server_error_is_a_status_error() {
    let router = Router::new().route(
        "/tasks",
        get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "boom") }),
    );
    let base = serve(router).await;
    let client = ApiClient::new(&base);

    match client.fetch_tasks().await {
        Err(ApiError::Status { endpoint, status }) => {
            assert_eq!(endpoint, "tasks");
            assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        }
        other => panic!("expected status error, got {other:?}"),
    }
}

#[tokio::test]
async fn failing_endpoint_does_not_block_the_other() {
    let router = Router::new()
        .route(
            "/agents/status",
            get(|| async { (StatusCode::INTERNAL_SERVER_ERROR, "down") }),
        )
        .route(
            "/tasks",
            get(|| async {
                Json(serde_json::json!({
                    "tasks": [{
                        "id": "t-1",
                        "title": "still flowing",
                        "status": "pending",
                        "created_at": "2026-08-01T09:00:00Z"
                    }]
                }))
            }),
        );
    let base = serve(router).await;
    let client = ApiClient::new(&base);

    let (tx, mut rx) = mpsc::channel(16);
    let refresh = Arc::new(Notify::new());
    let handle = spawn_poller(client, Duration::from_millis(50), refresh, tx);

    let mut task_events = 0;
    for _ in 0..3 {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poll event before timeout")
            .expect("poller alive");
        match event {
            PollEvent::Tasks { tasks, .. } => {
                assert_eq!(tasks.len(), 1);
                task_events += 1;
            }
            PollEvent::Agents { .. } => panic!("agents endpoint is down; no event expected"),
        }
    }
    assert_eq!(task_events, 3);

    drop(rx);
    handle.abort();
}

#[tokio::test]
async fn cycles_are_monotonic() {
    let base = serve(healthy_router()).await;
    let client = ApiClient::new(&base);

    let (tx, mut rx) = mpsc::channel(16);
    let refresh = Arc::new(Notify::new());
    let handle = spawn_poller(client, Duration::from_millis(30), refresh, tx);

    let mut last_agents_cycle = 0;
    let mut agents_events = 0;
    while agents_events < 3 {
        let event = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .expect("poll event before timeout")
            .expect("poller alive");
        if let PollEvent::Agents { cycle, .. } = event {
            assert!(cycle > last_agents_cycle);
            last_agents_cycle = cycle;
            agents_events += 1;
        }
    }

    drop(rx);
    handle.abort();
}

#[tokio::test]
async fn manual_refresh_triggers_an_extra_cycle() {
    let base = serve(healthy_router()).await;
    let client = ApiClient::new(&base);

    let (tx, mut rx) = mpsc::channel(16);
    let refresh = Arc::new(Notify::new());
    // Interval far beyond the test timeout: only the startup cycle and the
    // notified cycle can produce events.
    let handle = spawn_poller(client, Duration::from_secs(3600), refresh.clone(), tx);

    let first = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("startup cycle event")
        .expect("poller alive");
    assert_eq!(first.cycle(), 1);
    // Drain the second feed of the startup cycle.
    let second = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("startup cycle event")
        .expect("poller alive");
    assert_eq!(second.cycle(), 1);

    refresh.notify_one();
    let third = tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("refresh cycle event")
        .expect("poller alive");
    assert_eq!(third.cycle(), 2);

    drop(rx);
    handle.abort();
}

#[tokio::test]
async fn poller_stops_when_console_goes_away() {
    let base = serve(healthy_router()).await;
    let client = ApiClient::new(&base);

    let (tx, rx) = mpsc::channel(16);
    let refresh = Arc::new(Notify::new());
    let handle = spawn_poller(client, Duration::from_millis(20), refresh, tx);

    drop(rx);
    tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("poller exits after receiver drop")
        .expect("poller task not panicked");
}
