use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use golmesh_core::{
    ErrorBody, HEALTH_ROUTE, RowRange, SLICE_ROUTE, Slice, SliceRequest, TERMINATE_ROUTE, Turn,
    World,
};
use golmesh_worker::{WorkerService, serve};
use reqwest::StatusCode;
use tokio::net::TcpListener;

#[tokio::test(flavor = "multi_thread")]
async fn worker_serves_slices_until_terminated() -> Result<()> {
    let listener = TcpListener::bind("127.0.0.1:0").await?;
    let base = format!("http://{}", listener.local_addr()?);
    let server = tokio::spawn(serve(listener, Arc::new(WorkerService::new())));
    let client = reqwest::Client::new();

    let health = client.get(format!("{base}{HEALTH_ROUTE}")).send().await?;
    assert!(health.status().is_success());

    let world = World::from_plaintext("....\nOOO.\n....\n....")?;
    let request = SliceRequest::new(Turn(1), RowRange::new(2, 4), Arc::new(world.clone()));
    let slice: Slice = client
        .post(format!("{base}{SLICE_ROUTE}"))
        .json(&request)
        .send()
        .await?
        .error_for_status()?
        .json()
        .await?;
    assert_eq!(slice.rows, RowRange::new(2, 4));
    assert_eq!(slice.alive, 1, "only the bottom of the vertical blinker lands in rows 2..4");

    let bad = SliceRequest::new(Turn(1), RowRange::new(3, 8), Arc::new(world.clone()));
    let response = client
        .post(format!("{base}{SLICE_ROUTE}"))
        .json(&bad)
        .send()
        .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: ErrorBody = response.json().await?;
    assert!(body.error.contains("3..8"), "unexpected error body: {}", body.error);

    let terminated = client.post(format!("{base}{TERMINATE_ROUTE}")).send().await?;
    assert_eq!(terminated.status(), StatusCode::NO_CONTENT);

    tokio::time::timeout(Duration::from_secs(5), server).await???;
    Ok(())
}
