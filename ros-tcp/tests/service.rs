mod common;

use std::time::Duration;

use ros_tcp::ros_msg::{
    AddTwoInts, AddTwoIntsRequest, AddTwoIntsResponse, SetBool, SetBoolRequest, Trigger, TriggerRequest,
    TriggerResponse,
};
use ros_tcp::{Builder, Error};

use crate::common::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_add_two_ints_callback() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let server_node = create_node(&ctx, "add_two_ints_server").await;
    let client_node = create_node(&ctx, "add_two_ints_client").await;

    let server = server_node
        .create_service::<AddTwoInts>("add_two_ints")
        .build_with_callback(|req: AddTwoIntsRequest| Ok(AddTwoIntsResponse { sum: req.a + req.b }))
        .await
        .unwrap();
    assert_eq!(server.name().as_str(), "/add_two_ints");
    assert_eq!(server.uri().scheme(), "rosrpc");

    let client = client_node
        .create_client::<AddTwoInts>("/add_two_ints")
        .build()
        .await
        .unwrap();
    let response = client.call(&AddTwoIntsRequest { a: 1, b: 2 }).await.unwrap();
    assert_eq!(response.sum, 3);

    let response = client.call(&AddTwoIntsRequest { a: -10, b: 52 }).await.unwrap();
    assert_eq!(response.sum, 42);
    assert_eq!(server.calls(), 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_queue_backed_server() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "trigger_node").await;

    let server = node.create_service::<Trigger>("/reset").build().await.unwrap();
    let client = node.create_client::<Trigger>("/reset").build().await.unwrap();

    let call = tokio::spawn(async move { client.call(&TriggerRequest {}).await });

    let (id, _request) = tokio::time::timeout(Duration::from_secs(3), server.take_request_async())
        .await
        .unwrap()
        .unwrap();
    server
        .send_response(
            id,
            &TriggerResponse {
                success: true,
                message: "reset done".into(),
            },
        )
        .unwrap();

    let response = call.await.unwrap().unwrap();
    assert!(response.success);
    assert_eq!(response.message, "reset done");

    // Each id is answered once
    assert!(server.send_response(id, &TriggerResponse::default()).is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_failed_call_reports_message() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "switch").await;

    let _server = node
        .create_service::<SetBool>("/enable")
        .build_with_callback(|req: SetBoolRequest| {
            if req.data {
                Ok(Default::default())
            } else {
                Err("cannot disable".to_string())
            }
        })
        .await
        .unwrap();
    let client = node
        .create_client::<SetBool>("/enable")
        .with_persistent(true)
        .build()
        .await
        .unwrap();

    match client.call(&SetBoolRequest { data: false }).await {
        Err(Error::ServiceFailed(message)) => assert_eq!(message, "cannot disable"),
        other => panic!("unexpected {:?}", other),
    }

    // The persistent connection survives a failed call
    assert!(client.call(&SetBoolRequest { data: true }).await.is_ok());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_persistent_client_reuses_connection() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "adder").await;

    let _server = node
        .create_service::<AddTwoInts>("/add")
        .build_with_callback(|req: AddTwoIntsRequest| Ok(AddTwoIntsResponse { sum: req.a + req.b }))
        .await
        .unwrap();
    let client = node
        .create_client::<AddTwoInts>("/add")
        .with_persistent(true)
        .build()
        .await
        .unwrap();
    assert!(client.is_persistent());

    for i in 0..10 {
        let response = client.call(&AddTwoIntsRequest { a: i, b: i }).await.unwrap();
        assert_eq!(response.sum, 2 * i);
    }
    client.close().await;
    assert_eq!(client.call(&AddTwoIntsRequest { a: 1, b: 1 }).await.unwrap().sum, 2);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_missing_service() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "lonely").await;

    let client = node.create_client::<AddTwoInts>("/nobody_home").build().await.unwrap();
    let result = client.call(&AddTwoIntsRequest { a: 1, b: 2 }).await;
    assert!(matches!(result, Err(Error::NoSuchService(_))), "{:?}", result);

    let waited = client.wait_for_service(Duration::from_millis(300)).await;
    assert!(matches!(waited, Err(Error::Timeout { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_wait_for_service() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let server_node = create_node(&ctx, "late_server").await;
    let client_node = create_node(&ctx, "eager_client").await;

    let client = client_node.create_client::<AddTwoInts>("/late").build().await.unwrap();
    let waiter = tokio::spawn(async move {
        client.wait_for_service(Duration::from_secs(3)).await.unwrap();
        client.call(&AddTwoIntsRequest { a: 20, b: 22 }).await
    });

    tokio::time::sleep(Duration::from_millis(200)).await;
    let _server = server_node
        .create_service::<AddTwoInts>("/late")
        .build_with_callback(|req: AddTwoIntsRequest| Ok(AddTwoIntsResponse { sum: req.a + req.b }))
        .await
        .unwrap();

    assert_eq!(waiter.await.unwrap().unwrap().sum, 42);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_slow_server_times_out() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "sleepy").await;

    // Queue-backed server that never answers
    let _server = node.create_service::<Trigger>("/never").build().await.unwrap();
    let client = node.create_client::<Trigger>("/never").build().await.unwrap();

    let result = client
        .call_timeout(&TriggerRequest {}, Duration::from_millis(300))
        .await;
    assert!(matches!(result, Err(Error::Timeout { .. })));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_duplicate_service_in_one_node() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "dup").await;

    let _first = node.create_service::<Trigger>("/once").build().await.unwrap();
    let second = node.create_service::<Trigger>("/once").build().await;
    assert!(matches!(second, Err(Error::AlreadyRegistered(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_dropped_server_unregisters() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "transient").await;
    let name = ros_tcp::name::GraphName::parse("/transient_srv").unwrap();

    let server = node.create_service::<Trigger>("/transient_srv").build().await.unwrap();
    assert!(master.registry().lookup_service(&name).is_some());

    drop(server);
    assert!(wait_until(Duration::from_secs(3), || {
        let gone = master.registry().lookup_service(&name).is_none();
        async move { gone }
    })
    .await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 1)]
async fn test_server_rebuilt_right_after_drop() {
    let master = start_master().await;
    let ctx = create_context(&master).await;
    let node = create_node(&ctx, "adder").await;
    let name = ros_tcp::name::GraphName::parse("/add").unwrap();
    let add = |req: AddTwoIntsRequest| Ok::<_, String>(AddTwoIntsResponse { sum: req.a + req.b });

    let server = node
        .create_service::<AddTwoInts>("/add")
        .build_with_callback(add)
        .await
        .unwrap();
    drop(server);
    let _server = node
        .create_service::<AddTwoInts>("/add")
        .build_with_callback(add)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(master.registry().lookup_service(&name).is_some());

    let client = node.create_client::<AddTwoInts>("/add").build().await.unwrap();
    assert_eq!(client.call(&AddTwoIntsRequest { a: 2, b: 3 }).await.unwrap().sum, 5);
}
