//! End-to-end tests for the RPC runtime over loopback TCP.
//!
//! These exercise the full flow: client-side encode → pooled channel →
//! server dispatch → response correlation, including the failure paths
//! (unknown service/method, handler errors, timeouts, late responses).

use std::convert::Infallible;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use harpoon::{
    ClientConfig, Discovery, JsonCodec, RpcClient, RpcError, RpcServer, ServerHandle,
    ServiceBuilder, ServiceLocation, StaticDiscovery,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct AddArgs {
    a: i64,
    b: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct AddReply {
    sum: i64,
}

/// Calc service plus a deliberately slow and a deliberately failing method.
fn register_test_services<C: harpoon::Codec>(server: &RpcServer<C>, codec: C) {
    server.register(
        ServiceBuilder::new("Calc", codec.clone())
            .method("Add", |args: AddArgs| async move {
                Ok::<_, Infallible>(AddReply { sum: args.a + args.b })
            })
            .method("Div", |args: AddArgs| async move {
                if args.b == 0 {
                    Err("division by zero".to_string())
                } else {
                    Ok(AddReply { sum: args.a / args.b })
                }
            })
            .finish(),
    );
    server.register(
        ServiceBuilder::new("Slow", codec)
            .method("Sleep", |delay_ms: u64| async move {
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                Ok::<_, Infallible>(delay_ms)
            })
            .finish(),
    );
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

async fn start_server() -> ServerHandle {
    init_tracing();
    let server = RpcServer::new();
    register_test_services(&server, harpoon::BincodeCodec);
    server.serve("127.0.0.1:0").await.expect("serve")
}

fn client_for(handle: &ServerHandle, config: ClientConfig) -> RpcClient {
    RpcClient::with_codec(
        handle.local_addr().to_string(),
        harpoon::BincodeCodec,
        config,
    )
}

#[tokio::test]
async fn calc_add_scenario() {
    let handle = start_server().await;
    let client = client_for(&handle, ClientConfig::default());

    let reply: AddReply = client
        .invoke("Calc", "Add", &AddArgs { a: 1, b: 2 })
        .await
        .expect("invoke");
    assert_eq!(reply.sum, 3);
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn unknown_service_is_reported_not_fatal() {
    let handle = start_server().await;
    let client = client_for(&handle, ClientConfig::default());

    let result: Result<AddReply, _> = client.invoke("Nope", "Add", &AddArgs { a: 1, b: 2 }).await;
    match result {
        Err(RpcError::Remote(msg)) => {
            assert_eq!(msg, "service not exist or service not registered")
        }
        other => panic!("unexpected result: {other:?}"),
    }

    // The server survived; a valid call still works.
    let reply: AddReply = client
        .invoke("Calc", "Add", &AddArgs { a: 2, b: 3 })
        .await
        .expect("invoke after failure");
    assert_eq!(reply.sum, 5);
}

#[tokio::test]
async fn unknown_method_is_reported() {
    let handle = start_server().await;
    let client = client_for(&handle, ClientConfig::default());

    let result: Result<AddReply, _> = client.invoke("Calc", "Nope", &AddArgs { a: 1, b: 2 }).await;
    match result {
        Err(RpcError::Remote(msg)) => assert_eq!(msg, "method not found: Calc.Nope"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test]
async fn handler_error_carried_verbatim() {
    let handle = start_server().await;
    let client = client_for(&handle, ClientConfig::default());

    let result: Result<AddReply, _> = client.invoke("Calc", "Div", &AddArgs { a: 1, b: 0 }).await;
    match result {
        Err(RpcError::Remote(msg)) => assert_eq!(msg, "division by zero"),
        other => panic!("unexpected result: {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_calls_exceed_pool_capacity() {
    let handle = start_server().await;
    let client = Arc::new(client_for(
        &handle,
        ClientConfig::new()
            .pool_size(2)
            .call_timeout(Duration::from_secs(5)),
    ));

    let mut calls = Vec::new();
    for i in 0..16i64 {
        let client = Arc::clone(&client);
        calls.push(tokio::spawn(async move {
            let reply: AddReply = client
                .invoke("Calc", "Add", &AddArgs { a: i, b: 1000 })
                .await
                .expect("invoke");
            (i, reply)
        }));
    }

    for call in calls {
        let (i, reply) = call.await.expect("join");
        assert_eq!(reply.sum, i + 1000, "call {i} got someone else's reply");
    }
    assert!(client.pool().live_channels() <= client.pool().max_size());
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test]
async fn timeout_evicts_pending_slot() {
    let handle = start_server().await;
    let client = client_for(&handle, ClientConfig::default());

    let result: Result<u64, _> = client
        .invoke_with_timeout("Slow", "Sleep", &400u64, Duration::from_millis(50))
        .await;
    assert!(matches!(result, Err(RpcError::Timeout)));
    assert_eq!(client.in_flight(), 0, "timed-out slot must not leak");

    // The late response eventually arrives and is dropped; nothing panics
    // and subsequent calls are unaffected.
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert_eq!(client.in_flight(), 0);
    let reply: AddReply = client
        .invoke("Calc", "Add", &AddArgs { a: 4, b: 4 })
        .await
        .expect("invoke after late response");
    assert_eq!(reply.sum, 8);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn late_response_does_not_cross_deliver() {
    let handle = start_server().await;
    let client = Arc::new(client_for(&handle, ClientConfig::default()));

    // Call A times out while its response is still being computed.
    let a = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .invoke_with_timeout::<_, u64>("Slow", "Sleep", &300u64, Duration::from_millis(50))
                .await
        })
    };
    // Call B runs concurrently and must receive its own reply.
    let b = {
        let client = Arc::clone(&client);
        tokio::spawn(async move {
            client
                .invoke::<_, AddReply>("Calc", "Add", &AddArgs { a: 20, b: 22 })
                .await
        })
    };

    assert!(matches!(a.await.expect("join"), Err(RpcError::Timeout)));
    assert_eq!(b.await.expect("join").expect("call B").sum, 42);

    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(client.in_flight(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn pool_of_one_serializes_sends_but_both_calls_succeed() {
    let handle = start_server().await;
    let client = Arc::new(client_for(
        &handle,
        ClientConfig::new()
            .pool_size(1)
            .call_timeout(Duration::from_secs(5)),
    ));

    let completed = Arc::new(AtomicUsize::new(0));
    let mut calls = Vec::new();
    for i in 0..2i64 {
        let client = Arc::clone(&client);
        let completed = Arc::clone(&completed);
        calls.push(tokio::spawn(async move {
            let reply: AddReply = client
                .invoke("Calc", "Add", &AddArgs { a: i, b: 10 })
                .await
                .expect("invoke");
            completed.fetch_add(1, Ordering::SeqCst);
            reply
        }));
    }
    for (i, call) in calls.into_iter().enumerate() {
        assert_eq!(call.await.expect("join").sum, i as i64 + 10);
    }
    assert_eq!(completed.load(Ordering::SeqCst), 2);
    assert_eq!(client.pool().live_channels(), 1);
}

#[tokio::test]
async fn json_codec_end_to_end() {
    let server = RpcServer::with_codec(JsonCodec);
    register_test_services(&server, JsonCodec);
    let handle = server.serve("127.0.0.1:0").await.expect("serve");

    let client = RpcClient::with_codec(
        handle.local_addr().to_string(),
        JsonCodec,
        ClientConfig::default(),
    );
    let reply: AddReply = client
        .invoke("Calc", "Add", &AddArgs { a: 7, b: 35 })
        .await
        .expect("invoke");
    assert_eq!(reply.sum, 42);
}

#[tokio::test]
async fn discovery_resolves_server_address() {
    let handle = start_server().await;

    let discovery = StaticDiscovery::new();
    let id = discovery
        .register(ServiceLocation {
            service: "Calc".to_string(),
            address: handle.local_addr().to_string(),
        })
        .await
        .expect("register");

    let location = discovery.discover("Calc").await.expect("discover");
    let client = RpcClient::new(location.address);
    let reply: AddReply = client
        .invoke("Calc", "Add", &AddArgs { a: 1, b: 2 })
        .await
        .expect("invoke");
    assert_eq!(reply.sum, 3);

    discovery.deregister(&id).await.expect("deregister");
}
