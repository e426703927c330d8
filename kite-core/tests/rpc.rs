//! Two dispatchers wired through the in-process pipe: calls, callbacks,
//! timeouts, panics, and disconnects.

use std::time::Duration;

use kite_core::{pipe, Client, Request, RpcError};
use kite_dnode::{callback, CallValue, IntoCallValue, Partial};
use tokio::sync::mpsc;

fn spawn_pair(a: &Client, b: &Client) {
    let (ta, tb) = pipe();
    let a = a.clone();
    let b = b.clone();
    tokio::spawn(async move { a.run(ta).await });
    tokio::spawn(async move { b.run(tb).await });
}

async fn expect_recv<T>(rx: &mut mpsc::UnboundedReceiver<T>) -> T {
    tokio::time::timeout(Duration::from_secs(2), rx.recv())
        .await
        .expect("channel produced nothing in time")
        .expect("channel closed")
}

#[tokio::test]
async fn call_round_trip() {
    let a = Client::new();
    let b = Client::builder()
        .method("echo", |req: Request| async move {
            Ok(CallValue::String(req.args.must_one().must_string()))
        })
        .build();
    spawn_pair(&a, &b);

    let result = a
        .call("echo", ("hello cenk",), Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(result.must_string(), "hello cenk");
}

#[tokio::test]
async fn unknown_method_notifies_local_observers_only() {
    let a = Client::new();
    let b = Client::new();
    let (tx, mut rx) = mpsc::unbounded_channel();
    b.on_error(move |err| {
        let _ = tx.send(err.to_string());
    });
    spawn_pair(&a, &b);

    a.tell("no-such-method", ()).unwrap();
    let observed = expect_recv(&mut rx).await;
    assert!(observed.contains("no-such-method"), "got: {observed}");
}

#[tokio::test]
async fn embedded_callbacks_route_back_to_the_caller() {
    let b = Client::builder()
        .method("subscribe", |req: Request| async move {
            let listener = req.args.must_one().must_function();
            listener.call(("event-1",)).map_err(RpcError::from)?;
            listener.call(("event-2",)).map_err(RpcError::from)?;
            Ok(CallValue::Bool(true))
        })
        .build();
    let a = Client::new();
    spawn_pair(&a, &b);

    let (tx, mut rx) = mpsc::unbounded_channel();
    let listener = callback(move |args: Partial| {
        let _ = tx.send(args.must_one().must_string());
    });

    let ack = a
        .call(
            "subscribe",
            vec![listener],
            Some(Duration::from_secs(2)),
        )
        .await
        .unwrap();
    assert!(ack.boolean().unwrap());
    assert_eq!(expect_recv(&mut rx).await, "event-1");
    assert_eq!(expect_recv(&mut rx).await, "event-2");
}

#[tokio::test]
async fn timeout_leaves_the_callback_entry_for_explicit_culling() {
    let b = Client::builder()
        .method("slow", |_req: Request| async move {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(CallValue::Null)
        })
        .build();
    let a = Client::new();
    spawn_pair(&a, &b);

    let err = a
        .call("slow", (), Some(Duration::from_millis(50)))
        .await
        .unwrap_err();
    assert!(matches!(err, RpcError::Timeout(_)));

    // The response-callback entry survives the timeout until culled.
    assert_eq!(a.live_callbacks(), 1);
    a.cull(&[0]);
    assert_eq!(a.live_callbacks(), 0);
}

#[tokio::test]
async fn argument_panics_become_error_replies_and_spare_the_connection() {
    let b = Client::builder()
        .method("wants-string", |req: Request| async move {
            // Panics with an argument payload when handed a number.
            Ok(CallValue::String(req.args.must_one().must_string()))
        })
        .method("echo", |req: Request| async move {
            Ok(CallValue::String(req.args.must_one().must_string()))
        })
        .build();
    let a = Client::new();
    spawn_pair(&a, &b);

    let err = a
        .call("wants-string", (42i64,), Some(Duration::from_secs(2)))
        .await
        .unwrap_err();
    match err {
        RpcError::Remote { kind, .. } => assert_eq!(kind, "argumentError"),
        other => panic!("unexpected error: {other}"),
    }

    // The dispatcher did not die with the handler.
    let result = a
        .call("echo", ("still alive",), Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(result.must_string(), "still alive");
}

#[tokio::test]
async fn closing_the_peer_fails_in_flight_calls() {
    let b = Client::builder()
        .method("hang", |_req: Request| async move {
            std::future::pending::<()>().await;
            Ok(CallValue::Null)
        })
        .build();
    let a = Client::new();
    spawn_pair(&a, &b);

    let caller = a.clone();
    let in_flight =
        tokio::spawn(async move { caller.call("hang", (), None).await });

    tokio::time::sleep(Duration::from_millis(100)).await;
    b.close();

    let outcome = in_flight.await.unwrap();
    assert!(matches!(outcome, Err(RpcError::Disconnect)));
}

#[tokio::test]
async fn positional_handlers_bind_tuples() {
    use kite_core::positional;

    let b = Client::builder()
        .method(
            "add",
            positional(|(x, y): (f64, f64)| async move {
                Ok((x + y).into_call_value())
            }),
        )
        .build();
    let a = Client::new();
    spawn_pair(&a, &b);

    let sum = a
        .call("add", (2.0, 3.0), Some(Duration::from_secs(2)))
        .await
        .unwrap();
    assert_eq!(sum.must_float64(), 5.0);
}
