use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, CONNECTION, CONTENT_LENGTH, CONTENT_TYPE, COOKIE, HOST, USER_AGENT};
use http::{HeaderName, HeaderValue, StatusCode};
use rpcwire::error::{ConfigError, ConnectionError, ResponseFormatError};
use rpcwire::{CookieKeeper, Error, ServerProxy};
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use tokio::io::{AsyncReadExt as _, AsyncWriteExt as _};

mod support;

use support::{echo_id, echo_params, BoxError, Reply};

#[tokio::test]
async fn ids_increase_per_call() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(echo_id).await;

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_pool()
        .build()?;

    for expected in 1..=3 {
        let id = proxy.call("examples.echo", ()).await?;
        assert_eq!(id, json!(expected));
    }
    assert_eq!(proxy.next_id(), 4);

    let ids: Vec<Value> = state
        .requests()
        .into_iter()
        .map(|request| request.body["id"].clone())
        .collect();
    assert_eq!(ids, vec![json!(1), json!(2), json!(3)]);

    // Pooled calls share one connection.
    assert_eq!(state.accepted(), 1);
    assert_eq!(proxy.pool().map(|pool| pool.len()), Some(1));
    Ok(())
}

#[tokio::test]
async fn unpooled_calls_use_fresh_connections() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(echo_id).await;

    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;
    proxy.call("ping", ()).await?;
    proxy.call("ping", ()).await?;

    assert_eq!(state.accepted(), 2);
    assert!(!state.last_request().headers.contains_key(CONNECTION));
    Ok(())
}

#[tokio::test]
async fn request_wire_format() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(echo_params).await;

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_pool()
        .with_user_agent("tests/1.0")
        .with_header(
            HeaderName::from_static("x-trace"),
            HeaderValue::from_static("abc"),
        )
        .build()?;

    let result = proxy
        .call("examples.getStateName", vec![json!(41)])
        .await?;
    assert_eq!(result, json!([41]));

    let request = state.last_request();
    assert_eq!(
        request.body,
        json!({"id": 1, "method": "examples.getStateName", "params": [41]})
    );
    assert_eq!(request.headers[CONTENT_TYPE], "application/json");
    assert_eq!(request.headers[USER_AGENT], "tests/1.0");
    assert_eq!(request.headers[HOST], addr.to_string());
    assert_eq!(request.headers[CONNECTION], "keep-alive");
    assert_eq!(request.headers["x-trace"], "abc");

    let length: usize = request.headers[CONTENT_LENGTH].to_str()?.parse()?;
    assert_eq!(length, serde_json::to_vec(&request.body)?.len());
    Ok(())
}

#[tokio::test]
async fn named_params() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, _state) = support::serve(echo_params).await;
    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;

    let mut kwargs = Map::new();
    kwargs.insert("a".into(), json!(1));
    kwargs.insert("b".into(), json!("two"));

    let result = proxy.call_args("sum", Vec::new(), kwargs.clone()).await?;
    assert_eq!(result, Value::Object(kwargs));
    Ok(())
}

#[tokio::test]
async fn mixed_params_never_reach_the_server() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(echo_id).await;
    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;

    let mut kwargs = Map::new();
    kwargs.insert("b".into(), json!(2));
    let err = proxy
        .call_args("sum", vec![json!(1)], kwargs)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::InvalidParams(_)));
    assert_eq!(state.accepted(), 0);
    assert_eq!(proxy.next_id(), 1);
    Ok(())
}

#[tokio::test]
async fn null_body_is_an_empty_result() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, _state) = support::serve(|_| Reply::raw(200, "null")).await;
    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;

    assert_eq!(proxy.call("notify", ()).await?, Value::Null);
    Ok(())
}

#[tokio::test]
async fn remote_fault() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, _state) = support::serve(|_| {
        Reply::json(json!({"result": null, "error": {"code": 7, "message": "boom"}}))
    })
    .await;
    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;

    let err = proxy.call("explode", ()).await.unwrap_err();
    assert!(err.is_fault());
    let fault = err.as_fault().unwrap();
    assert_eq!(fault.code, 7);
    assert_eq!(fault.message, "boom");
    Ok(())
}

#[tokio::test]
async fn malformed_response_preview_is_bounded() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, _state) =
        support::serve(|_| Reply::json(json!({"unexpected": "x".repeat(10_000)}))).await;
    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;

    match proxy.call("examples.echo", ()).await.unwrap_err() {
        Error::ResponseFormat(ResponseFormatError::Malformed { method, preview }) => {
            assert_eq!(method, "examples.echo");
            assert!(preview.chars().count() <= 256);
        }
        other => panic!("unexpected error: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn invalid_json_response() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, _state) = support::serve(|_| Reply::raw(200, "<html>")).await;
    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;

    let err = proxy.call("ping", ()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::ResponseFormat(ResponseFormatError::Json(_))
    ));
    Ok(())
}

#[tokio::test]
async fn protocol_error_keeps_pooled_connection() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(|request| {
        if request.sequence == 0 {
            Reply::raw(500, "kaput")
        } else {
            echo_id(request)
        }
    })
    .await;

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_pool()
        .build()?;

    match proxy.call("ping", ()).await.unwrap_err() {
        Error::Protocol(error) => {
            assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR);
            assert_eq!(error.reason, "Internal Server Error");
            assert_eq!(error.url, format!("{addr}/rpc"));
            // The request headers, kept for diagnostics.
            assert_eq!(error.headers[CONTENT_TYPE], "application/json");
            assert_eq!(error.headers[CONNECTION], "keep-alive");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(proxy.pool().map(|pool| pool.len()), Some(1));

    assert_eq!(proxy.call("ping", ()).await?, json!(2));
    assert_eq!(state.accepted(), 1);
    Ok(())
}

#[tokio::test]
async fn stalled_error_body_is_bounded_by_timeout() -> Result<(), BoxError> {
    support::init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await?;
        let mut buf = [0u8; 1024];
        let _ = socket.read(&mut buf).await?;
        socket
            .write_all(b"HTTP/1.1 500 Internal Server Error\r\nContent-Length: 100\r\n\r\npartial")
            .await?;
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
        Ok::<_, std::io::Error>(())
    });

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_timeout(Duration::from_millis(200))
        .with_pool()
        .build()?;

    let err = tokio::time::timeout(Duration::from_secs(3), proxy.call("ping", ()))
        .await?
        .unwrap_err();
    match err {
        Error::Protocol(error) => assert_eq!(error.status, StatusCode::INTERNAL_SERVER_ERROR),
        other => panic!("unexpected error: {other:?}"),
    }
    // The connection still has an unread body, so it cannot be reused.
    assert_eq!(proxy.pool().map(|pool| pool.len()), Some(0));

    server.abort();
    Ok(())
}

#[tokio::test]
async fn broken_connection_is_evicted() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(|request| {
        if request.connection == 0 && request.sequence == 1 {
            Reply::drop_connection()
        } else {
            echo_id(request)
        }
    })
    .await;

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_pool()
        .build()?;

    assert_eq!(proxy.call("ping", ()).await?, json!(1));

    let err = proxy.call("ping", ()).await.unwrap_err();
    assert!(err.is_connection(), "unexpected error: {err:?}");
    assert_eq!(proxy.pool().map(|pool| pool.len()), Some(0));

    assert_eq!(proxy.call("ping", ()).await?, json!(3));
    assert_eq!(state.accepted(), 2);
    assert_eq!(proxy.pool().map(|pool| pool.len()), Some(1));
    Ok(())
}

#[tokio::test]
async fn pool_outlives_client() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(echo_id).await;
    let uri = format!("http://{addr}/rpc");

    let mut first = ServerProxy::builder(uri.as_str()).with_pool().build()?;
    first.call("ping", ()).await?;
    let pool = first.take_pool();

    let mut second = ServerProxy::new(uri.as_str())?;
    second.set_pool(pool);
    second.call("ping", ()).await?;

    assert_eq!(state.accepted(), 1);
    Ok(())
}

#[tokio::test]
async fn credentials_send_basic_auth() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(echo_id).await;

    let mut proxy = ServerProxy::new(format!("http://alice:s%40cret@{addr}/rpc"))?;
    proxy.call("whoami", ()).await?;

    let request = state.last_request();
    // base64("alice:s@cret")
    assert_eq!(request.headers[AUTHORIZATION], "Basic YWxpY2U6c0BjcmV0");
    assert_eq!(request.headers[HOST], addr.to_string());
    Ok(())
}

#[tokio::test]
async fn cookie_keeper_round_trip() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(|request| {
        let reply = echo_id(request);
        if request.sequence == 0 {
            reply.with_header("set-cookie", "session=abc; Path=/; HttpOnly")
        } else {
            reply
        }
    })
    .await;

    let keeper = Arc::new(Mutex::new(
        CookieKeeper::new().with_auto_add_cookies(true),
    ));
    keeper.lock().set("lang", "en");

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_pool()
        .with_hook(keeper.clone())
        .build()?;

    proxy.call("login", ()).await?;
    assert_eq!(state.last_request().headers[COOKIE], "lang=en");
    assert_eq!(keeper.lock().response_cookie("session"), Some("abc"));

    proxy.call("whoami", ()).await?;
    assert_eq!(state.last_request().headers[COOKIE], "lang=en; session=abc");
    Ok(())
}

#[tokio::test]
async fn cookie_keeper_does_not_echo_by_default() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, state) = support::serve(|request| {
        echo_id(request).with_header("set-cookie", "session=abc")
    })
    .await;

    let keeper = Arc::new(Mutex::new(CookieKeeper::new()));
    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_hook(keeper.clone())
        .build()?;

    proxy.call("login", ()).await?;
    proxy.call("whoami", ()).await?;

    assert_eq!(keeper.lock().response_cookie("session"), Some("abc"));
    assert!(!state.last_request().headers.contains_key(COOKIE));
    Ok(())
}

#[tokio::test]
async fn typed_and_raw_calls() -> Result<(), BoxError> {
    support::init_tracing();
    let (addr, _state) = support::serve(echo_params).await;
    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_pool()
        .build()?;

    let numbers: Vec<u32> = proxy.call_as("echo", vec![json!(1), json!(2)]).await?;
    assert_eq!(numbers, vec![1, 2]);

    let err = proxy
        .call_as::<Vec<u32>>("echo", vec![json!("x")])
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        Error::ResponseFormat(ResponseFormatError::Json(_))
    ));

    let raw = proxy.call_raw("echo", vec![json!(true)]).await?;
    assert_eq!(raw.status(), StatusCode::OK);
    let body: Value = serde_json::from_slice(raw.body())?;
    assert_eq!(body["result"], json!([true]));
    Ok(())
}

#[tokio::test]
async fn unresponsive_server_times_out() -> Result<(), BoxError> {
    support::init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    let server = tokio::spawn(async move {
        let (socket, _) = listener.accept().await?;
        tokio::time::sleep(Duration::from_secs(10)).await;
        drop(socket);
        Ok::<_, std::io::Error>(())
    });

    let mut proxy = ServerProxy::builder(format!("http://{addr}/rpc"))
        .with_timeout(Duration::from_millis(200))
        .build()?;

    match proxy.call("ping", ()).await.unwrap_err() {
        Error::Connection(ConnectionError::Timeout { timeout, .. }) => {
            assert_eq!(timeout, Duration::from_millis(200));
        }
        other => panic!("unexpected error: {other:?}"),
    }

    server.abort();
    Ok(())
}

#[tokio::test]
async fn connection_refused() -> Result<(), BoxError> {
    support::init_tracing();
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
    let addr = listener.local_addr()?;
    drop(listener);

    let mut proxy = ServerProxy::new(format!("http://{addr}/rpc"))?;
    let err = proxy.call("ping", ()).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Connection(ConnectionError::Io { .. })
    ));
    assert!(std::error::Error::source(&err).is_some());
    Ok(())
}

#[test]
fn unsupported_scheme_fails_at_construction() {
    let err = ServerProxy::new("gopher://rpc.example.com/").unwrap_err();
    assert!(matches!(
        err,
        Error::Configuration(ConfigError::UnsupportedScheme(_))
    ));
}
