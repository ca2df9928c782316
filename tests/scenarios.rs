//! End-to-end scenarios from this crate's specification §8, driven against
//! the bare-bones fake server in `tests/support`.

mod support;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use rfc6455_ws::client::{Client, UrlProducer};
use rfc6455_ws::config::DialOptions;
use rfc6455_ws::dial::dial;
use rfc6455_ws::message::Message;
use rfc6455_ws::status::StatusCode;

use support::{
    OPCODE_BINARY, OPCODE_CLOSE, OPCODE_CONTINUATION, OPCODE_PING, OPCODE_PONG, OPCODE_TEXT,
};

/// S1: dial an echoing server, send "hello", expect it back, then close
/// cleanly and observe the inbound channel close.
#[tokio::test]
async fn echo_text() {
    let (url, listener) = support::listen().await;
    let server_task = tokio::spawn(async move {
        let mut server = support::accept_one(&listener).await;
        let (fin, opcode, payload) = support::read_frame(&mut server).await;
        assert!(fin);
        assert_eq!(opcode, OPCODE_TEXT);
        support::write_frame(&mut server, true, OPCODE_TEXT, &payload).await;

        let (_, opcode, payload) = support::read_frame(&mut server).await;
        assert_eq!(opcode, OPCODE_CLOSE);
        support::write_frame(&mut server, true, OPCODE_CLOSE, &payload).await;
    });

    let mut connection = dial(&url, &DialOptions::default()).await.unwrap();

    let reply = connection.send_text("hello").await.unwrap();
    reply.await.unwrap().unwrap();

    let message = connection.recv().await.unwrap();
    assert_eq!(message, Message::Text("hello".into()));

    connection.close(StatusCode::NORMAL_CLOSURE, "").await.unwrap();
    assert!(connection.recv().await.is_none());

    server_task.await.unwrap();
}

/// S2: a server-initiated fragmented Text message reassembles into one
/// Message.
#[tokio::test]
async fn fragmented_reassembly() {
    let (url, listener) = support::listen().await;
    let server_task = tokio::spawn(async move {
        let mut server = support::accept_one(&listener).await;
        support::write_frame(&mut server, false, OPCODE_TEXT, b"He").await;
        support::write_frame(&mut server, false, OPCODE_CONTINUATION, b"ll").await;
        support::write_frame(&mut server, true, OPCODE_CONTINUATION, b"o").await;

        let (_, opcode, payload) = support::read_frame(&mut server).await;
        assert_eq!(opcode, OPCODE_CLOSE);
        support::write_frame(&mut server, true, OPCODE_CLOSE, &payload).await;
    });

    let mut connection = dial(&url, &DialOptions::default()).await.unwrap();

    let message = connection.recv().await.unwrap();
    assert_eq!(message, Message::Text("Hello".into()));

    connection.close(StatusCode::NORMAL_CLOSURE, "").await.unwrap();
    server_task.await.unwrap();
}

/// S3: a Ping interleaved between fragments of a Binary message is
/// answered with a matching Pong, and the fragments still reassemble in
/// order.
#[tokio::test]
async fn interleaved_ping_during_fragmentation() {
    let (url, listener) = support::listen().await;
    let server_task = tokio::spawn(async move {
        let mut server = support::accept_one(&listener).await;
        support::write_frame(&mut server, false, OPCODE_BINARY, &[0x01, 0x02]).await;
        support::write_frame(&mut server, true, OPCODE_PING, &[0xAA]).await;
        support::write_frame(&mut server, true, OPCODE_CONTINUATION, &[0x03]).await;

        let (fin, opcode, payload) = support::read_frame(&mut server).await;
        assert!(fin);
        assert_eq!(opcode, OPCODE_PONG);
        assert_eq!(payload, vec![0xAA]);

        let (_, opcode, payload) = support::read_frame(&mut server).await;
        assert_eq!(opcode, OPCODE_CLOSE);
        support::write_frame(&mut server, true, OPCODE_CLOSE, &payload).await;
    });

    let mut connection = dial(&url, &DialOptions::default()).await.unwrap();

    let message = connection.recv().await.unwrap();
    assert_eq!(message, Message::Binary(vec![0x01, 0x02, 0x03]));

    connection.close(StatusCode::NORMAL_CLOSURE, "").await.unwrap();
    server_task.await.unwrap();
}

/// S4: a Text message that isn't valid UTF-8 is a protocol violation -
/// the client closes with 1007 and the inbound channel ends without ever
/// surfacing the bad message.
#[tokio::test]
async fn invalid_utf8_closes_with_invalid_data() {
    let (url, listener) = support::listen().await;
    let server_task = tokio::spawn(async move {
        let mut server = support::accept_one(&listener).await;
        support::write_frame(&mut server, true, OPCODE_TEXT, &[0xC3, 0x28]).await;

        let (fin, opcode, payload) = support::read_frame(&mut server).await;
        assert!(fin);
        assert_eq!(opcode, OPCODE_CLOSE);
        assert_eq!(
            u16::from_be_bytes([payload[0], payload[1]]),
            StatusCode::INVALID_DATA.as_u16()
        );
    });

    let mut connection = dial(&url, &DialOptions::default()).await.unwrap();
    assert!(connection.recv().await.is_none());

    server_task.await.unwrap();
}

/// S5: a masked server->client frame is itself a protocol violation.
#[tokio::test]
async fn masked_server_frame_is_rejected() {
    let (url, listener) = support::listen().await;
    let server_task = tokio::spawn(async move {
        let mut server = support::accept_one(&listener).await;
        support::write_masked_frame(&mut server, OPCODE_TEXT, b"h").await;

        let (_, opcode, payload) = support::read_frame(&mut server).await;
        assert_eq!(opcode, OPCODE_CLOSE);
        assert_eq!(
            u16::from_be_bytes([payload[0], payload[1]]),
            StatusCode::PROTOCOL_ERROR.as_u16()
        );
    });

    let mut connection = dial(&url, &DialOptions::default()).await.unwrap();
    assert!(connection.recv().await.is_none());

    server_task.await.unwrap();
}

/// Property 9: concurrent `new_or_cached` calls for the same id collapse
/// onto a single `Client`, and the loser's freshly-dialed connection is
/// closed with GoingAway rather than leaked.
#[tokio::test]
async fn new_or_cached_deduplicates_concurrent_callers() {
    let (url, listener) = support::listen().await;
    let server_task = tokio::spawn(async move {
        // Two dial attempts race; accept both handshakes so neither dialer
        // blocks. Whichever loses the cache race gets a GoingAway close
        // almost immediately; the winner's socket just stays idle, so only
        // wait (briefly) for a close frame on each and don't fail if one
        // never arrives.
        let mut first = support::accept_one(&listener).await;
        let mut second = support::accept_one(&listener).await;

        for server in [&mut first, &mut second] {
            if let Ok((_, opcode, payload)) =
                tokio::time::timeout(Duration::from_millis(500), support::read_frame(server)).await
            {
                if opcode == OPCODE_CLOSE {
                    assert_eq!(
                        u16::from_be_bytes([payload[0], payload[1]]),
                        StatusCode::GOING_AWAY.as_u16()
                    );
                }
            }
        }
    });

    let url_fn: UrlProducer = {
        let url = url.clone();
        Arc::new(move || -> BoxFuture<'static, rfc6455_ws::error::Result<String>> {
            let url = url.clone();
            Box::pin(async move { Ok(url) })
        })
    };

    let id = "dedup-test";
    let (a, b) = tokio::join!(
        Client::new_or_cached(id, url_fn.clone(), DialOptions::default()),
        Client::new_or_cached(id, url_fn, DialOptions::default()),
    );
    let a = a.unwrap();
    let b = b.unwrap();
    assert!(Arc::ptr_eq(&a, &b));

    if let Ok(result) = tokio::time::timeout(Duration::from_secs(2), server_task).await {
        result.unwrap();
    }
}

/// S6 / property 10: `refresh_in` hands the consumer off from a primary to
/// a standby connection with no gap and no duplicate - every message the
/// primary had buffered arrives, then messages keep flowing from the
/// standby, with no close event visible to the consumer in between.
#[tokio::test]
async fn refresh_hands_off_to_standby_without_a_gap() {
    let (primary_url, primary_listener) = support::listen().await;
    let (standby_url, standby_listener) = support::listen().await;

    let primary_task = tokio::spawn(async move {
        let mut server = support::accept_one(&primary_listener).await;
        support::write_frame(&mut server, true, OPCODE_TEXT, b"m1").await;

        let (_, opcode, payload) = support::read_frame(&mut server).await;
        assert_eq!(opcode, OPCODE_CLOSE);
        assert_eq!(
            u16::from_be_bytes([payload[0], payload[1]]),
            StatusCode::GOING_AWAY.as_u16()
        );
        support::write_frame(&mut server, true, OPCODE_CLOSE, &payload).await;
    });

    let standby_task = tokio::spawn(async move {
        let mut server = support::accept_one(&standby_listener).await;
        support::write_frame(&mut server, true, OPCODE_TEXT, b"m2").await;
        server
    });

    let call_count = Arc::new(AtomicUsize::new(0));
    let url_fn: UrlProducer = {
        let primary_url = primary_url.clone();
        let standby_url = standby_url.clone();
        Arc::new(move || -> BoxFuture<'static, rfc6455_ws::error::Result<String>> {
            let n = call_count.fetch_add(1, Ordering::SeqCst);
            let url = if n == 0 { primary_url.clone() } else { standby_url.clone() };
            Box::pin(async move { Ok(url) })
        })
    };

    let client = Client::new_or_cached("refresh-test", url_fn, DialOptions::default())
        .await
        .unwrap();

    client.refresh_in(Duration::from_millis(20));

    let first = client.recv().await.unwrap();
    assert_eq!(first, Message::Text("m1".into()));

    let second = client.recv().await.unwrap();
    assert_eq!(second, Message::Text("m2".into()));

    primary_task.await.unwrap();
    standby_task.await.unwrap();
}
