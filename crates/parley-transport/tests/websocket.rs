//! Integration tests for the WebSocket transport.
//!
//! These spin up a real listener and a real client on localhost and check
//! that datagrams cross the background reader/writer tasks intact.

#[cfg(feature = "websocket")]
mod websocket {
    use std::time::Duration;

    use parley_transport::{Connection, Listener, TransportError, WebSocketConnection, WebSocketListener};

    /// Polls `try_recv` until something arrives or the deadline passes.
    async fn recv_within(conn: &mut WebSocketConnection, wait: Duration) -> Option<Vec<u8>> {
        let deadline = tokio::time::Instant::now() + wait;
        while tokio::time::Instant::now() < deadline {
            match conn.try_recv() {
                Ok(Some(data)) => return Some(data),
                Ok(None) => tokio::time::sleep(Duration::from_millis(5)).await,
                Err(_) => return None,
            }
        }
        None
    }

    async fn connected_pair() -> (WebSocketConnection, WebSocketConnection) {
        let mut listener = WebSocketListener::bind("127.0.0.1:0").await.expect("should bind");
        let addr = listener.local_addr().expect("should have addr");

        let accept = tokio::spawn(async move { listener.accept().await.expect("should accept") });
        let client = WebSocketConnection::connect(&format!("ws://{addr}"))
            .await
            .expect("client should connect");
        let host = accept.await.expect("task should complete");
        (host, client)
    }

    #[tokio::test]
    async fn test_websocket_send_and_try_recv_both_directions() {
        let (mut host, mut client) = connected_pair().await;
        assert!(host.is_host());
        assert!(!client.is_host());

        host.send(b"hello from host").expect("send should succeed");
        let got = recv_within(&mut client, Duration::from_secs(2)).await;
        assert_eq!(got.as_deref(), Some(&b"hello from host"[..]));

        client.send_unreliable(b"hello from client").expect("send should succeed");
        let got = recv_within(&mut host, Duration::from_secs(2)).await;
        assert_eq!(got.as_deref(), Some(&b"hello from client"[..]));
    }

    #[tokio::test]
    async fn test_websocket_try_recv_empty_returns_none() {
        let (mut host, _client) = connected_pair().await;
        assert_eq!(host.try_recv().expect("should not error"), None);
    }

    #[tokio::test]
    async fn test_websocket_peer_close_reports_closed() {
        let (mut host, mut client) = connected_pair().await;
        client.close().expect("close should succeed");
        assert!(!client.is_connected());

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let mut result = host.try_recv();
        while matches!(result, Ok(None)) && tokio::time::Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(5)).await;
            result = host.try_recv();
        }
        assert!(matches!(result, Err(TransportError::ConnectionClosed(_))));
        assert!(!host.is_connected());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_websocket_last_frame_before_close_is_delivered() {
        let (mut host, mut client) = connected_pair().await;
        client.send(b"cancel").expect("send should succeed");
        client.close().expect("close should succeed");

        let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
        let mut received = Vec::new();
        let closed = loop {
            match host.try_recv() {
                Ok(Some(data)) => received.push(data),
                Ok(None) if tokio::time::Instant::now() < deadline => {
                    tokio::time::sleep(Duration::from_millis(5)).await;
                }
                Ok(None) => break false,
                Err(e) => break e.is_disconnect(),
            }
        };
        assert_eq!(received, vec![b"cancel".to_vec()]);
        assert!(closed);
    }
}
