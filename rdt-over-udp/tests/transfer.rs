//! End-to-end data transfer between two `RdtTable`s on loopback.
//!
//! Frames carry a fixed 100-byte payload, so a receiver that asks for more
//! than was sent gets the zero padding of the last frame.  The tests below
//! therefore ask for exact lengths unless they are checking that behaviour.

use std::net::SocketAddr;
use std::time::Duration;

use rdt_over_udp::{
    ConnectionState, FaultConfig, Handle, Protocol, RdtConfig, RdtError, RdtTable, PAYLOAD_LEN,
};

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn fast_config() -> RdtConfig {
    RdtConfig::default()
        .with_timeout(Duration::from_millis(100))
        .with_max_retries(20)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 7 % 251) as u8).collect()
}

type Endpoint = (RdtTable, Handle);

/// Connect a client to a listening server, each with its own table.
async fn connected_pair(
    protocol: Protocol,
    server_config: RdtConfig,
    client_config: RdtConfig,
    server_bind: SocketAddr,
    client_bind: SocketAddr,
) -> (Endpoint, Endpoint) {
    let mut server = RdtTable::new(server_config);
    let sh = server.create(protocol).unwrap();
    let server_addr = server.bind_addr(sh, server_bind).unwrap();
    server.listen(sh, 1).unwrap();
    let accept = tokio::spawn(async move {
        let accepted = server.accept(sh).await;
        accepted.map(|h| (server, h))
    });

    let mut client = RdtTable::new(client_config);
    let ch = client.create(protocol).unwrap();
    client.bind_addr(ch, client_bind).unwrap();
    client.connect_addr(ch, server_addr).await.expect("connect");

    let server = tokio::time::timeout(Duration::from_secs(5), accept)
        .await
        .expect("accept timed out")
        .expect("accept task panicked")
        .expect("accept failed");
    ((client, ch), server)
}

async fn pair(protocol: Protocol) -> (Endpoint, Endpoint) {
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    connected_pair(protocol, fast_config(), fast_config(), any, any).await
}

/// Send `data` from the client while the server reads `expect` bytes.
async fn transfer(
    (mut client, ch): Endpoint,
    (mut server, sh): Endpoint,
    data: Vec<u8>,
    expect: usize,
) -> (Endpoint, Endpoint, Vec<u8>) {
    let reader = tokio::spawn(async move {
        let got = server.receive(sh, expect).await;
        got.map(|bytes| (server, bytes))
    });
    client.send(ch, &data).await.expect("send");
    let (server, got) = tokio::time::timeout(Duration::from_secs(10), reader)
        .await
        .expect("receive timed out")
        .unwrap()
        .expect("receive failed");
    ((client, ch), (server, sh), got)
}

/// Close both ends concurrently and check both slots are freed.
async fn close_both((mut client, ch): Endpoint, (mut server, sh): Endpoint) {
    let server_close = tokio::spawn(async move {
        let r = server.close(sh).await;
        (server, r)
    });
    client.close(ch).await.expect("client close");
    let (server, r) = server_close.await.unwrap();
    r.expect("server close");
    assert!(!client.is_created(ch));
    assert!(!server.is_created(sh));
}

// ---------------------------------------------------------------------------
// Stop-and-wait
// ---------------------------------------------------------------------------

/// A on 5791 sends "hello" to B on 18752; B sees the five bytes, then the
/// padding, then the close.
#[tokio::test]
async fn hello_between_fixed_ports() {
    let ((mut a, ah), (mut b, bh)) = connected_pair(
        Protocol::StopAndWait,
        fast_config(),
        fast_config(),
        "127.0.0.1:18752".parse().unwrap(),
        "127.0.0.1:5791".parse().unwrap(),
    )
    .await;
    assert_eq!(b.remote_addr(bh).unwrap(), Some("127.0.0.1:5791".parse().unwrap()));

    let reader = tokio::spawn(async move {
        let hello = b.receive(bh, 5).await.unwrap();
        let padding = b.receive(bh, 100).await.unwrap();
        let after_close = b.receive(bh, 100).await.unwrap();
        let state = b.state(bh).unwrap();
        b.close(bh).await.unwrap();
        (hello, padding, after_close, state)
    });

    a.send(ah, b"hello").await.unwrap();
    a.close(ah).await.unwrap();

    let (hello, padding, after_close, state) = reader.await.unwrap();
    assert_eq!(hello, b"hello");
    assert_eq!(padding, vec![0u8; PAYLOAD_LEN - 5]);
    assert!(after_close.is_empty());
    assert_eq!(state, ConnectionState::RemoteClosing);
}

#[tokio::test]
async fn stop_and_wait_multi_frame_transfer() {
    let (client, server) = pair(Protocol::StopAndWait).await;
    let data = pattern(1000);
    let (client, server, got) = transfer(client, server, data.clone(), 1000).await;
    assert_eq!(got, data);

    let stats = server.0.receive_stats(server.1).unwrap();
    assert_eq!(stats.accepted, 10);
    // ⌈1000/100⌉ frames were acknowledged.
    let c = client.0.connection(client.1).unwrap();
    let s = server.0.connection(server.1).unwrap();
    assert_eq!(c.local_seq(), s.remote_seq().wrapping_add(1));

    close_both(client, server).await;
}

#[tokio::test]
async fn consecutive_sends_keep_sequence() {
    let (client, server) = pair(Protocol::StopAndWait).await;
    let (client, server, first) = transfer(client, server, pattern(300), 300).await;
    let (client, server, second) = transfer(client, server, b"tail".to_vec(), 4).await;
    assert_eq!(first, pattern(300));
    assert_eq!(second, b"tail");
    assert_eq!(server.0.connection(server.1).unwrap().buffered(), PAYLOAD_LEN - 4);
    close_both(client, server).await;
}

/// Bytes of an accepted frame that did not fit are handed out first.
#[tokio::test]
async fn read_ahead_serves_partial_reads() {
    let ((mut client, ch), (mut server, sh)) = pair(Protocol::StopAndWait).await;
    let data = pattern(250);

    let reader = tokio::spawn(async move {
        let first = server.receive(sh, 30).await.unwrap();
        let parked = server.connection(sh).unwrap().buffered();
        let rest_of_frame = server.receive(sh, 70).await.unwrap();
        let two_frames = server.receive(sh, 150).await.unwrap();
        let padding = server.receive(sh, 50).await.unwrap();
        (server, first, parked, rest_of_frame, two_frames, padding)
    });
    client.send(ch, &data).await.unwrap();

    let (server, first, parked, rest_of_frame, two_frames, padding) =
        tokio::time::timeout(Duration::from_secs(10), reader)
            .await
            .unwrap()
            .unwrap();
    assert_eq!(first, &data[..30]);
    assert_eq!(parked, 70);
    assert_eq!(rest_of_frame, &data[30..100]);
    assert_eq!(two_frames, &data[100..250]);
    assert_eq!(padding, vec![0u8; 50]);
    assert_eq!(server.connection(sh).unwrap().buffered(), 0);

    close_both((client, ch), (server, sh)).await;
}

#[tokio::test]
async fn empty_send_is_a_no_op() {
    let ((mut client, ch), server) = pair(Protocol::StopAndWait).await;
    let before = client.connection(ch).unwrap().local_seq();
    client.send(ch, &[]).await.unwrap();
    assert_eq!(client.connection(ch).unwrap().local_seq(), before);
    close_both((client, ch), server).await;
}

// ---------------------------------------------------------------------------
// Selective repeat
// ---------------------------------------------------------------------------

#[tokio::test]
async fn selective_repeat_transfer_wraps_sequence_space() {
    let config = fast_config().with_window(16);
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (client, server) =
        connected_pair(Protocol::SelectiveRepeat, config, config, any, any).await;

    // 300 frames: sequence numbers wrap past 255 at least once.
    let data = pattern(300 * PAYLOAD_LEN);
    let (client, server, got) = transfer(client, server, data.clone(), data.len()).await;
    assert_eq!(got, data);

    let stats = client.0.send_stats(client.1).unwrap().expect("stats recorded");
    assert_eq!(stats.transmits, 300);
    assert_eq!(stats.corruptions, 0);
    assert_eq!(server.0.receive_stats(server.1).unwrap().accepted, 300);

    close_both(client, server).await;
}

/// Corrupted transmissions fail the receiver's checksum and are recovered
/// by retransmission.
#[tokio::test]
async fn selective_repeat_survives_corruption() {
    let server_config = fast_config();
    let client_config = fast_config().with_faults(FaultConfig {
        corrupt_rate: 0.3,
        drop_rate: 0.0,
        seed: Some(42),
    });
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (client, server) = connected_pair(
        Protocol::SelectiveRepeat,
        server_config,
        client_config,
        any,
        any,
    )
    .await;

    let data = pattern(2000);
    let (client, server, got) = transfer(client, server, data.clone(), 2000).await;
    assert_eq!(got, data);

    let stats = client.0.send_stats(client.1).unwrap().unwrap();
    assert_eq!(stats.transmits, 20);
    assert!(stats.corruptions > 0, "seeded run should corrupt something");
    assert!(stats.retransmits >= stats.corruptions);
    assert!(stats.timeouts > 0);

    close_both(client, server).await;
}

#[tokio::test]
async fn selective_repeat_survives_loss() {
    let client_config = fast_config().with_faults(FaultConfig {
        corrupt_rate: 0.0,
        drop_rate: 0.25,
        seed: Some(7),
    });
    let any: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let (client, server) =
        connected_pair(Protocol::SelectiveRepeat, fast_config(), client_config, any, any).await;

    let data = pattern(1500);
    let (client, server, got) = transfer(client, server, data.clone(), 1500).await;
    assert_eq!(got, data);

    let stats = client.0.send_stats(client.1).unwrap().unwrap();
    assert!(stats.drops > 0);
    assert_eq!(
        stats.bytes_sent,
        (stats.transmits + stats.retransmits - stats.drops) * 106
    );

    close_both(client, server).await;
}

// ---------------------------------------------------------------------------
// Unsupported protocol and close semantics
// ---------------------------------------------------------------------------

#[tokio::test]
async fn go_back_n_transfers_are_unsupported() {
    let ((mut client, ch), (mut server, sh)) = pair(Protocol::GoBackN).await;
    assert!(matches!(
        client.send(ch, b"data").await,
        Err(RdtError::Unsupported(Protocol::GoBackN))
    ));
    assert!(matches!(
        server.receive(sh, 10).await,
        Err(RdtError::Unsupported(Protocol::GoBackN))
    ));
    close_both((client, ch), (server, sh)).await;
}

#[tokio::test]
async fn close_twice_is_harmless() {
    let ((mut client, ch), (mut server, sh)) = pair(Protocol::StopAndWait).await;
    let server_close = tokio::spawn(async move {
        server.close(sh).await.unwrap();
        server.close(sh).await.unwrap();
        server
    });
    client.close(ch).await.unwrap();
    client.close(ch).await.unwrap();
    let server = server_close.await.unwrap();

    assert!(!client.is_created(ch));
    assert!(!server.is_created(sh));
    assert!(matches!(
        client.send(ch, b"late").await,
        Err(RdtError::NotCreated(0))
    ));
}

/// A peer that closes while we still have data to send ends the transfer.
#[tokio::test]
async fn send_after_peer_close_reports_peer_closed() {
    let ((mut client, ch), (mut server, sh)) = pair(Protocol::StopAndWait).await;
    let server_close = tokio::spawn(async move { server.close(sh).await });

    let result = client.send(ch, &pattern(500)).await;
    assert!(
        matches!(result, Err(RdtError::PeerClosed)),
        "expected PeerClosed, got: {result:?}"
    );
    assert_eq!(client.state(ch).unwrap(), ConnectionState::RemoteClosing);

    client.close(ch).await.unwrap();
    server_close.await.unwrap().unwrap();
}
