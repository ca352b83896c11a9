
use std::sync::atomic::Ordering;
use std::time::Duration;

use harness::{make_rule, refused_addr, spawn_proxy, wait_until, EchoBackend, HalfCloseBackend};
use tcprelay_relayd::proxy::ProxyServer;
use tcprelay_rules::RuleSet;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);
const GRACE: Duration = Duration::from_millis(500);

#[tokio::test]
async fn ping_round_trips_through_proxy() {
    let echo = EchoBackend::spawn().await.unwrap();
    let proxy = spawn_proxy(vec![make_rule(1, 0, echo.addr)]).await;

    let mut client = TcpStream::connect(proxy.listen_addrs()[0]).await.unwrap();
    client.write_all(b"ping").await.unwrap();

    let mut reply = [0u8; 4];
    timeout(TEST_TIMEOUT, client.read_exact(&mut reply))
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(&reply, b"ping");

    assert_eq!(echo.connection_count(), 1);
    drop(client);
    proxy.stop(GRACE).await;
}

#[tokio::test]
async fn large_transfer_is_byte_exact() {
    let echo = EchoBackend::spawn().await.unwrap();
    let proxy = spawn_proxy(vec![make_rule(1, 0, echo.addr)]).await;

    // Larger than the relay's copy buffer in both directions.
    let payload: Vec<u8> = (0..256 * 1024).map(|i| (i % 251) as u8).collect();

    let mut client = TcpStream::connect(proxy.listen_addrs()[0]).await.unwrap();

    let (mut read_half, mut write_half) = client.split();
    let send = async {
        write_half.write_all(&payload).await?;
        write_half.shutdown().await
    };
    let recv = async {
        let mut echoed = Vec::with_capacity(payload.len());
        read_half.read_to_end(&mut echoed).await?;
        Ok::<_, std::io::Error>(echoed)
    };

    let (sent, echoed) = timeout(TEST_TIMEOUT, async { tokio::join!(send, recv) })
        .await
        .expect("transfer timed out");
    sent.unwrap();
    assert_eq!(echoed.unwrap(), payload);

    proxy.stop(GRACE).await;
}

#[tokio::test]
async fn zero_byte_connection_tears_down_cleanly() {
    let echo = EchoBackend::spawn().await.unwrap();
    let proxy = spawn_proxy(vec![make_rule(1, 0, echo.addr)]).await;
    let listen_addr = proxy.listen_addrs()[0];

    // Connect and disconnect without sending anything.
    let client = TcpStream::connect(listen_addr).await.unwrap();
    drop(client);

    // The relay must notice and release the connection without error.
    assert!(
        wait_until(|| proxy.active_relays() == 0, TEST_TIMEOUT).await,
        "relay did not tear down"
    );
    assert_eq!(proxy.stats().relays_failed.load(Ordering::Relaxed), 0);

    // The listener still serves new connections.
    let mut client = TcpStream::connect(listen_addr).await.unwrap();
    client.write_all(b"ping").await.unwrap();
    let mut reply = [0u8; 4];
    timeout(TEST_TIMEOUT, client.read_exact(&mut reply))
        .await
        .expect("read timed out")
        .unwrap();
    assert_eq!(&reply, b"ping");

    proxy.stop(GRACE).await;
}

#[tokio::test]
async fn half_close_propagates_to_destination() {
    let backend = HalfCloseBackend::spawn(b"done").await.unwrap();
    let proxy = spawn_proxy(vec![make_rule(1, 0, backend.addr)]).await;

    let mut client = TcpStream::connect(proxy.listen_addrs()[0]).await.unwrap();
    client.write_all(b"hello").await.unwrap();
    // Close our write side; the backend replies only after it sees EOF.
    client.shutdown().await.unwrap();

    let mut reply = Vec::new();
    timeout(TEST_TIMEOUT, client.read_to_end(&mut reply))
        .await
        .expect("half-close did not propagate")
        .unwrap();
    assert_eq!(reply, b"done");

    proxy.stop(GRACE).await;
}

#[tokio::test]
async fn refused_destination_closes_client_promptly() {
    let dest = refused_addr().await;
    let dial_timeout = Duration::from_millis(500);

    let proxy = ProxyServer::with_dial_timeout(dial_timeout)
        .start(RuleSet::new(vec![make_rule(1, 0, dest)]))
        .await
        .unwrap();
    let listen_addr = proxy.listen_addrs()[0];

    let mut client = TcpStream::connect(listen_addr).await.unwrap();
    let mut buf = [0u8; 1];
    let n = timeout(dial_timeout + Duration::from_secs(1), client.read(&mut buf))
        .await
        .expect("client was left hanging")
        .unwrap_or(0);
    assert_eq!(n, 0, "client socket should just close");

    // The accept loop is unaffected: the next connection is handled too.
    let mut client = TcpStream::connect(listen_addr).await.unwrap();
    let n = timeout(dial_timeout + Duration::from_secs(1), client.read(&mut buf))
        .await
        .expect("accept loop stopped serving")
        .unwrap_or(0);
    assert_eq!(n, 0);

    // The relay tasks record the dial failures once they unwind.
    assert!(
        wait_until(
            || proxy.stats().relays_failed.load(Ordering::Relaxed) >= 2,
            TEST_TIMEOUT
        )
        .await,
        "dial failures were not recorded"
    );
    proxy.stop(GRACE).await;
}
