use futures::executor::block_on;
use futures::join;
use rill::net::tcp;
use rill::reactor::Reactor;
use rill::stream::{ReadPort, WritePort};
use rill::time;
use std::net::SocketAddr;
use std::thread;
use std::time::Duration;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn any_local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

#[test]
fn client_data_reaches_server_across_chunk_boundaries() {
    let reactor = Reactor::new("tcp-test").unwrap();
    let handle = reactor.handle();

    let listener = tcp::listen_with(&handle, any_local()).unwrap();
    let addr = listener.local_addr();

    let message = pattern(1_000_000);

    let client = {
        let handle = handle.clone();
        let message = message.clone();
        thread::spawn(move || {
            block_on(async {
                let conn = tcp::connect_with(&handle, addr).await.unwrap();
                // 20 uneven slices, each written fully.
                for chunk in message.chunks(message.len() / 20 + 7) {
                    assert!(conn.write_fully(chunk).await.unwrap());
                }
                conn.close();
            })
        })
    };

    block_on(async {
        let conn = listener.accept().await.unwrap();
        let mut received = vec![0u8; message.len()];
        // Drain in 5 large slices, exercising many partial reads each.
        for chunk in received.chunks_mut(message.len() / 5) {
            assert!(conn.read_fully(chunk).await.unwrap());
        }
        assert_eq!(received, message);
    });

    client.join().unwrap();
    reactor.close();
}

#[test]
fn both_directions_carry_traffic_concurrently() {
    let reactor = Reactor::new("tcp-duplex-test").unwrap();
    let handle = reactor.handle();

    let listener = tcp::listen_with(&handle, any_local()).unwrap();
    let addr = listener.local_addr();

    let upstream = pattern(300_000);
    let downstream = pattern(200_000);

    let client = {
        let handle = handle.clone();
        let upstream = upstream.clone();
        let downstream = downstream.clone();
        thread::spawn(move || {
            block_on(async {
                let conn = tcp::connect_with(&handle, addr).await.unwrap();

                let mut received = vec![0u8; downstream.len()];
                let (sent, got) = join!(conn.write_fully(&upstream), async {
                    conn.read_fully(&mut received).await
                });
                assert!(sent.unwrap());
                assert!(got.unwrap());
                assert_eq!(received, downstream);
            })
        })
    };

    block_on(async {
        let conn = listener.accept().await.unwrap();

        let mut received = vec![0u8; upstream.len()];
        let (got, sent) = join!(
            async { conn.read_fully(&mut received).await },
            conn.write_fully(&downstream)
        );
        assert!(got.unwrap());
        assert!(sent.unwrap());
        assert_eq!(received, upstream);
    });

    client.join().unwrap();
    reactor.close();
}

#[test]
fn second_concurrent_read_fails_and_leaves_the_first_intact() {
    let reactor = Reactor::new("tcp-contract-test").unwrap();
    let handle = reactor.handle();

    let listener = tcp::listen_with(&handle, any_local()).unwrap();
    let addr = listener.local_addr();

    let client = {
        let handle = handle.clone();
        thread::spawn(move || {
            block_on(async {
                let conn = tcp::connect_with(&handle, addr).await.unwrap();
                // Give the server's first read time to suspend, then feed it.
                time::sleep(Duration::from_millis(300)).await;
                assert!(conn.write_fully(b"hello").await.unwrap());
                // Hold the connection open until the server is done.
                let mut buf = [0u8; 4];
                assert_eq!(conn.read(&mut buf).await.unwrap(), 4);
            })
        })
    };

    let conn = block_on(listener.accept()).unwrap();

    thread::scope(|scope| {
        let first = scope.spawn(|| {
            block_on(async {
                let mut buf = [0u8; 5];
                assert!(conn.read_fully(&mut buf).await.unwrap());
                assert_eq!(&buf, b"hello");
            })
        });

        // Let the first read suspend before violating the contract.
        thread::sleep(Duration::from_millis(100));

        let err = block_on(async {
            let mut buf = [0u8; 5];
            conn.read(&mut buf).await.unwrap_err()
        });
        assert!(err.to_string().contains("single suspended read"));

        first.join().unwrap();
    });

    block_on(conn.write_fully(b"done")).unwrap();

    client.join().unwrap();
    reactor.close();
}

#[test]
fn closing_a_connection_releases_a_suspended_read() {
    let reactor = Reactor::new("tcp-close-test").unwrap();
    let handle = reactor.handle();

    let listener = tcp::listen_with(&handle, any_local()).unwrap();
    let addr = listener.local_addr();

    let client = {
        let handle = handle.clone();
        thread::spawn(move || {
            block_on(async {
                let conn = tcp::connect_with(&handle, addr).await.unwrap();

                let suspended = async {
                    let mut buf = [0u8; 16];
                    conn.read(&mut buf).await
                };
                let closer = async {
                    time::sleep(Duration::from_millis(200)).await;
                    conn.close();
                };

                // The read must resolve promptly once the endpoint closes.
                let (read, _) = time::timeout(Duration::from_secs(5), async {
                    join!(suspended, closer)
                })
                .await
                .expect("suspended read hung after close");
                assert!(read.is_err());
            })
        })
    };

    let _server_conn = block_on(listener.accept()).unwrap();
    client.join().unwrap();
    reactor.close();
}

#[test]
fn closing_the_listener_releases_the_address() {
    let reactor = Reactor::new("tcp-rebind-test").unwrap();
    let handle = reactor.handle();

    let listener = tcp::listen_with(&handle, any_local()).unwrap();
    let addr = listener.local_addr();

    listener.close();
    assert!(block_on(listener.accept()).is_err());

    // The exact address is free again immediately.
    let rebound = tcp::listen_with(&handle, addr).unwrap();
    assert_eq!(rebound.local_addr(), addr);

    rebound.close();
    reactor.close();
}

#[test]
fn connect_to_a_dead_port_fails() {
    let reactor = Reactor::new("tcp-refused-test").unwrap();
    let handle = reactor.handle();

    // Bind and immediately close to find a port nobody listens on.
    let probe = tcp::listen_with(&handle, any_local()).unwrap();
    let addr = probe.local_addr();
    probe.close();

    let result = block_on(tcp::connect_with(&handle, addr));
    assert!(result.is_err());

    reactor.close();
}
