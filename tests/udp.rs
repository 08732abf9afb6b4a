use futures::executor::block_on;
use futures::join;
use rill::net::udp;
use rill::reactor::Reactor;
use std::net::SocketAddr;
use std::thread;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

fn local(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

#[test]
fn connected_peer_exchanges_datagrams_with_open_socket() {
    let reactor = Reactor::new("udp-test").unwrap();
    let handle = reactor.handle();

    let server = udp::open_with(&handle, Some(local(0))).unwrap();
    let server_addr = server.local_addr().unwrap();

    let message = pattern(1024);

    let client = {
        let handle = handle.clone();
        let message = message.clone();
        thread::spawn(move || {
            block_on(async {
                let conn = udp::connect_with(&handle, server_addr, None).unwrap();
                assert_eq!(conn.remote_addr(), server_addr);

                assert_eq!(conn.write(&message).await.unwrap(), message.len());

                let mut buf = [0u8; 2048];
                let n = conn.read(&mut buf).await.unwrap();
                assert_eq!(&buf[..n], &message[..]);

                conn.close();
            })
        })
    };

    block_on(async {
        let mut buf = [0u8; 2048];
        let (n, peer) = server.receive(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], &message[..]);

        // Echo back to whoever sent it.
        server.send(&buf[..n], peer).await.unwrap();
    });

    client.join().unwrap();
    server.close();
    reactor.close();
}

#[test]
fn concurrent_sends_to_distinct_destinations_are_exact() {
    let reactor = Reactor::new("udp-fanout-test").unwrap();
    let handle = reactor.handle();

    let sender = udp::open_with(&handle, None).unwrap();
    let first = udp::open_with(&handle, Some(local(0))).unwrap();
    let second = udp::open_with(&handle, Some(local(0))).unwrap();

    let small = pattern(512);
    let large = pattern(4096);

    block_on(async {
        let (a, b, got_first, got_second) = join!(
            sender.send(&small, first.local_addr().unwrap()),
            sender.send(&large, second.local_addr().unwrap()),
            async {
                let mut buf = [0u8; 8192];
                first.receive(&mut buf).await.map(|(n, _)| buf[..n].to_vec())
            },
            async {
                let mut buf = [0u8; 8192];
                second.receive(&mut buf).await.map(|(n, _)| buf[..n].to_vec())
            },
        );

        // Each send either moved the whole datagram or failed.
        a.unwrap();
        b.unwrap();
        assert_eq!(got_first.unwrap(), small);
        assert_eq!(got_second.unwrap(), large);
    });

    reactor.close();
}

#[test]
fn receive_requires_buffer_space() {
    let reactor = Reactor::new("udp-args-test").unwrap();
    let handle = reactor.handle();

    let socket = udp::open_with(&handle, Some(local(0))).unwrap();

    let err = block_on(socket.receive(&mut [])).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::InvalidInput);

    reactor.close();
}

#[test]
fn closing_releases_a_suspended_receive() {
    let reactor = Reactor::new("udp-close-test").unwrap();
    let handle = reactor.handle();

    let socket = udp::open_with(&handle, Some(local(0))).unwrap();

    thread::scope(|scope| {
        let receiver = scope.spawn(|| {
            block_on(async {
                let mut buf = [0u8; 64];
                socket.receive(&mut buf).await
            })
        });

        thread::sleep(std::time::Duration::from_millis(100));
        socket.close();

        assert!(receiver.join().unwrap().is_err());
    });

    reactor.close();
}
