use futures::executor::block_on;
use futures::join;
use rill::net::tcp;
use rill::reactor::Reactor;
use rill::stream::{ReadPort, WritePort};
use rill::{memory, time, tls};
use std::thread;
use std::time::Duration;

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

/// A self-signed certificate for `testserver`, PEM-encoded, plus its
/// PKCS#8 key. The client trusts the certificate directly.
fn test_identity() -> (String, String) {
    let signed = rcgen::generate_simple_self_signed(vec!["testserver".to_string()]).unwrap();
    (signed.cert.pem(), signed.key_pair.serialize_pem())
}

#[test]
fn client_receives_data_across_many_pump_rounds() {
    let (cert_pem, key_pem) = test_identity();

    // 10 000 bytes is several times the loopback buffer capacity, so the
    // ciphertext crosses the transport in multiple rounds.
    let message = pattern(10_000);
    let (front, back) = memory::pair();

    let server = {
        let message = message.clone();
        let cert_pem = cert_pem.clone();
        thread::spawn(move || {
            block_on(async {
                let stream = tls::wrap_server_pem(back, cert_pem.as_bytes(), key_pem.as_bytes())
                    .unwrap();
                assert!(stream.write_fully(&message).await.unwrap());
            })
        })
    };

    block_on(async {
        let stream = tls::wrap_client_pem(front, "testserver", cert_pem.as_bytes()).unwrap();

        let mut received = vec![0u8; message.len()];
        assert!(stream.read_fully(&mut received).await.unwrap());
        assert_eq!(received, message);
    });

    server.join().unwrap();
}

#[test]
fn simultaneous_first_read_and_write_handshake_once() {
    let (cert_pem, key_pem) = test_identity();

    let to_client = pattern(6_000);
    let to_server = pattern(9_000);
    let (front, back) = memory::pair();

    let server = {
        let to_client = to_client.clone();
        let to_server = to_server.clone();
        let cert_pem = cert_pem.clone();
        thread::spawn(move || {
            block_on(async {
                let stream = tls::wrap_server_pem(back, cert_pem.as_bytes(), key_pem.as_bytes())
                    .unwrap();

                let mut received = vec![0u8; to_server.len()];
                // Issue the first read and the first write together; the
                // handshake must complete exactly once without deadlock.
                let (sent, got) = join!(stream.write_fully(&to_client), async {
                    stream.read_fully(&mut received).await
                });
                assert!(sent.unwrap());
                assert!(got.unwrap());
                assert_eq!(received, to_server);
            })
        })
    };

    let outcome = block_on(time::timeout(Duration::from_secs(30), async {
        let stream = tls::wrap_client_pem(front, "testserver", cert_pem.as_bytes()).unwrap();

        let mut received = vec![0u8; to_client.len()];
        let (sent, got) = join!(stream.write_fully(&to_server), async {
            stream.read_fully(&mut received).await
        });
        assert!(sent.unwrap());
        assert!(got.unwrap());
        assert_eq!(received, to_client);
    }));
    outcome.expect("tls session deadlocked");

    server.join().unwrap();
}

#[test]
fn tls_round_trip_over_tcp() {
    let (cert_pem, key_pem) = test_identity();

    let reactor = Reactor::new("tls-tcp-test").unwrap();
    let handle = reactor.handle();

    let listener = tcp::listen_with(&handle, "127.0.0.1:0".parse().unwrap()).unwrap();
    let addr = listener.local_addr();

    let message = pattern(20_000);

    let client = {
        let handle = handle.clone();
        let message = message.clone();
        let cert_pem = cert_pem.clone();
        thread::spawn(move || {
            block_on(async {
                let conn = tcp::connect_with(&handle, addr).await.unwrap();
                let stream =
                    tls::wrap_client_pem(&conn, "testserver", cert_pem.as_bytes()).unwrap();

                assert!(stream.write_fully(&message).await.unwrap());

                let mut echoed = vec![0u8; message.len()];
                assert!(stream.read_fully(&mut echoed).await.unwrap());
                assert_eq!(echoed, message);

                stream.close();
                conn.close();
            })
        })
    };

    block_on(async {
        let conn = listener.accept().await.unwrap();
        let stream =
            tls::wrap_server_pem(&conn, cert_pem.as_bytes(), key_pem.as_bytes()).unwrap();

        let mut received = vec![0u8; message.len()];
        assert!(stream.read_fully(&mut received).await.unwrap());
        assert!(stream.write_fully(&received).await.unwrap());
    });

    client.join().unwrap();
    reactor.close();
}

#[test]
fn client_rejects_an_untrusted_server() {
    let (server_cert, server_key) = test_identity();
    // A different self-signed identity the client trusts instead.
    let (trusted_cert, _) = test_identity();

    let (front, back) = memory::pair();

    let server = thread::spawn(move || {
        block_on(async {
            let stream =
                tls::wrap_server_pem(back, server_cert.as_bytes(), server_key.as_bytes()).unwrap();
            // The handshake fails; either the write or the transport ends.
            let _ = stream.write_fully(b"never delivered").await;
        })
    });

    let failure = block_on(async {
        let stream = tls::wrap_client_pem(front, "testserver", trusted_cert.as_bytes()).unwrap();

        let mut buf = [0u8; 16];
        let result = stream.read(&mut buf).await;
        stream.transport().close();
        result
    });

    assert!(failure.is_err());
    server.join().unwrap();
}
