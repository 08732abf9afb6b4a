use futures::executor::block_on;
use futures::join;
use rill::memory;
use rill::stream::{ReadPort, WritePort, disabled_port, with_limit};

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i % 256) as u8).collect()
}

#[test]
fn round_trip_survives_arbitrary_chunk_boundaries() {
    let (front, back) = memory::pair();
    let message = pattern(10_000);

    block_on(async {
        let writer = async {
            // Uneven chunks, several larger than one packet.
            let mut offset = 0;
            let mut step = 1;
            while offset < message.len() {
                let end = (offset + step).min(message.len());
                assert!(front.write_fully(&message[offset..end]).await.unwrap());
                offset = end;
                step = step * 3 + 1;
            }
            front.close();
        };

        let reader = async {
            let mut received = Vec::new();
            let mut buf = [0u8; 256];
            loop {
                let n = back.read(&mut buf).await.unwrap();
                if n == 0 {
                    break;
                }
                received.extend_from_slice(&buf[..n]);
            }
            received
        };

        let ((), received) = join!(writer, reader);
        assert_eq!(received, message);
    });
}

#[test]
fn read_fully_reports_end_of_stream() {
    let (front, back) = memory::pair();

    block_on(async {
        assert!(front.write_fully(b"abc").await.unwrap());
        front.close();

        let mut buf = [0u8; 8];
        // Three buffered bytes, then the closed channel ends the stream.
        assert!(!back.read_fully(&mut buf).await.unwrap());
        assert_eq!(&buf[..3], b"abc");
    });
}

#[test]
fn write_after_close_fails() {
    let (front, _back) = memory::pair();
    front.close();

    let err = block_on(front.write(b"late")).unwrap_err();
    assert_eq!(err.kind(), std::io::ErrorKind::BrokenPipe);
}

#[test]
fn close_is_idempotent() {
    let (front, back) = memory::pair();
    front.close();
    front.close();
    back.close();
}

#[test]
fn limited_port_ends_after_its_budget() {
    let (front, back) = memory::pair();

    block_on(async {
        assert!(front.write_fully(&pattern(100)).await.unwrap());

        let limited = with_limit(&back, 64);
        let mut buf = [0u8; 100];

        assert!(!limited.read_fully(&mut buf).await.unwrap());
        assert_eq!(&buf[..64], &pattern(100)[..64]);

        // The wrapped port keeps going past the view's limit.
        let n = back.read(&mut buf).await.unwrap();
        assert!(n > 0);
    });
}

#[test]
fn limited_port_caps_writes() {
    let (front, back) = memory::pair();

    block_on(async {
        let limited = with_limit(&front, 10);
        assert!(!limited.write_fully(&pattern(32)).await.unwrap());

        front.close();

        let mut received = Vec::new();
        let mut buf = [0u8; 16];
        loop {
            let n = back.read(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, pattern(10));
    });
}

#[test]
fn disabled_port_refuses_transfers() {
    let port = disabled_port("disabled");

    let mut buf = [0u8; 4];
    assert!(block_on(port.read(&mut buf)).is_err());
    assert!(block_on(port.write(b"data")).is_err());
}
