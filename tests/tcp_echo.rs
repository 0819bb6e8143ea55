//! S6 — TCP echo smoke: a listener bound to an ephemeral port accepts a
//! connection; reading N bytes and writing the same N bytes back produces a
//! byte-identical echo; closing the client ends the read loop with `n == 0`
//! and no failure.

use std::net::SocketAddr;
use std::sync::{Arc, Mutex};

use taskloop::net::{TcpListener, TcpStream};
use taskloop::{CancelToken, Runtime, Task};

#[test]
fn tcp_echo_round_trip_on_ephemeral_port() {
    let _ = tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).try_init();

    let rt = Runtime::new();
    let net = rt.net();

    let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
    let listener = TcpListener::bind(net.clone(), addr).expect("bind ephemeral port");
    let bound_addr = listener.local_addr().expect("local_addr");

    let echoed = Arc::new(Mutex::new(None));
    let echoed_clone = echoed.clone();
    let eof_seen = Arc::new(Mutex::new(false));
    let eof_seen_clone = eof_seen.clone();
    let rt_for_server = rt.clone();

    let server: Task<()> = Task::new(async move {
        let stream = listener.async_accept(CancelToken::empty()).await?;

        let (buf, n) = stream.async_read(vec![0u8; 64], CancelToken::empty()).await?;
        let mut echoed_payload = buf;
        echoed_payload.truncate(n);

        let mut written = 0;
        while written < echoed_payload.len() {
            let chunk = echoed_payload[written..].to_vec();
            written += stream.async_write(chunk, CancelToken::empty()).await?;
        }
        *echoed_clone.lock().unwrap() = Some(echoed_payload);

        let (_, n) = stream.async_read(vec![0u8; 64], CancelToken::empty()).await?;
        *eof_seen_clone.lock().unwrap() = n == 0;

        rt_for_server.stop();
        Ok(())
    });
    server.start(&rt);

    let net_for_client = net.clone();
    let client: Task<()> = Task::new(async move {
        let stream = TcpStream::async_connect(net_for_client, bound_addr, CancelToken::empty()).await?;
        let payload = b"hello taskloop".to_vec();

        let mut written = 0;
        while written < payload.len() {
            let chunk = payload[written..].to_vec();
            written += stream.async_write(chunk, CancelToken::empty()).await?;
        }

        let mut received = Vec::new();
        while received.len() < payload.len() {
            let (buf, n) = stream.async_read(vec![0u8; 64], CancelToken::empty()).await?;
            assert_ne!(n, 0, "server closed before echoing the full payload");
            received.extend_from_slice(&buf[..n]);
        }
        assert_eq!(received, payload);

        stream.close()?;
        Ok(())
    });
    client.start(&rt);

    rt.run();

    assert_eq!(echoed.lock().unwrap().as_deref(), Some(b"hello taskloop".as_slice()));
    assert!(*eof_seen.lock().unwrap(), "server did not observe EOF after client closed");
}
