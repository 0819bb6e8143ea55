//! A minimally functioning UDP socket adapted onto the reactor's generic
//! operation protocol.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::Interest;

use super::NetBridge;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::task::Task;

/// A non-blocking UDP socket driven by the net reactor.
pub struct UdpSocket {
    bridge: Arc<NetBridge>,
    inner: Arc<Mutex<mio::net::UdpSocket>>,
    closed: AtomicBool,
}

impl UdpSocket {
    pub fn bind(bridge: Arc<NetBridge>, addr: SocketAddr) -> Result<Self, Error> {
        let socket = mio::net::UdpSocket::bind(addr).map_err(Error::io)?;
        Ok(Self {
            bridge,
            inner: Arc::new(Mutex::new(socket)),
            closed: AtomicBool::new(false),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.inner.lock().unwrap().local_addr().map_err(Error::io)
    }

    /// Send `buf` to `target`, returning the number of bytes sent.
    #[must_use]
    pub fn async_send_to(&self, buf: Vec<u8>, target: SocketAddr, token: CancelToken) -> Task<usize> {
        let source = self.inner.clone();
        self.bridge
            .schedule(source, Interest::WRITABLE, token, move |socket: &mut mio::net::UdpSocket| socket.send_to(&buf, target))
    }

    /// Receive into `buf`, returning the buffer, the number of bytes read,
    /// and the sender's address.
    #[must_use]
    pub fn async_recv_from(&self, mut buf: Vec<u8>, token: CancelToken) -> Task<(Vec<u8>, usize, SocketAddr)> {
        let source = self.inner.clone();
        self.bridge.schedule(source, Interest::READABLE, token, move |socket: &mut mio::net::UdpSocket| {
            let (n, addr) = socket.recv_from(&mut buf)?;
            Ok((std::mem::take(&mut buf), n, addr))
        })
    }

    /// Idempotent; UDP sockets have no connection to tear down, so this just
    /// marks the handle closed for [`UdpSocket::is_open`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}
