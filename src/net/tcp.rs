//! A minimally functioning TCP stream and listener, adapted onto the
//! reactor's generic operation protocol.

use std::io::{Read, Write};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use mio::Interest;

use super::NetBridge;
use crate::cancel::CancelToken;
use crate::error::Error;
use crate::task::Task;

/// A non-blocking TCP connection driven by the net reactor.
pub struct TcpStream {
    bridge: Arc<NetBridge>,
    inner: Arc<Mutex<mio::net::TcpStream>>,
    closed: AtomicBool,
}

impl TcpStream {
    pub(crate) fn from_mio(bridge: Arc<NetBridge>, stream: mio::net::TcpStream) -> Self {
        Self {
            bridge,
            inner: Arc::new(Mutex::new(stream)),
            closed: AtomicBool::new(false),
        }
    }

    /// Connect to `addr`, completing once the connection is established (or
    /// fails).
    #[must_use]
    pub fn async_connect(bridge: Arc<NetBridge>, addr: SocketAddr, token: CancelToken) -> Task<Self> {
        let stream = match mio::net::TcpStream::connect(addr) {
            Ok(stream) => stream,
            Err(err) => {
                let err = Error::io(err);
                return Task::new(async move { Err(err) });
            }
        };

        let source = Arc::new(Mutex::new(stream));
        let connect_task = bridge.schedule(source.clone(), Interest::WRITABLE, token, |stream: &mut mio::net::TcpStream| {
            match stream.take_error()? {
                Some(err) => Err(err),
                None => stream.peer_addr().map(|_| ()),
            }
        });

        let bridge_for_wrap = bridge.clone();
        Task::new(async move {
            connect_task.await?;
            Ok(Self {
                bridge: bridge_for_wrap,
                inner: source,
                closed: AtomicBool::new(false),
            })
        })
    }

    /// Read into `buf`, returning the buffer back along with the number of
    /// bytes read (`0` signals EOF).
    #[must_use]
    pub fn async_read(&self, mut buf: Vec<u8>, token: CancelToken) -> Task<(Vec<u8>, usize)> {
        let source = self.inner.clone();
        self.bridge.schedule(source, Interest::READABLE, token, move |stream: &mut mio::net::TcpStream| {
            let n = stream.read(&mut buf)?;
            Ok((std::mem::take(&mut buf), n))
        })
    }

    /// Write `buf` in full or in part, returning the number of bytes written.
    #[must_use]
    pub fn async_write(&self, buf: Vec<u8>, token: CancelToken) -> Task<usize> {
        let source = self.inner.clone();
        self.bridge.schedule(source, Interest::WRITABLE, token, move |stream: &mut mio::net::TcpStream| stream.write(&buf))
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.inner.lock().unwrap().local_addr().map_err(Error::io)
    }

    pub fn peer_addr(&self) -> Result<SocketAddr, Error> {
        self.inner.lock().unwrap().peer_addr().map_err(Error::io)
    }

    /// Idempotent: shuts the socket down in both directions.
    pub fn close(&self) -> Result<(), Error> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match self.inner.lock().unwrap().shutdown(std::net::Shutdown::Both) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotConnected => Ok(()),
            Err(err) => Err(Error::io(err)),
        }
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::Acquire)
    }
}

/// A non-blocking TCP listener driven by the net reactor.
pub struct TcpListener {
    bridge: Arc<NetBridge>,
    inner: Arc<Mutex<mio::net::TcpListener>>,
}

impl TcpListener {
    pub fn bind(bridge: Arc<NetBridge>, addr: SocketAddr) -> Result<Self, Error> {
        let listener = mio::net::TcpListener::bind(addr).map_err(Error::io)?;
        Ok(Self {
            bridge,
            inner: Arc::new(Mutex::new(listener)),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, Error> {
        self.inner.lock().unwrap().local_addr().map_err(Error::io)
    }

    /// Accept the next inbound connection.
    #[must_use]
    pub fn async_accept(&self, token: CancelToken) -> Task<TcpStream> {
        let source = self.inner.clone();
        let accept_task = self
            .bridge
            .schedule(source, Interest::READABLE, token, |listener: &mut mio::net::TcpListener| {
                listener.accept().map(|(stream, _addr)| stream)
            });

        let bridge_for_wrap = self.bridge.clone();
        Task::new(async move {
            let stream = accept_task.await?;
            Ok(TcpStream::from_mio(bridge_for_wrap, stream))
        })
    }
}
