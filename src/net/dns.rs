//! Blocking DNS resolution, offloaded onto the CPU thread pool rather than
//! taught to the reactor as a protocol of its own.

use std::net::SocketAddr;
use std::sync::Arc;

use crate::cancel::CancelToken;
use crate::error::Error;
use crate::pool::ThreadPool;
use crate::task::Task;

/// Resolves `host:port` pairs by calling the platform resolver on a pool
/// worker and wrapping the result in the same task protocol as every other
/// collaborator in this crate.
pub struct DnsResolver {
    pool: Arc<ThreadPool>,
}

impl DnsResolver {
    #[must_use]
    pub fn new(pool: Arc<ThreadPool>) -> Self {
        Self { pool }
    }

    /// Resolve `host` and `port` to every address the platform resolver
    /// returns.
    #[must_use]
    pub fn async_resolve(&self, host: String, port: u16, token: CancelToken) -> Task<Vec<SocketAddr>> {
        self.pool.submit_task(
            move || {
                use std::net::ToSocketAddrs;
                (host.as_str(), port).to_socket_addrs().map(Iterator::collect).map_err(Error::io)
            },
            token,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Runtime;

    #[test]
    fn resolves_localhost() {
        let rt = Runtime::new();
        let resolver = DnsResolver::new(rt.cpu_pool());
        let observed = Arc::new(std::sync::Mutex::new(None));
        let observed_clone = observed.clone();
        let rt_clone = rt.clone();

        let driver: Task<()> = Task::new(async move {
            let addrs = resolver
                .async_resolve("localhost".to_string(), 0, CancelToken::empty())
                .await
                .unwrap();
            *observed_clone.lock().unwrap() = Some(addrs);
            rt_clone.stop();
            Ok(())
        });
        driver.start(&rt);
        rt.run();

        let observed = observed.lock().unwrap();
        assert!(!observed.as_ref().unwrap().is_empty());
    }
}
