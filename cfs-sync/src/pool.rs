//! Per-`(ip, port)` bounded LIFO connection pool (C12).
//!
//! Modeled on `mfscommon/connection_pool.h`/`.cc`:
//! one mutex guarding a `HashMap<(ip, port), Vec<Connection>>`, `put`
//! pushing onto the back (the original's `std::list::push_back`, taken
//! from the front on `get` — i.e. LIFO: most recently returned connection
//! goes out first), `get` popping until it finds an unexpired entry or the
//! list runs dry.
//!
//! The original closes an expired socket itself, but only after dropping
//! the lock (`lock.unlock(); tcpclose(...)`). This crate doesn't implement
//! sockets at all, so [`ConnectionPool::get`]
//! takes an `on_close` callback invoked for each expired descriptor it
//! discards, always after releasing the internal mutex — the caller still
//! owns the socket lifecycle, it just gets told which descriptors to close.

use log::debug;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Instant;

pub type IpAddress = u32;
pub type Port = u16;

struct Connection {
    fd: i32,
    valid_until: Instant,
}

/// Thread-safe `(ip, port) -> LIFO<(fd, valid_until)>` pool.
#[derive(Default)]
pub struct ConnectionPool {
    connections: Mutex<HashMap<(IpAddress, Port), Vec<Connection>>>,
}

impl ConnectionPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `fd` as available for reuse against `(ip, port)` until
    /// `valid_until`.
    pub fn put(&self, fd: i32, ip: IpAddress, port: Port, valid_until: Instant) {
        let mut guard = self.connections.lock();
        guard.entry((ip, port)).or_default().push(Connection { fd, valid_until });
    }

    /// Pops the most recently returned connection to `(ip, port)`. Expired
    /// entries are discarded and `on_close` is called with their
    /// descriptor, with the pool's mutex already released, until a valid
    /// entry is found or the list is exhausted (`None`).
    pub fn get(&self, ip: IpAddress, port: Port, now: Instant, mut on_close: impl FnMut(i32)) -> Option<i32> {
        loop {
            let popped = {
                let mut guard = self.connections.lock();
                match guard.get_mut(&(ip, port)) {
                    Some(list) => list.pop(),
                    None => return None,
                }
            };
            let conn = popped?;
            if conn.valid_until > now {
                return Some(conn.fd);
            }
            debug!("connection pool: discarding expired connection to {ip}:{port}");
            on_close(conn.fd);
        }
    }
}
