//! A shared/exclusive mutex with writer priority, and a scoped shared-lock
//! guard (C13).
//!
//! Ported from `src/common/shared_mutex.h`'s
//! `shared_mutex`/`shared_lock`: one internal mutex plus two condition
//! variables, `exclusive_waiting` counted so a waiting writer blocks new
//! shared acquirers — `lock_shared` waits while `exclusive_ ||
//! exclusive_waiting_ > 0` rather than just `exclusive_`, which is what
//! gives writers priority over a steady stream of readers.

use parking_lot::{Condvar, Mutex};

struct State {
    shared_count: u32,
    exclusive_waiting: u32,
    exclusive: bool,
}

/// Writer-priority shared/exclusive lock guarding no data of its own —
/// pair it with the data it protects the way `std::sync::RwLock` does,
/// or use it as a bare coordination primitive.
pub struct SharedExclusiveMutex {
    state: Mutex<State>,
    shared_cond: Condvar,
    exclusive_cond: Condvar,
}

impl Default for SharedExclusiveMutex {
    fn default() -> Self {
        Self::new()
    }
}

impl SharedExclusiveMutex {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State { shared_count: 0, exclusive_waiting: 0, exclusive: false }),
            shared_cond: Condvar::new(),
            exclusive_cond: Condvar::new(),
        }
    }

    /// Blocks until exclusive access is granted.
    pub fn lock(&self) {
        let mut state = self.state.lock();
        if state.shared_count == 0 && !state.exclusive {
            state.exclusive = true;
            return;
        }
        state.exclusive_waiting += 1;
        while state.shared_count > 0 || state.exclusive {
            self.exclusive_cond.wait(&mut state);
        }
        state.exclusive_waiting -= 1;
        state.exclusive = true;
    }

    pub fn unlock(&self) {
        let mut state = self.state.lock();
        state.exclusive = false;
        if state.exclusive_waiting > 0 {
            self.exclusive_cond.notify_one();
        } else {
            self.shared_cond.notify_all();
        }
    }

    /// Blocks until shared access is granted. New shared acquirers wait
    /// behind any already-waiting exclusive acquirer.
    pub fn lock_shared(&self) {
        let mut state = self.state.lock();
        while state.exclusive || state.exclusive_waiting > 0 {
            self.shared_cond.wait(&mut state);
        }
        state.shared_count += 1;
    }

    pub fn unlock_shared(&self) {
        let mut state = self.state.lock();
        state.shared_count -= 1;
        if state.shared_count == 0 && state.exclusive_waiting > 0 {
            self.exclusive_cond.notify_one();
        }
    }
}

/// Scoped shared-lock guard. Acquires on construction; [`SharedLock::unlock`]
/// may release early, and is idempotent (a second call, or drop after an
/// explicit unlock, is a no-op) — mirrors `shared_lock::unlock`'s
/// `locked_` guard flag.
pub struct SharedLock<'a> {
    mutex: &'a SharedExclusiveMutex,
    locked: bool,
}

impl<'a> SharedLock<'a> {
    pub fn new(mutex: &'a SharedExclusiveMutex) -> Self {
        mutex.lock_shared();
        Self { mutex, locked: true }
    }

    pub fn unlock(&mut self) {
        if !self.locked {
            return;
        }
        self.mutex.unlock_shared();
        self.locked = false;
    }
}

impl Drop for SharedLock<'_> {
    fn drop(&mut self) {
        self.unlock();
    }
}
