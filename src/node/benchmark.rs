use parking_lot::{Condvar, Mutex};

/// A release-once gate: the miner waits on it when benchmark mode is
/// enabled, and `benchmark_initialize` releases it exactly once (§4.7,
/// §8 boundary behaviors). Equivalent to the single-permit semaphore of
/// the original design.
#[derive(Default)]
pub struct BenchmarkLatch {
    state: Mutex<bool>,
    condvar: Condvar,
}

impl BenchmarkLatch {
    pub fn new() -> Self {
        BenchmarkLatch::default()
    }

    /// Blocks the calling thread until released.
    pub fn wait(&self) {
        let mut released = self.state.lock();
        while !*released {
            self.condvar.wait(&mut released);
        }
    }

    /// Releases the latch. Returns `true` the first time it is called,
    /// `false` on every call thereafter.
    pub fn release_once(&self) -> bool {
        let mut released = self.state.lock();
        if *released {
            return false;
        }
        *released = true;
        self.condvar.notify_all();
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn releases_exactly_once() {
        let latch = BenchmarkLatch::new();
        assert!(latch.release_once());
        assert!(!latch.release_once());
    }

    #[test]
    fn wait_unblocks_after_release() {
        let latch = Arc::new(BenchmarkLatch::new());
        let waiter = {
            let latch = latch.clone();
            std::thread::spawn(move || latch.wait())
        };
        latch.release_once();
        waiter.join().unwrap();
    }
}
