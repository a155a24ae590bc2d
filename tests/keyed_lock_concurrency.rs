// ==============================================
// KEYED LOCK CONCURRENCY TESTS (integration)
// ==============================================
//
// Multi-threaded behavior of KeyedLock: mutual exclusion per key, shared
// readers, independence of distinct keys and bounded lock state.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use entitycache::sync::{KeyedLock, KeyedLockConfig, LockMode};

// ==============================================
// Exclusion
// ==============================================

mod exclusion {
    use super::*;

    #[cfg_attr(miri, ignore)]
    #[test]
    fn writers_on_one_key_never_overlap() {
        let locks = Arc::new(KeyedLock::new());
        let inside = Arc::new(AtomicUsize::new(0));
        let overlap = Arc::new(AtomicBool::new(false));
        let threads = 8;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|_| {
                let locks = locks.clone();
                let inside = inside.clone();
                let overlap = overlap.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for _ in 0..200 {
                        let _guard = locks.lock("hot");
                        if inside.fetch_add(1, Ordering::SeqCst) != 0 {
                            overlap.store(true, Ordering::SeqCst);
                        }
                        thread::yield_now();
                        inside.fetch_sub(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
        assert!(!overlap.load(Ordering::SeqCst), "two writers held one key");
        assert!(locks.is_empty());
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn readers_share_and_exclude_writer() {
        let locks = Arc::new(KeyedLock::new());
        let readers = 4;
        let barrier = Arc::new(Barrier::new(readers + 1));
        let release = Arc::new(Barrier::new(readers + 1));

        let handles: Vec<_> = (0..readers)
            .map(|_| {
                let locks = locks.clone();
                let barrier = barrier.clone();
                let release = release.clone();
                thread::spawn(move || {
                    let guard = locks.rlock("k");
                    barrier.wait();
                    release.wait();
                    drop(guard);
                })
            })
            .collect();

        // Every reader holds the key at once.
        barrier.wait();
        assert_eq!(locks.mode("k"), Some(LockMode::Read));
        assert!(locks.try_lock("k").is_none());
        assert!(locks.try_rlock("k").is_some());

        release.wait();
        for handle in handles {
            handle.join().unwrap();
        }
        assert!(locks.try_lock("k").is_some());
    }
}

// ==============================================
// Key Independence
// ==============================================

mod independence {
    use super::*;

    #[cfg_attr(miri, ignore)]
    #[test]
    fn held_key_does_not_block_other_keys_during_churn() {
        let locks = Arc::new(KeyedLock::with_config(KeyedLockConfig {
            pool_limit: 8,
            low_water: 0.5,
            min_capacity: 4,
        })
        .unwrap());
        let held = locks.lock("slow");

        // Churn thousands of keys so the map grows and shrinks underneath.
        let churn = {
            let locks = locks.clone();
            thread::spawn(move || {
                for i in 0..5_000 {
                    let _guard = locks.lock(&format!("churn-{i}"));
                }
            })
        };

        let start = Instant::now();
        let handles: Vec<_> = (0..4)
            .map(|t| {
                let locks = locks.clone();
                thread::spawn(move || {
                    for i in 0..500 {
                        let _guard = locks.lock(&format!("t{t}-{i}"));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        churn.join().unwrap();

        assert!(start.elapsed() < Duration::from_secs(10));
        assert_eq!(locks.mode("slow"), Some(LockMode::Write));
        drop(held);
        assert!(locks.is_empty());
    }

    #[cfg_attr(miri, ignore)]
    #[test]
    fn waiter_proceeds_after_release() {
        let locks = Arc::new(KeyedLock::new());
        let guard = locks.lock("k");
        let acquired = Arc::new(AtomicBool::new(false));

        let waiter = {
            let locks = locks.clone();
            let acquired = acquired.clone();
            thread::spawn(move || {
                let _guard = locks.lock("k");
                acquired.store(true, Ordering::SeqCst);
            })
        };

        thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));
        guard.unlock();
        waiter.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
        assert!(locks.is_empty());
    }
}

// ==============================================
// Bounded State
// ==============================================

mod bounded_state {
    use super::*;

    #[cfg_attr(miri, ignore)]
    #[test]
    fn parallel_cycles_leave_no_residue() {
        let config = KeyedLockConfig::default();
        let locks = Arc::new(KeyedLock::with_config(config).unwrap());
        let threads = 4;
        let barrier = Arc::new(Barrier::new(threads));

        let handles: Vec<_> = (0..threads)
            .map(|t| {
                let locks = locks.clone();
                let barrier = barrier.clone();
                thread::spawn(move || {
                    barrier.wait();
                    for i in 0..10_000 {
                        let key = format!("{t}:{}", i % 64);
                        if i % 3 == 0 {
                            let _guard = locks.rlock(&key);
                        } else {
                            let _guard = locks.lock(&key);
                        }
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert!(locks.is_empty());
        assert!(locks.pooled() <= config.pool_limit);
        assert!(locks.map_capacity() < 4 * 64 * 4 + config.min_capacity * 4);
    }
}
