use kernel_sync::SpinLock;
use std::panic;

#[test]
fn guard_releases_on_drop() {
    let l = SpinLock::new(0_u32);
    {
        let mut g = l.lock();
        *g = 41;
        assert!(l.is_locked());
    }
    assert!(!l.is_locked());
    *l.lock() += 1;
    assert_eq!(*l.lock(), 42);
}

#[test]
fn try_lock_fails_while_held() {
    let l = SpinLock::new(1u8);

    let g1 = l.try_lock();
    assert!(g1.is_some());
    assert!(l.try_lock().is_none());

    drop(g1);
    assert!(l.try_lock().is_some());
}

#[test]
fn with_lock_returns_closure_result() {
    let l = SpinLock::new(Vec::<u32>::new());
    let len = l.with_lock(|frames| {
        frames.push(0x100);
        frames.push(0x101);
        frames.len()
    });
    assert_eq!(len, 2);
    assert!(!l.is_locked());
    assert_eq!(l.into_inner(), vec![0x100, 0x101]);
}

#[test]
fn get_mut_needs_no_lock() {
    let mut l = SpinLock::new(Some(7u32));
    l.get_mut().take();
    assert_eq!(*l.lock(), None);
}

#[test]
fn contended_increments_are_exact_and_exclusive() {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};
    use std::thread;

    let threads = 8;
    let iters = 5_000;

    let lock = Arc::new(SpinLock::new(0usize));
    let in_cs = Arc::new(AtomicUsize::new(0));
    let start = Arc::new(Barrier::new(threads));

    let handles: Vec<_> = (0..threads)
        .map(|_| {
            let lock = Arc::clone(&lock);
            let in_cs = Arc::clone(&in_cs);
            let start = Arc::clone(&start);
            thread::spawn(move || {
                start.wait();
                for _ in 0..iters {
                    lock.with_lock(|v| {
                        let prev = in_cs.fetch_add(1, Ordering::SeqCst);
                        assert_eq!(prev, 0, "mutual exclusion violated");
                        *v += 1;
                        in_cs.fetch_sub(1, Ordering::SeqCst);
                    });
                    thread::yield_now();
                }
            })
        })
        .collect();

    for h in handles {
        h.join().unwrap();
    }

    assert_eq!(lock.with_lock(|v| *v), threads * iters);
}

#[test]
fn lock_is_released_on_panic() {
    let l = SpinLock::new(0u32);

    let res = panic::catch_unwind(panic::AssertUnwindSafe(|| {
        l.with_lock(|v| {
            *v = 123;
            panic!("boom");
        });
    }));
    assert!(res.is_err());
    assert_eq!(l.with_lock(|v| *v), 123);
}

#[test]
fn debug_shows_lock_state() {
    let l = SpinLock::new(());
    assert_eq!(format!("{l:?}"), "SpinLock { locked: false, .. }");
    let _g = l.lock();
    assert_eq!(format!("{l:?}"), "SpinLock { locked: true, .. }");
}
