//! Reference-count semantics for exported objects, including teardown
//! under concurrent add-ref/release traffic.

use std::ffi::c_void;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use crossbind::{
    AddRefFn, ComClass, ComObject, GUID, QueryInterfaceFn, RawComPtr, ReleaseFn, TablePtr,
    com_interface, unknown_add_ref, unknown_query_interface, unknown_release,
};

com_interface! {
    /// Marker interface; the triad is all these tests need.
    interface ICounted : "4c0e9d2b-7a81-4f5e-9c3d-606162636465", size 3 {
    }
}

/// Sets a flag when the exported value is finally dropped.
struct Counted {
    dropped: Arc<AtomicBool>,
}

impl Drop for Counted {
    fn drop(&mut self) {
        self.dropped.store(true, Ordering::SeqCst);
    }
}

#[repr(C)]
struct CountedVtbl {
    query_interface: QueryInterfaceFn,
    add_ref: AddRefFn,
    release: ReleaseFn,
}

static COUNTED_VTBL: CountedVtbl = CountedVtbl {
    query_interface: unknown_query_interface,
    add_ref: unknown_add_ref,
    release: unknown_release,
};

impl ComClass for Counted {
    fn dispatch_table(iid: &GUID) -> Option<TablePtr> {
        if *iid == IID_ICOUNTED || *iid == crossbind::IID_IUNKNOWN {
            Some(TablePtr(
                &COUNTED_VTBL as *const CountedVtbl as *const c_void,
            ))
        } else {
            None
        }
    }
}

fn export_counted() -> (RawComPtr, Arc<AtomicBool>) {
    let dropped = Arc::new(AtomicBool::new(false));
    let object = ComObject::new(Counted {
        dropped: Arc::clone(&dropped),
    });
    let handle = object.handle(&IID_ICOUNTED).expect("ICounted is implemented");
    // The test drops its own Arc: from here the registry pin is the only
    // thing keeping the object alive.
    (handle, dropped)
}

#[test]
fn registry_pin_keeps_the_object_alive() {
    let (handle, dropped) = export_counted();
    assert!(!dropped.load(Ordering::SeqCst));

    unsafe { unknown_release(handle) };
    assert!(
        dropped.load(Ordering::SeqCst),
        "net count 0 reclaims the object"
    );
}

#[test]
fn object_survives_while_net_count_is_positive() {
    let (handle, dropped) = export_counted();

    unsafe {
        unknown_add_ref(handle);
        unknown_add_ref(handle);
        unknown_release(handle);
        unknown_release(handle);
    }
    assert!(!dropped.load(Ordering::SeqCst), "one reference remains");

    unsafe { unknown_release(handle) };
    assert!(dropped.load(Ordering::SeqCst));
}

#[test]
fn resurrection_races_teardown_without_publishing_dead_handles() {
    const THREADS: usize = 4;
    const ROUNDS: usize = 500;

    let dropped = Arc::new(AtomicBool::new(false));
    let object = ComObject::new(Counted {
        dropped: Arc::clone(&dropped),
    });

    // Every round drives the count through 0 and back: each handle() call
    // resurrects while some other thread's release may be mid-teardown.
    // A handle that came back unpublished would blow up the release call.
    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let object = Arc::clone(&object);
            thread::spawn(move || {
                for _ in 0..ROUNDS {
                    let handle = object
                        .handle(&IID_ICOUNTED)
                        .expect("ICounted is implemented");
                    unsafe { unknown_release(handle) };
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(object.ref_count(), 0);
    assert!(!dropped.load(Ordering::SeqCst), "the local Arc is still held");
}

#[test]
fn teardown_happens_exactly_once_across_threads() {
    const THREADS: usize = 8;
    const ROUNDS: usize = 1000;

    let (handle, dropped) = export_counted();
    let addr = handle as usize;

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            thread::spawn(move || {
                let ptr = addr as RawComPtr;
                for _ in 0..ROUNDS {
                    unsafe {
                        unknown_add_ref(ptr);
                        unknown_release(ptr);
                    }
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    // Balanced traffic from every thread: the original reference still
    // holds the object.
    assert!(!dropped.load(Ordering::SeqCst));

    unsafe { unknown_release(handle) };
    assert!(
        dropped.load(Ordering::SeqCst),
        "final state depends on the net count, not the interleaving"
    );
}
