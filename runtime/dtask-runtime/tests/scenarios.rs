//!
//! End-to-end seed scenarios (A-F). Each test shares one pointer into a
//! stack value across several spawned closures: the value outlives every
//! task because `wait_for_all`/`wait_for` block before the test function's
//! frame unwinds, but nothing short of that wait makes the sharing sound,
//! so every closure reconstructs its pointer from a `usize` captured by
//! value rather than borrowing across the spawn boundary.
//!

use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dtask_runtime::{Arg, Observer, Runtime};

fn addr_of<T>(v: &T) -> usize {
    v as *const T as usize
}

#[test]
fn scenario_a_linear_chain_serializes_ten_increments() {
    let runtime = Runtime::builder().threads(4).build().unwrap();
    let x = AtomicI64::new(0);
    let addr = addr_of(&x);
    for _ in 0..10 {
        runtime.spawn(
            move || unsafe {
                let cell = &*(addr as *const AtomicI64);
                cell.fetch_add(1, Ordering::SeqCst);
            },
            vec![Arg::write_ptr(addr, std::mem::size_of::<AtomicI64>())],
        );
    }
    runtime.wait_for_all().unwrap();
    assert_eq!(x.load(Ordering::SeqCst), 10);
}

#[test]
fn scenario_b_independent_slots_run_concurrently() {
    const N: usize = 64;
    let runtime = Runtime::builder().threads(8).build().unwrap();
    let slots: Vec<AtomicI64> = (0..N).map(|_| AtomicI64::new(0)).collect();
    for slot in &slots {
        let addr = addr_of(slot);
        runtime.spawn(
            move || unsafe {
                let cell = &*(addr as *const AtomicI64);
                cell.fetch_add(1, Ordering::SeqCst);
            },
            vec![Arg::write_ptr(addr, std::mem::size_of::<AtomicI64>())],
        );
    }
    runtime.wait_for_all().unwrap();
    for slot in &slots {
        assert_eq!(slot.load(Ordering::SeqCst), 1);
    }
}

#[test]
fn scenario_c_readers_observe_the_writer_and_never_precede_it() {
    let runtime = Runtime::builder().threads(4).build().unwrap();
    let r = AtomicI64::new(0);
    let out1 = AtomicI64::new(-1);
    let out2 = AtomicI64::new(-1);
    let r_addr = addr_of(&r);
    let out1_addr = addr_of(&out1);
    let out2_addr = addr_of(&out2);

    runtime.spawn(
        move || unsafe {
            std::thread::sleep(Duration::from_millis(20));
            (&*(r_addr as *const AtomicI64)).store(42, Ordering::SeqCst);
        },
        vec![Arg::write_ptr(r_addr, 8)],
    );
    runtime.spawn(
        move || unsafe {
            let value = (&*(r_addr as *const AtomicI64)).load(Ordering::SeqCst);
            (&*(out1_addr as *const AtomicI64)).store(value, Ordering::SeqCst);
        },
        vec![Arg::read_ptr(r_addr, 8), Arg::write_ptr(out1_addr, 8)],
    );
    runtime.spawn(
        move || unsafe {
            let value = (&*(r_addr as *const AtomicI64)).load(Ordering::SeqCst);
            (&*(out2_addr as *const AtomicI64)).store(value, Ordering::SeqCst);
        },
        vec![Arg::read_ptr(r_addr, 8), Arg::write_ptr(out2_addr, 8)],
    );

    runtime.wait_for_all().unwrap();
    assert_eq!(out1.load(Ordering::SeqCst), 42);
    assert_eq!(out2.load(Ordering::SeqCst), 42);
}

#[repr(C)]
struct Pair {
    a: i64,
    b: i64,
}

#[test]
fn scenario_d_subobject_tracking_serializes_whole_struct_writes_against_fields() {
    let runtime = Runtime::builder().threads(4).build().unwrap();
    let s = Pair { a: 0, b: 0 };
    let a_addr = addr_of(&s.a);
    let b_addr = addr_of(&s.b);
    let s_addr = addr_of(&s);

    runtime.spawn(
        move || unsafe { *(a_addr as *mut i64) += 1 },
        vec![Arg::write_ptr(a_addr, 8)],
    );
    runtime.spawn(
        move || unsafe { *(b_addr as *mut i64) += 1 },
        vec![Arg::write_ptr(b_addr, 8)],
    );
    // Touches the whole struct, so the conflict scan must serialize it
    // against both field-level tasks above even though it only mutates `a`.
    runtime.spawn(
        move || unsafe { (*(s_addr as *mut Pair)).a += 1 },
        vec![Arg::write_ptr(s_addr, std::mem::size_of::<Pair>())],
    );
    runtime.spawn(
        move || unsafe { *(a_addr as *mut i64) += 1 },
        vec![Arg::write_ptr(a_addr, 8)],
    );
    runtime.spawn(
        move || unsafe { *(b_addr as *mut i64) += 1 },
        vec![Arg::write_ptr(b_addr, 8)],
    );

    runtime.wait_for_all().unwrap();
    assert_eq!(s.a, 3);
    assert_eq!(s.b, 2);
}

#[test]
fn scenario_e_disjoint_array_selections_run_without_waiting_on_each_other() {
    use dtask_core::Range;

    const K: usize = 8;
    const SLICE_LEN: usize = 16;
    let runtime = Runtime::builder().threads(8).build().unwrap();
    let mut data = vec![0i64; K * SLICE_LEN];
    let base = data.as_mut_ptr() as usize;
    let concurrent = Arc::new(AtomicUsize::new(0));
    let max_concurrent = Arc::new(AtomicUsize::new(0));

    for k in 0..K {
        let concurrent = Arc::clone(&concurrent);
        let max_concurrent = Arc::clone(&max_concurrent);
        let lo = (k * SLICE_LEN) as i64;
        let hi = lo + SLICE_LEN as i64 - 1;
        runtime.spawn(
            move || {
                let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
                max_concurrent.fetch_max(now, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(10));
                unsafe {
                    for i in lo..=hi {
                        *((base as *mut i64).offset(i as isize)) += 1;
                    }
                }
                concurrent.fetch_sub(1, Ordering::SeqCst);
            },
            vec![Arg::array_write(
                unsafe { std::slice::from_raw_parts_mut(base as *mut i64, K * SLICE_LEN) },
                vec![Range::new(lo, hi)],
            )],
        );
    }

    runtime.wait_for_all().unwrap();
    assert!(data.iter().all(|&v| v == 1));
    assert!(max_concurrent.load(Ordering::SeqCst) > 1, "disjoint slices should overlap in time");
}

#[test]
fn scenario_f_wait_for_targets_only_the_named_dependency() {
    let runtime = Runtime::builder().threads(4).build().unwrap();
    let x = AtomicI64::new(0);
    let y = AtomicI64::new(0);
    let x_addr = addr_of(&x);
    let y_addr = addr_of(&y);

    runtime.spawn(
        move || unsafe {
            std::thread::sleep(Duration::from_millis(30));
            (&*(x_addr as *const AtomicI64)).fetch_add(2, Ordering::SeqCst);
        },
        vec![Arg::write_ptr(x_addr, 8)],
    );
    runtime.spawn(
        move || unsafe {
            std::thread::sleep(Duration::from_millis(30));
            (&*(x_addr as *const AtomicI64)).fetch_add(1, Ordering::SeqCst);
        },
        vec![Arg::write_ptr(x_addr, 8)],
    );
    runtime.spawn(
        move || unsafe {
            (&*(y_addr as *const AtomicI64)).fetch_add(3, Ordering::SeqCst);
        },
        vec![Arg::write_ptr(y_addr, 8)],
    );

    let started = Instant::now();
    runtime.wait_for(vec![Arg::write_ptr(y_addr, 8)]).unwrap();
    assert_eq!(y.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() < Duration::from_millis(30), "wait_for(y) should not block on x's chain");

    runtime.wait_for_all().unwrap();
    assert_eq!(x.load(Ordering::SeqCst), 3);
}

#[test]
fn observer_bounds_a_nested_fan_out() {
    let runtime = Arc::new(Runtime::builder().threads(4).build().unwrap());
    let total = Arc::new(AtomicI64::new(0));

    let nested_runtime = Arc::clone(&runtime);
    let nested_total = Arc::clone(&total);
    runtime.spawn(
        move || {
            let _observer = Observer::new(&nested_runtime);
            for _ in 0..4 {
                let total = Arc::clone(&nested_total);
                nested_runtime.spawn(move || { total.fetch_add(1, Ordering::SeqCst); }, vec![]);
            }
        },
        vec![],
    );

    runtime.wait_for_all().unwrap();
    assert_eq!(total.load(Ordering::SeqCst), 4);
}
