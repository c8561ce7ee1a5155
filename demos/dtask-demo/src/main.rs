//!
//! dtask CLI - Exercises the seed scenarios against a live Runtime
//!
//! Provides one subcommand per scenario:
//! - dtask-demo chain: a linear chain of increments to one value
//! - dtask-demo parallel: N independent increments across disjoint slots
//! - dtask-demo fan-in: one slow writer, two readers racing to observe it
//! - dtask-demo wait-for: spawn three tasks, wait for only one of them
//!

use std::sync::atomic::{AtomicI64, Ordering};
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use dtask_runtime::{Arg, Runtime};

#[derive(Parser)]
#[command(name = "dtask-demo")]
#[command(author, version, about = "Demo driver for the dtask scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, global = true, help = "Worker thread count, negative counts down from available parallelism")]
    threads: Option<i64>,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Ten sequential increments to one shared value")]
    Chain,
    #[command(about = "N independent increments across disjoint slots")]
    Parallel {
        #[arg(long, default_value_t = 64)]
        count: usize,
    },
    #[command(about = "A slow writer, then two readers racing to observe it")]
    FanIn,
    #[command(about = "Spawn three tasks, wait_for only one of them")]
    WaitFor,
}

fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();
    tracing::info!(threads = ?cli.threads, "starting dtask-demo");

    let mut builder = Runtime::builder();
    if let Some(threads) = cli.threads {
        builder = builder.threads(threads);
    }
    let runtime = match builder.build() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("failed to start runtime: {err}");
            std::process::exit(1);
        }
    };

    match cli.command {
        Commands::Chain => run_chain(&runtime),
        Commands::Parallel { count } => run_parallel(&runtime, count),
        Commands::FanIn => run_fan_in(&runtime),
        Commands::WaitFor => run_wait_for(&runtime),
    }
}

fn run_chain(runtime: &Runtime) {
    let x = AtomicI64::new(0);
    let addr = &x as *const AtomicI64 as usize;
    for _ in 0..10 {
        runtime.spawn(
            move || unsafe { (&*(addr as *const AtomicI64)).fetch_add(1, Ordering::SeqCst); },
            vec![Arg::write_ptr(addr, std::mem::size_of::<AtomicI64>())],
        );
    }
    match runtime.wait_for_all() {
        Ok(()) => println!("chain: x = {}", x.load(Ordering::SeqCst)),
        Err(panic) => eprintln!("chain failed: {panic}"),
    }
}

fn run_parallel(runtime: &Runtime, count: usize) {
    let slots: Vec<AtomicI64> = (0..count).map(|_| AtomicI64::new(0)).collect();
    let start = Instant::now();
    for slot in &slots {
        let addr = slot as *const AtomicI64 as usize;
        runtime.spawn(
            move || unsafe {
                std::thread::sleep(Duration::from_millis(5));
                (&*(addr as *const AtomicI64)).fetch_add(1, Ordering::SeqCst);
            },
            vec![Arg::write_ptr(addr, std::mem::size_of::<AtomicI64>())],
        );
    }
    match runtime.wait_for_all() {
        Ok(()) => {
            let done = slots.iter().all(|s| s.load(Ordering::SeqCst) == 1);
            println!("parallel: {count} slots, all incremented once = {done}, elapsed = {:?}", start.elapsed());
        }
        Err(panic) => eprintln!("parallel failed: {panic}"),
    }
}

fn run_fan_in(runtime: &Runtime) {
    let r = AtomicI64::new(0);
    let out1 = AtomicI64::new(-1);
    let out2 = AtomicI64::new(-1);
    let r_addr = &r as *const AtomicI64 as usize;
    let out1_addr = &out1 as *const AtomicI64 as usize;
    let out2_addr = &out2 as *const AtomicI64 as usize;

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

    match runtime.wait_for_all() {
        Ok(()) => println!("fan-in: out1 = {}, out2 = {}", out1.load(Ordering::SeqCst), out2.load(Ordering::SeqCst)),
        Err(panic) => eprintln!("fan-in failed: {panic}"),
    }
}

fn run_wait_for(runtime: &Runtime) {
    let x = AtomicI64::new(0);
    let y = AtomicI64::new(0);
    let x_addr = &x as *const AtomicI64 as usize;
    let y_addr = &y as *const AtomicI64 as usize;

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
        move || unsafe { (&*(y_addr as *const AtomicI64)).fetch_add(3, Ordering::SeqCst); },
        vec![Arg::write_ptr(y_addr, 8)],
    );

    let start = Instant::now();
    match runtime.wait_for(vec![Arg::write_ptr(y_addr, 8)]) {
        Ok(()) => println!("wait_for(y): y = {}, elapsed = {:?} (x may still be mid-update)", y.load(Ordering::SeqCst), start.elapsed()),
        Err(panic) => eprintln!("wait_for(y) failed: {panic}"),
    }

    if let Err(panic) = runtime.wait_for_all() {
        eprintln!("wait_for_all failed: {panic}");
        return;
    }
    println!("after wait_for_all: x = {}", x.load(Ordering::SeqCst));
}
