//! Stampede collapse demo: many threads ask for the same cold key at once,
//! the expensive load runs exactly once, everyone gets the result.
//!
//! Run with:
//!     cargo run --example stampede --release

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::{Duration, Instant};

use solo::{CacheBuilder, CancellationToken};

const CALLERS: usize = 16;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "debug".into()),
        )
        .init();

    let cancel = CancellationToken::new();
    let cache: solo::Cache<String, String> = CacheBuilder::new(Duration::from_millis(200))
        .cancellation(cancel.clone())
        .build();
    let sweeper = cache.schedule_purge(Duration::from_millis(50));

    let loads = Arc::new(AtomicUsize::new(0));
    let barrier = Arc::new(Barrier::new(CALLERS));
    let start = Instant::now();

    let mut handles = Vec::new();
    for id in 0..CALLERS {
        let cache = cache.clone();
        let loads = Arc::clone(&loads);
        let barrier = Arc::clone(&barrier);
        handles.push(thread::spawn(move || {
            barrier.wait();
            let value = cache
                .get_or_refresh("user:42".to_string(), || {
                    // Stand-in for a slow database fetch.
                    loads.fetch_add(1, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(100));
                    Ok::<_, std::io::Error>("profile-of-user-42".to_string())
                })
                .expect("refresh cannot fail here");
            println!("caller {id:2} got {value:?} after {:?}", start.elapsed());
        }));
    }
    for handle in handles {
        handle.join().expect("caller panicked");
    }

    println!(
        "\n{CALLERS} concurrent callers, {} load(s) of the backend",
        loads.load(Ordering::SeqCst)
    );

    // Let the entry expire and the sweep collect it.
    thread::sleep(Duration::from_millis(400));
    println!("entries after expiry + sweep: {}", cache.entry_count());

    cancel.cancel();
    sweeper.join();
}
