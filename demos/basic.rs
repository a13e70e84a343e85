//! Basic usage of the pools and the mutex factory

use esox_pooling::{
    ExpiryPool, FactoryError, MutexFactory, ObjectFactory, Pool, RoundRobinPool, SimplePool,
    factory_fn,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn main() {
    println!("=== Esox Pooling - Basic Examples ===\n");

    // Example 1: Unbounded reuse
    simple_pool();

    // Example 2: Shared channels in cyclic order
    round_robin_pool();

    // Example 3: Connections that expire
    expiry_pool();

    // Example 4: Per-key locking
    keyed_locks();
}

fn simple_pool() {
    println!("1. Simple Pool:");
    let pool = SimplePool::new(factory_fn(|| Ok(String::with_capacity(64))));

    {
        let mut buf = pool.lease().unwrap();
        buf.push_str("scratch");
        println!("   Leased buffer: {}", *buf);
    }

    println!("   Idle after return: {}\n", pool.num_idle());
    pool.close();
}

fn round_robin_pool() {
    println!("2. Round-Robin Pool:");
    let next = AtomicU32::new(0);
    let pool = RoundRobinPool::with_size(
        factory_fn(move || Ok(Arc::new(format!("channel-{}", next.fetch_add(1, Ordering::SeqCst))))),
        3,
    )
    .unwrap();

    for _ in 0..5 {
        let channel = pool.borrow_object().unwrap();
        println!("   Dispatched to {}", *channel);
    }
    pool.shutdown();
    println!();
}

struct Connections {
    opened: AtomicU32,
}

impl ObjectFactory<u32> for Connections {
    fn create(&self) -> Result<u32, FactoryError> {
        Ok(self.opened.fetch_add(1, Ordering::SeqCst) + 1)
    }

    fn destroy(&self, conn: u32) -> Result<(), FactoryError> {
        println!("   Closing connection #{conn}");
        Ok(())
    }
}

fn expiry_pool() {
    println!("3. Expiry Pool:");
    let pool = ExpiryPool::builder()
        .min_size(2)
        .max_size(4)
        .expiry(Duration::from_secs(600))
        .object_supplier(Connections {
            opened: AtomicU32::new(0),
        })
        .build()
        .unwrap();

    let conn = pool.get_object().unwrap();
    println!("   Using connection #{}", *conn);
    println!("   Active: {}, Idle: {}", pool.num_active(), pool.num_idle());
    pool.return_object(conn);

    pool.close();
    println!();
}

fn keyed_locks() {
    println!("4. Mutex Factory:");
    let locks = MutexFactory::new();

    let mutex = locks.get_mutex("user-42");
    {
        let _guard = mutex.lock();
        println!("   Building session for user-42");
    }
    drop(mutex);

    println!("   Reclaimed {} unused lock(s)", locks.purge());
}
