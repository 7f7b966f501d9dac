//! Simple pooling example
//!
//! Demonstrates basic pool usage with a simulated connection factory.

use std::thread;
use std::time::Duration;

use cistern_resource::{
    error::{Error, Result},
    events::EventSink,
    pool::{PoolConfig, ResourcePool},
    resource::{RawResource, ResourceFactory},
};

/// Example factory that simulates opening database connections
struct ConnectionFactory {
    host: String,
}

/// Example raw connection
struct Connection {
    label: String,
    _events: EventSink,
}

impl ResourceFactory for ConnectionFactory {
    type Raw = Connection;

    fn id(&self) -> &str {
        "connection"
    }

    fn create_raw(&self, events: EventSink) -> Result<Connection> {
        if self.host.is_empty() {
            return Err(Error::creation(self.id(), "host cannot be empty"));
        }
        // Simulate connection handshake
        thread::sleep(Duration::from_millis(50));
        Ok(Connection {
            label: format!("Connection-{}-{}", self.host, events.entry_id()),
            _events: events,
        })
    }
}

impl RawResource for Connection {
    type Handle = String;

    fn open(&mut self) -> Result<String> {
        Ok(self.label.clone())
    }

    fn close(&mut self) -> Result<()> {
        println!("  closing {}", self.label);
        Ok(())
    }
}

fn main() -> std::result::Result<(), Box<dyn std::error::Error>> {
    println!("=== Simple Resource Pool Example ===\n");

    let pool_config = PoolConfig::default()
        .with_capacity(2)
        .with_acquire_timeout(Duration::from_secs(5));

    let pool = ResourcePool::new(
        ConnectionFactory {
            host: "localhost".to_string(),
        },
        pool_config,
    );

    println!("Pool created with capacity 2\n");

    println!("Acquiring resource...");
    let resource = pool.acquire()?;
    println!("  Resource acquired: {}\n", *resource);

    let stats = pool.stats();
    println!("Pool statistics:");
    println!("  - Active: {}", stats.active);
    println!("  - Idle: {}", stats.idle);
    println!("  - Total acquisitions: {}", stats.acquisitions);

    // Release the resource by dropping the guard
    drop(resource);

    // Several threads share the two connections
    thread::scope(|s| {
        for worker in 0..4 {
            let pool = &pool;
            s.spawn(move || match pool.acquire() {
                Ok(conn) => {
                    println!("  worker {worker} got {}", *conn);
                    thread::sleep(Duration::from_millis(20));
                }
                Err(err) => println!("  worker {worker} failed: {err}"),
            });
        }
    });

    let final_stats = pool.stats();
    println!("\nFinal statistics:");
    println!("  - Active: {}", final_stats.active);
    println!("  - Idle: {}", final_stats.idle);
    println!("  - Created: {}", final_stats.created);
    println!("  - Total releases: {}", final_stats.releases);

    pool.close();

    println!("\n=== Example completed! ===");

    Ok(())
}
