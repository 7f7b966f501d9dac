//! `cistern soak`: many threads cycling a small pool of simulated connections.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::bail;
use clap::Args;
use cistern_resource::testing::{MockConnection, MockFactory, MockLedger};
use cistern_resource::{
    Error, EventSink, PoolConfig, PoolStats, ResourceFactory, ResourcePool, Result,
};
use serde::Serialize;

/// Flags for `cistern soak`.
///
/// Capacity and acquire timeout fall back to `CISTERN_POOL_CAPACITY` and
/// `CISTERN_POOL_ACQUIRE_TIMEOUT_SECS` through [`PoolConfig::from_env`].
#[derive(Debug, Args)]
pub struct SoakArgs {
    /// Worker threads
    #[arg(long, env = "CISTERN_SOAK_THREADS", default_value_t = 8)]
    pub threads: usize,

    /// Acquire/release cycles per thread
    #[arg(long, env = "CISTERN_SOAK_ITERATIONS", default_value_t = 100)]
    pub iterations: u64,

    /// Pool capacity (values below 1 reset to the default)
    #[arg(long)]
    pub capacity: Option<usize>,

    /// Acquire timeout in seconds (values below 1 reset to the default)
    #[arg(long)]
    pub acquire_timeout_secs: Option<u64>,

    /// How long each checkout is held, in milliseconds
    #[arg(long, env = "CISTERN_SOAK_HOLD_MS", default_value_t = 1)]
    pub hold_ms: u64,

    /// Fire an error notification on every N-th checkout (0 disables)
    #[arg(long, env = "CISTERN_SOAK_TAINT_EVERY", default_value_t = 0)]
    pub taint_every: u64,

    /// Fail every N-th connection attempt (0 disables)
    #[arg(long, env = "CISTERN_SOAK_FAIL_CREATE_EVERY", default_value_t = 0)]
    pub fail_create_every: u64,
}

impl SoakArgs {
    fn pool_config(&self) -> PoolConfig {
        let mut config = PoolConfig::from_env();
        if let Some(capacity) = self.capacity {
            config = config.with_capacity(capacity);
        }
        if let Some(secs) = self.acquire_timeout_secs {
            config = config.with_acquire_timeout(Duration::from_secs(secs));
        }
        config.normalized()
    }
}

/// [`MockFactory`] that refuses every N-th connection attempt.
struct SimulatedFactory {
    inner: MockFactory,
    fail_every: u64,
    attempts: AtomicU64,
}

impl ResourceFactory for SimulatedFactory {
    type Raw = MockConnection;

    fn id(&self) -> &str {
        self.inner.id()
    }

    fn create_raw(&self, events: EventSink) -> Result<MockConnection> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        if self.fail_every > 0 && attempt % self.fail_every == 0 {
            return Err(Error::creation(
                self.id(),
                format!("simulated refusal on attempt {attempt}"),
            ));
        }
        self.inner.create_raw(events)
    }
}

#[derive(Default)]
struct Counters {
    checkouts: AtomicU64,
    tainted: AtomicU64,
    timeouts: AtomicU64,
    creation_failures: AtomicU64,
    other_errors: AtomicU64,
    peak_active: AtomicUsize,
}

/// What the workers saw.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Outcomes {
    pub checkouts: u64,
    pub tainted: u64,
    pub timeouts: u64,
    pub creation_failures: u64,
    pub other_errors: u64,
    pub peak_active: usize,
}

impl Counters {
    fn snapshot(&self) -> Outcomes {
        Outcomes {
            checkouts: self.checkouts.load(Ordering::Relaxed),
            tainted: self.tainted.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            creation_failures: self.creation_failures.load(Ordering::Relaxed),
            other_errors: self.other_errors.load(Ordering::Relaxed),
            peak_active: self.peak_active.load(Ordering::Relaxed),
        }
    }
}

/// Result of a soak run, printed as JSON.
#[derive(Debug, Serialize)]
pub struct SoakReport {
    pub config: PoolConfig,
    pub threads: usize,
    pub iterations: u64,
    pub elapsed_ms: u128,
    pub outcomes: Outcomes,
    pub stats: PoolStats,
    /// Connections created but never closed.
    pub leaked: Vec<u64>,
    /// Connections closed more than once.
    pub closed_twice: Vec<u64>,
}

impl SoakReport {
    /// Fail when the ledger shows a leak, a double close or a capacity breach.
    pub fn verify(&self) -> anyhow::Result<()> {
        if !self.leaked.is_empty() {
            bail!("{} connection(s) leaked: {:?}", self.leaked.len(), self.leaked);
        }
        if !self.closed_twice.is_empty() {
            bail!(
                "{} connection(s) closed twice: {:?}",
                self.closed_twice.len(),
                self.closed_twice
            );
        }
        if self.outcomes.peak_active > self.config.capacity {
            bail!(
                "{} connections checked out at once with capacity {}",
                self.outcomes.peak_active,
                self.config.capacity
            );
        }
        Ok(())
    }
}

/// Run the soak described by `args`, close the pool and collect the report.
pub fn run(args: &SoakArgs) -> anyhow::Result<SoakReport> {
    let config = args.pool_config();
    let mock = MockFactory::new("soak");
    let ledger = mock.ledger();
    let factory = SimulatedFactory {
        inner: mock,
        fail_every: args.fail_create_every,
        attempts: AtomicU64::new(0),
    };
    let pool = ResourcePool::new(factory, config.clone());
    let counters = Counters::default();
    let hold = Duration::from_millis(args.hold_ms);

    tracing::info!(
        threads = args.threads,
        iterations = args.iterations,
        capacity = config.capacity,
        "soak starting"
    );

    let started = Instant::now();
    thread::scope(|s| {
        for _ in 0..args.threads {
            s.spawn(|| worker(&pool, &ledger, &counters, args, hold));
        }
    });
    let elapsed = started.elapsed();

    pool.close();
    let stats = pool.stats();
    let outcomes = counters.snapshot();

    tracing::info!(
        elapsed_ms = elapsed.as_millis() as u64,
        checkouts = outcomes.checkouts,
        discarded = stats.discarded,
        "soak finished"
    );

    Ok(SoakReport {
        config,
        threads: args.threads,
        iterations: args.iterations,
        elapsed_ms: elapsed.as_millis(),
        outcomes,
        stats,
        leaked: ledger.unclosed().into_iter().map(|id| id.get()).collect(),
        closed_twice: ledger.closed_twice().into_iter().map(|id| id.get()).collect(),
    })
}

fn worker(
    pool: &ResourcePool<SimulatedFactory>,
    ledger: &MockLedger,
    counters: &Counters,
    args: &SoakArgs,
    hold: Duration,
) {
    for _ in 0..args.iterations {
        match pool.acquire() {
            Ok(mut session) => {
                let n = counters.checkouts.fetch_add(1, Ordering::Relaxed) + 1;
                counters
                    .peak_active
                    .fetch_max(pool.stats().active, Ordering::Relaxed);

                session.queries += 1;
                if !hold.is_zero() {
                    thread::sleep(hold);
                }
                if args.taint_every > 0 && n % args.taint_every == 0 {
                    ledger.report_error(session.id());
                    counters.tainted.fetch_add(1, Ordering::Relaxed);
                }
            }
            Err(err) if err.is_retryable() => {
                counters.timeouts.fetch_add(1, Ordering::Relaxed);
            }
            Err(Error::Creation { reason, .. }) => {
                tracing::debug!(%reason, "acquire failed");
                counters.creation_failures.fetch_add(1, Ordering::Relaxed);
            }
            Err(err) => {
                tracing::warn!(error = %err, "unexpected acquire failure");
                counters.other_errors.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
