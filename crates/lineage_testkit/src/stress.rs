//! Stress tests for Lineage.
//!
//! These helpers drive many concurrent changes and time-travel queries
//! against one lineage and count the outcomes.

use crate::fixtures::{config, ts};
use lineage_core::{
    ChangeRequest, CoreError, EntityKey, EntityKind, Lineage, Onboarding, TenantScope,
};
use rand::Rng;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total operations performed.
    pub total_ops: usize,
    /// Successful operations.
    pub successful_ops: usize,
    /// Operations that lost a race and may be retried.
    pub conflicts: usize,
    /// Failed operations.
    pub failed_ops: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    /// Creates a new result.
    pub fn new(successful: usize, conflicts: usize, failed: usize, duration: Duration) -> Self {
        let total = successful + conflicts + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            conflicts,
            failed_ops: failed,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total operations: {}", self.total_ops);
        println!("Successful: {}", self.successful_ops);
        println!("Conflicts: {}", self.conflicts);
        println!("Failed: {}", self.failed_ops);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} ops/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Number of operations per thread.
    pub operations: usize,
    /// Number of concurrent threads.
    pub threads: usize,
    /// Number of distinct entities.
    pub entity_count: usize,
    /// Tenant the entities live in.
    pub tenant: String,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 200,
            threads: 4,
            entity_count: 8,
            tenant: "stress".to_string(),
        }
    }
}

#[derive(Default)]
struct Counters {
    successful: AtomicUsize,
    conflicts: AtomicUsize,
    failed: AtomicUsize,
}

impl Counters {
    fn result(&self, start: Instant) -> StressTestResult {
        StressTestResult::new(
            self.successful.load(Ordering::Relaxed),
            self.conflicts.load(Ordering::Relaxed),
            self.failed.load(Ordering::Relaxed),
            start.elapsed(),
        )
    }
}

fn entity(i: usize) -> EntityKey {
    EntityKey::new(format!("S{i}"))
}

/// Onboards `config.entity_count` devices at instant 0.
pub fn populate(lineage: &Lineage, config: &StressConfig) {
    let scope = TenantScope::new(config.tenant.as_str());
    for i in 0..config.entity_count {
        lineage
            .onboard(
                &scope,
                Onboarding::new(EntityKind::device(), entity(i), config_value(0), ts(0)),
            )
            .expect("Failed to onboard");
    }
}

fn config_value(n: i64) -> lineage_codec::Value {
    config(&format!("v{n}"))
}

/// Classifies a change result. Concurrency conflicts and changes whose
/// instant was overtaken by a racing writer count as conflicts.
fn record_change(counters: &Counters, result: Result<(), CoreError>) {
    let counter = match result {
        Ok(()) => &counters.successful,
        Err(e) if e.is_retryable() => &counters.conflicts,
        Err(CoreError::InvalidTemporalRecord { .. }) => &counters.conflicts,
        Err(_) => &counters.failed,
    };
    counter.fetch_add(1, Ordering::Relaxed);
}

/// Runs concurrent configuration changes against random entities.
///
/// Change instants come from one shared clock, so a writer can find its
/// instant already overtaken; that is counted as a conflict.
pub fn stress_concurrent_changes(lineage: Arc<Lineage>, config: &StressConfig) -> StressTestResult {
    populate(&lineage, config);
    let clock = Arc::new(AtomicI64::new(1));
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    let handles: Vec<_> = (0..config.threads)
        .map(|_| {
            let lineage = Arc::clone(&lineage);
            let clock = Arc::clone(&clock);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            thread::spawn(move || {
                let scope = TenantScope::new(config.tenant.as_str());
                let mut rng = rand::thread_rng();
                for _ in 0..config.operations {
                    let target = entity(rng.gen_range(0..config.entity_count));
                    let at = clock.fetch_add(1, Ordering::SeqCst);
                    let result = lineage
                        .change_configuration(
                            &scope,
                            ChangeRequest::new(
                                EntityKind::device(),
                                target,
                                config_value(at),
                                ts(at),
                            ),
                        )
                        .map(|_| ());
                    record_change(&counters, result);
                }
            })
        })
        .collect();

    for handle in handles {
        handle.join().expect("Thread panicked");
    }
    counters.result(start)
}

/// Runs concurrent as-of queries while one writer keeps changing entities.
///
/// Readers only query instants up to the last completed change, which every
/// entity's history covers even while a later promotion is in flight.
pub fn stress_time_travel_reads(lineage: Arc<Lineage>, config: &StressConfig) -> StressTestResult {
    populate(&lineage, config);
    let horizon = i64::try_from(config.operations).unwrap_or(i64::MAX);
    let published = Arc::new(AtomicI64::new(0));
    let counters = Arc::new(Counters::default());
    let start = Instant::now();

    let writer = {
        let lineage = Arc::clone(&lineage);
        let published = Arc::clone(&published);
        let config = config.clone();
        thread::spawn(move || {
            let scope = TenantScope::new(config.tenant.as_str());
            for at in 1..=horizon {
                let index = usize::try_from(at).unwrap_or(0) % config.entity_count;
                lineage
                    .change_configuration(
                        &scope,
                        ChangeRequest::new(
                            EntityKind::device(),
                            entity(index),
                            config_value(at),
                            ts(at),
                        ),
                    )
                    .expect("Uncontended change failed");
                published.store(at, Ordering::SeqCst);
            }
        })
    };

    let readers: Vec<_> = (0..config.threads)
        .map(|_| {
            let lineage = Arc::clone(&lineage);
            let published = Arc::clone(&published);
            let counters = Arc::clone(&counters);
            let config = config.clone();
            thread::spawn(move || {
                let scope = TenantScope::new(config.tenant.as_str());
                let mut rng = rand::thread_rng();
                for _ in 0..config.operations {
                    let target = entity(rng.gen_range(0..config.entity_count));
                    let at = rng.gen_range(0..=published.load(Ordering::SeqCst));
                    let counter = match lineage.as_of(
                        &scope,
                        &EntityKind::device(),
                        &target,
                        Some(ts(at)),
                    ) {
                        Ok(Some(_)) => &counters.successful,
                        Ok(None) | Err(_) => &counters.failed,
                    };
                    counter.fetch_add(1, Ordering::Relaxed);
                }
            })
        })
        .collect();

    writer.join().expect("Writer panicked");
    for handle in readers {
        handle.join().expect("Reader panicked");
    }
    counters.result(start)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            operations: 50,
            threads: 4,
            entity_count: 4,
            tenant: "stress".to_string(),
        }
    }

    #[test]
    fn concurrent_changes_keep_one_current_version() {
        let lineage = Arc::new(Lineage::open_in_memory(&[EntityKind::device()]).unwrap());
        let config = small();
        let result = stress_concurrent_changes(Arc::clone(&lineage), &config);

        assert_eq!(result.total_ops, config.operations * config.threads);
        assert_eq!(result.failed_ops, 0);
        assert!(result.successful_ops > 0);
        let report = lineage.verify(&TenantScope::new("stress")).unwrap();
        assert!(report.issues.is_empty(), "{:?}", report.issues);
    }

    #[test]
    fn reads_during_writes_always_resolve() {
        let lineage = Arc::new(Lineage::open_in_memory(&[EntityKind::device()]).unwrap());
        let result = stress_time_travel_reads(Arc::clone(&lineage), &small());
        assert_eq!(result.failed_ops, 0);
        assert_eq!(result.successful_ops, 200);
    }
}
