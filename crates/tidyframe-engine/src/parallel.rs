//! Partition-level parallelism.
//!
//! Partitions are independent, so per-group evaluation may fan out over a thread pool. Results
//! are always returned in partition order regardless of scheduling.

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::prelude::*;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use rayon::ThreadPool;
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
use std::sync::OnceLock;

/// Environment variable overriding the worker count of the engine pool.
pub const THREADS_ENV: &str = "TIDYFRAME_NUM_THREADS";

/// Crate-local pool. Building it can fail on constrained hosts; callers then run
/// single-threaded instead of relying on Rayon's global pool (which panics in that case).
#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
static POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn desired_threads() -> usize {
    std::env::var(THREADS_ENV)
        .ok()
        .and_then(|s| s.parse::<usize>().ok())
        .filter(|&n| n > 0)
        .unwrap_or_else(|| {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        })
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn build_pool() -> Option<ThreadPool> {
    let requested = desired_threads();
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("tidyframe-{i}"))
            .build()
    };
    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(err) => {
            log::warn!("could not start {requested}-thread pool: {err}");
            if requested > 1 {
                try_build(1).ok()
            } else {
                None
            }
        }
    }
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
pub(crate) fn pool() -> Option<&'static ThreadPool> {
    POOL.get_or_init(build_pool).as_ref()
}

/// Evaluate `f(0) .. f(count - 1)`, in parallel when `parallel` is set and a pool exists.
pub(crate) fn map_indexed<T, F>(count: usize, parallel: bool, f: F) -> Vec<T>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    if parallel {
        if let Some(out) = map_on_pool(count, &f) {
            return out;
        }
    }
    log::trace!("evaluating {count} partitions sequentially");
    (0..count).map(f).collect()
}

#[cfg(all(feature = "parallel", not(target_arch = "wasm32")))]
fn map_on_pool<T, F>(count: usize, f: &F) -> Option<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    let pool = pool()?;
    log::trace!(
        "evaluating {count} partitions on {} threads",
        pool.current_num_threads()
    );
    Some(pool.install(|| (0..count).into_par_iter().map(f).collect()))
}

#[cfg(not(all(feature = "parallel", not(target_arch = "wasm32"))))]
fn map_on_pool<T, F>(_count: usize, _f: &F) -> Option<Vec<T>>
where
    T: Send,
    F: Fn(usize) -> T + Sync + Send,
{
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn results_keep_index_order() {
        let out = map_indexed(1000, true, |i| i * 2);
        assert_eq!(out.len(), 1000);
        assert!(out.iter().enumerate().all(|(i, &v)| v == i * 2));
    }

    #[test]
    fn sequential_path_matches() {
        assert_eq!(map_indexed(5, false, |i| i), vec![0, 1, 2, 3, 4]);
    }
}
