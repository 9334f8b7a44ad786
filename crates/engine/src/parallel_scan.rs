//! Adaptive parallel scan (spec.md §5): a shared cursor divided into
//! worker-sized chunks, each worker resizing its own chunk request toward a
//! target per-chunk service-time band via an exponential moving average.
//!
//! This approximates the "per-worker deques with top-steal" scheduling
//! model spec.md describes using a single atomic cursor rather than literal
//! per-thread deques — idle workers pull their next chunk from the same
//! cursor instead of stealing from a sibling's deque, which gives the same
//! load-balancing outcome (no worker idles while work remains) without a
//! deque-stealing dependency. Chunk order across workers is therefore
//! undefined, matching spec.md's "ordering across chunks is undefined".

use protobase_core::config::ParallelConfig;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Instant;
use tracing::debug;

/// Scan `len` items in parallel, calling `process(start..end)` once per
/// chunk and returning the concatenation of every chunk's results. Result
/// order is unspecified — callers needing order must sort afterward (spec.md
/// §5 "callers that require ordering must sort or use sequential mode").
pub fn parallel_scan<R, F>(len: usize, config: &ParallelConfig, process: F) -> Vec<R>
where
    R: Send,
    F: Fn(usize, usize) -> Vec<R> + Sync,
{
    if len == 0 {
        return Vec::new();
    }
    let workers = config.max_workers.max(1).min(len);
    let cursor = AtomicUsize::new(0);
    let results: Mutex<Vec<R>> = Mutex::new(Vec::new());

    std::thread::scope(|scope| {
        for worker_id in 0..workers {
            let cursor = &cursor;
            let results = &results;
            let process = &process;
            scope.spawn(move || {
                let mut chunk_size = config.initial_chunk_size.max(1);
                let mut ema_ms: Option<f64> = None;
                loop {
                    let start = cursor.fetch_add(chunk_size, Ordering::SeqCst);
                    if start >= len {
                        break;
                    }
                    let end = (start + chunk_size).min(len);

                    let began = Instant::now();
                    let chunk_results = process(start, end);
                    let elapsed_ms = began.elapsed().as_secs_f64() * 1000.0;

                    ema_ms = Some(match ema_ms {
                        None => elapsed_ms,
                        Some(prev) => config.chunk_ema_alpha * elapsed_ms
                            + (1.0 - config.chunk_ema_alpha) * prev,
                    });
                    let observed = ema_ms.unwrap();
                    if observed < config.target_ms_low {
                        chunk_size = (chunk_size * 2).min(config.max_chunk_size);
                    } else if observed > config.target_ms_high {
                        chunk_size = (chunk_size / 2).max(config.min_chunk_size);
                    }
                    debug!(worker_id, start, end, chunk_size, observed, "scanned chunk");

                    results.lock().unwrap().extend(chunk_results);
                }
            });
        }
    });

    results.into_inner().unwrap()
}

/// Run `process` over `0..len` sequentially, preserving order. Used when a
/// caller needs order without wrapping the result in an `OrderByPlan`.
pub fn sequential_scan<R, F>(len: usize, process: F) -> Vec<R>
where
    F: Fn(usize, usize) -> Vec<R>,
{
    process(0, len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parallel_scan_visits_every_index_exactly_once() {
        let config = ParallelConfig {
            max_workers: 4,
            initial_chunk_size: 7,
            min_chunk_size: 1,
            max_chunk_size: 64,
            ..ParallelConfig::default()
        };
        let len = 1000;
        let mut seen = parallel_scan(len, &config, |start, end| (start..end).collect::<Vec<_>>());
        seen.sort_unstable();
        assert_eq!(seen, (0..len).collect::<Vec<_>>());
    }

    #[test]
    fn matches_sequential_scan_as_a_multiset() {
        let config = ParallelConfig { max_workers: 3, ..ParallelConfig::default() };
        let len = 257;
        let mut parallel = parallel_scan(len, &config, |start, end| {
            (start..end).map(|i| i * i).collect::<Vec<_>>()
        });
        let mut sequential = sequential_scan(len, |start, end| {
            (start..end).map(|i| i * i).collect::<Vec<_>>()
        });
        parallel.sort_unstable();
        sequential.sort_unstable();
        assert_eq!(parallel, sequential);
    }

    #[test]
    fn empty_input_yields_empty_output() {
        let config = ParallelConfig::default();
        let result: Vec<usize> = parallel_scan(0, &config, |start, end| (start..end).collect());
        assert!(result.is_empty());
    }
}
