// =============================================================================
// Async Batch Fetcher (C6)
// =============================================================================
//
// One-shot batch variant of the teacher's `market_data::candle_buffer`
// run-loop: instead of an indefinitely running stream, `batch_prices`
// partitions a symbol list into rate-limiter-sized chunks, fetches each
// chunk sequentially through the shared `RateLimiter`, and folds successes
// and failures into a single `BatchResult` (spec.md §4.6). A per-symbol
// failure is data, not an error — only session misuse raises.
// =============================================================================

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{instrument, warn};

use crate::broker::rest::RestClient;
use crate::types::BatchResult;

const INTER_CHUNK_SLEEP: Duration = Duration::from_millis(1200);

pub struct BatchFetcher {
    rest: Arc<RestClient>,
    chunk_size: usize,
}

impl BatchFetcher {
    /// Chunk size defaults to the rest client's rate limiter capacity N
    /// (spec.md §4.6 step 1) — one chunk per rolling window.
    pub fn new(rest: Arc<RestClient>) -> Self {
        let chunk_size = rest.rate_limit_capacity();
        Self { rest, chunk_size }
    }

    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk_size must be > 0");
        self.chunk_size = chunk_size;
        self
    }

    /// Fetch current prices for every code in `codes`. Every input code
    /// appears in exactly one of `successful`/`failed` (spec.md §8 property
    /// 5); this method itself never returns `Err` for per-symbol failures.
    #[instrument(skip(self, codes), fields(count = codes.len()))]
    pub async fn batch_prices(&self, codes: &[String]) -> BatchResult {
        let start = Instant::now();
        let mut result = BatchResult::default();

        for (chunk_idx, chunk) in codes.chunks(self.chunk_size).enumerate() {
            let chunk_start = Instant::now();

            for code in chunk {
                match self.rest.get_current_price(code).await {
                    Ok(price) => {
                        result.successful.insert(code.clone(), price);
                    }
                    Err(e) => {
                        warn!(code = %code, error = %e, "batch price fetch failed for symbol");
                        result.failed.push((code.clone(), e.to_string()));
                    }
                }
            }

            let is_last_chunk = (chunk_idx + 1) * self.chunk_size >= codes.len();
            if !is_last_chunk {
                let elapsed = chunk_start.elapsed();
                if elapsed < INTER_CHUNK_SLEEP {
                    sleep(INTER_CHUNK_SLEEP - elapsed).await;
                }
            }
        }

        result.total_time_ms = start.elapsed().as_millis() as u64;
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunking_covers_every_code_exactly_once() {
        let chunk_size = 15;
        let codes: Vec<String> = (0..37).map(|i| format!("{i:06}")).collect();
        let chunks: Vec<&[String]> = codes.chunks(chunk_size).collect();
        let total: usize = chunks.iter().map(|c| c.len()).sum();
        assert_eq!(total, codes.len());
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.last().unwrap().len(), 37 % chunk_size);
    }

    #[test]
    fn empty_input_produces_empty_result() {
        let result = BatchResult::default();
        assert_eq!(result.success_count() + result.failure_count(), 0);
        assert_eq!(result.success_rate(), 1.0);
    }
}
