//! Process-unique placeholder ids for optimistic entries.

use rand::Rng;
use std::sync::atomic::{AtomicU64, Ordering};

static COUNTER: AtomicU64 = AtomicU64::new(1);

/// Returns a new temp id: `temp-<counter>-<random hex>`.
///
/// The counter keeps ids unique within the process even for submits issued in
/// the same instant; the suffix keeps them from colliding across restarts.
pub fn next_temp_id() -> String {
    let sequence = COUNTER.fetch_add(1, Ordering::Relaxed);
    let suffix: u32 = rand::thread_rng().gen_range(0..0x0100_0000);
    format!("temp-{}-{:06x}", sequence, suffix)
}
