//! Bookkeeping of buffers currently owned outside the core allocator.
//!
//! Every non-empty [`CoreBuffer`](super::CoreBuffer) handed out is recorded here
//! with its capacity. Freeing checks the record out again, which turns a double
//! free, a free of foreign memory, or a tampered capacity into an error instead
//! of allocator corruption.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use super::BufferError;

static LIVE: Lazy<Mutex<HashMap<usize, u64>>> = Lazy::new(|| Mutex::new(HashMap::new()));

pub(super) fn register(data: *mut u8, capacity: u64) {
    LIVE.lock().insert(data as usize, capacity);
}

/// Check a buffer out of the ledger before its memory is released.
pub(super) fn release(data: *mut u8, capacity: u64) -> Result<(), BufferError> {
    let mut live = LIVE.lock();
    match live.get(&(data as usize)) {
        None => Err(BufferError::NotOwned {
            address: data as usize,
        }),
        Some(&recorded) if recorded != capacity => Err(BufferError::CapacityMismatch {
            recorded,
            claimed: capacity,
        }),
        Some(_) => {
            live.remove(&(data as usize));
            Ok(())
        }
    }
}

pub(super) fn is_live(data: *mut u8, capacity: u64) -> bool {
    LIVE.lock().get(&(data as usize)) == Some(&capacity)
}

/// Number of buffers currently handed out.
pub fn outstanding() -> usize {
    LIVE.lock().len()
}
