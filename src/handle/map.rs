//! Concurrent handle-to-object table.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use super::{Handle, HandleError};
use crate::logging::trace;

/// Table mapping [`Handle`]s to stored values.
///
/// The counter belongs to the table rather than the process, so separate tables
/// (one per object or callback-interface type) issue independent handle
/// sequences. It starts at 1 and never resets; a removed handle is never issued
/// again.
///
/// # Example
///
/// ```ignore
/// use ffi_contract::HandleMap;
///
/// let map = HandleMap::new("counters");
/// let handle = map.insert(42u32)?;
/// assert_eq!(map.get(handle)?, 42);
/// assert_eq!(map.remove(handle)?, 42);
/// assert!(map.get(handle).is_err());
/// ```
pub struct HandleMap<T> {
    name: &'static str,
    counter: AtomicU64,
    entries: Mutex<HashMap<u64, T>>,
}

impl<T> HandleMap<T> {
    /// Create an empty table. `name` appears in error messages and logs.
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            counter: AtomicU64::new(1),
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Store `value` and return a freshly issued handle for it.
    pub fn insert(&self, value: T) -> Result<Handle, HandleError> {
        let handle = Handle::from_raw(self.counter.fetch_add(1, Ordering::Relaxed));
        if !handle.is_valid() {
            return Err(HandleError::Exhausted { table: self.name });
        }
        self.entries.lock().insert(handle.as_raw(), value);
        trace!(table = self.name, handle = handle.as_raw(), "handle inserted");
        Ok(handle)
    }

    /// Take the value out of the table, invalidating the handle.
    pub fn remove(&self, handle: Handle) -> Result<T, HandleError> {
        let removed = self.entries.lock().remove(&handle.as_raw());
        trace!(table = self.name, handle = handle.as_raw(), found = removed.is_some(), "handle removed");
        removed.ok_or(HandleError::InvalidHandle {
            table: self.name,
            op: "remove",
            handle,
        })
    }

    /// Run `f` against the stored value without taking it out.
    pub fn with<R>(&self, handle: Handle, f: impl FnOnce(&T) -> R) -> Result<R, HandleError> {
        let entries = self.entries.lock();
        entries
            .get(&handle.as_raw())
            .map(f)
            .ok_or(HandleError::InvalidHandle {
                table: self.name,
                op: "get",
                handle,
            })
    }

    pub fn contains(&self, handle: Handle) -> bool {
        self.entries.lock().contains_key(&handle.as_raw())
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> HandleMap<T> {
    /// Look up a handle, returning a clone of the stored value.
    pub fn get(&self, handle: Handle) -> Result<T, HandleError> {
        self.with(handle, T::clone)
    }
}

impl<T: ?Sized> HandleMap<Arc<T>> {
    /// Issue a second handle to the same object.
    ///
    /// Each handle is released independently; the object lives until the last
    /// one is removed.
    pub fn clone_handle(&self, handle: Handle) -> Result<Handle, HandleError> {
        let object = self.get(handle)?;
        self.insert(object)
    }
}

impl<T> std::fmt::Debug for HandleMap<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleMap")
            .field("name", &self.name)
            .field("next", &self.counter.load(Ordering::Relaxed))
            .field("len", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handles_start_at_one() {
        let map = HandleMap::new("test");
        assert_eq!(map.insert("a").unwrap(), Handle::from_raw(1));
        assert_eq!(map.insert("b").unwrap(), Handle::from_raw(2));
        assert_eq!(map.len(), 2);
    }

    #[test]
    fn test_remove_invalidates() {
        let map = HandleMap::new("test");
        let h = map.insert(10u8).unwrap();
        assert_eq!(map.remove(h).unwrap(), 10);
        assert!(matches!(
            map.get(h),
            Err(HandleError::InvalidHandle { op: "get", .. })
        ));
        assert!(matches!(
            map.remove(h),
            Err(HandleError::InvalidHandle { op: "remove", .. })
        ));
        // Not reissued.
        assert_ne!(map.insert(11u8).unwrap(), h);
    }

    #[test]
    fn test_null_handle_never_resolves() {
        let map = HandleMap::new("test");
        map.insert(()).unwrap();
        assert!(map.get(Handle::NULL).is_err());
    }

    #[test]
    fn test_tables_are_independent() {
        let a = HandleMap::new("a");
        let b = HandleMap::new("b");
        let ha = a.insert(1).unwrap();
        let hb = b.insert(2).unwrap();
        assert_eq!(ha, hb);
        assert_eq!(a.get(ha).unwrap(), 1);
        assert_eq!(b.get(hb).unwrap(), 2);
    }

    #[test]
    fn test_clone_handle() {
        let map = HandleMap::new("objects");
        let object = Arc::new(String::from("shared"));
        let first = map.insert(object.clone()).unwrap();
        let second = map.clone_handle(first).unwrap();
        assert_ne!(first, second);
        assert_eq!(Arc::strong_count(&object), 3);

        drop(map.remove(first).unwrap());
        assert_eq!(*map.get(second).unwrap(), "shared");
        drop(map.remove(second).unwrap());
        assert_eq!(Arc::strong_count(&object), 1);
    }
}
