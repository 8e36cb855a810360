//! Shared-state wrapper used for every field the network tasks write and
//! application code reads.
//!
//! [`Guarded`] is a thin layer over [`std::sync::RwLock`]: reads hand out a
//! copy taken under the shared lock, writes run a closure under the
//! exclusive lock. Closures keep the lock scope explicit, so a property
//! parser can apply a whole status line in one write and readers never see
//! half of it.
//!
//! Lock poisoning is ignored: a panic inside another writer leaves the
//! value in whatever state the closure reached, and later access proceeds.

use std::fmt;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// A value behind a single-writer / multi-reader lock.
pub struct Guarded<T> {
    inner: RwLock<T>,
}

impl<T> Guarded<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: RwLock::new(value),
        }
    }

    /// Run `f` with shared access to the value.
    pub fn read<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.read_guard())
    }

    /// Run `f` with exclusive access to the value.
    pub fn write<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        f(&mut self.write_guard())
    }

    /// Replace the value, returning the previous one.
    pub fn replace(&self, value: T) -> T {
        std::mem::replace(&mut *self.write_guard(), value)
    }

    fn read_guard(&self) -> RwLockReadGuard<'_, T> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_guard(&self) -> RwLockWriteGuard<'_, T> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl<T: Clone> Guarded<T> {
    /// A copy of the current value.
    pub fn get(&self) -> T {
        self.read_guard().clone()
    }

    /// Overwrite the value.
    pub fn set(&self, value: T) {
        *self.write_guard() = value;
    }
}

impl<T: Default> Default for Guarded<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: fmt::Debug> fmt::Debug for Guarded<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Guarded").field(&*self.read_guard()).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn get_returns_copy() {
        let g = Guarded::new(String::from("a"));
        let copy = g.get();
        g.set("b".into());
        assert_eq!(copy, "a");
        assert_eq!(g.get(), "b");
    }

    #[test]
    fn write_closure_returns_value() {
        let g = Guarded::new(vec![1, 2]);
        let len = g.write(|v| {
            v.push(3);
            v.len()
        });
        assert_eq!(len, 3);
        assert_eq!(g.read(|v| v[2]), 3);
    }

    #[test]
    fn replace_returns_previous() {
        let g = Guarded::new(5u32);
        assert_eq!(g.replace(6), 5);
        assert_eq!(g.get(), 6);
    }

    #[test]
    fn poisoned_lock_is_recovered() {
        let g = Arc::new(Guarded::new(1u32));
        let g2 = Arc::clone(&g);
        let _ = std::thread::spawn(move || {
            g2.write(|v| {
                *v = 2;
                panic!("writer panicked");
            })
        })
        .join();
        assert_eq!(g.get(), 2);
        g.set(3);
        assert_eq!(g.get(), 3);
    }

    #[test]
    fn concurrent_writers_do_not_tear() {
        let g = Arc::new(Guarded::new((0u64, 0u64)));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let g = Arc::clone(&g);
                std::thread::spawn(move || {
                    for _ in 0..1000 {
                        g.write(|(a, b)| {
                            *a += 1;
                            *b += 1;
                        });
                        let (a, b) = g.get();
                        assert_eq!(a, b);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(g.get(), (4000, 4000));
    }
}
