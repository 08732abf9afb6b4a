use std::cell::UnsafeCell;
use std::future::Future;
use std::ops::{Deref, DerefMut};
use std::pin::Pin;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll, Waker};

/// An asynchronous mutex.
///
/// Unlike `std::sync::Mutex`, a task that cannot acquire the lock is
/// suspended and woken when the mutex becomes available; no thread is ever
/// blocked. The guard may be held across suspension points.
pub struct Mutex<T> {
    /// Whether the mutex is currently held.
    locked: AtomicBool,

    /// Wakers of tasks waiting to acquire the mutex.
    ///
    /// Protected by a standard blocking mutex; manipulating the list is
    /// short and infrequent.
    waiters: StdMutex<Vec<Waker>>,

    /// The protected value.
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    /// Creates a new mutex wrapping the given value.
    pub fn new(value: T) -> Mutex<T> {
        Self {
            locked: AtomicBool::new(false),
            waiters: StdMutex::new(Vec::new()),
            data: UnsafeCell::new(value),
        }
    }

    /// Suspends until the mutex is acquired.
    pub fn lock(&self) -> LockFuture<'_, T> {
        LockFuture { mutex: self }
    }

    /// Attempts to acquire the mutex without suspending.
    ///
    /// Returns `None` if the lock is currently held.
    pub fn try_lock(&self) -> Option<MutexGuard<'_, T>> {
        if !self.locked.swap(true, Ordering::Acquire) {
            Some(MutexGuard { mutex: self })
        } else {
            None
        }
    }
}

/// Future returned by [`Mutex::lock`].
pub struct LockFuture<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Future for LockFuture<'a, T> {
    type Output = MutexGuard<'a, T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        if !self.mutex.locked.swap(true, Ordering::Acquire) {
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        self.mutex.waiters.lock().unwrap().push(cx.waker().clone());

        // The holder may have released between the failed attempt and the
        // waker registration; retry once so the wake-up cannot be lost. A
        // later spurious wake of the queued waker is harmless.
        if !self.mutex.locked.swap(true, Ordering::Acquire) {
            return Poll::Ready(MutexGuard { mutex: self.mutex });
        }

        Poll::Pending
    }
}

/// Guard returned by [`Mutex::lock`] and [`Mutex::try_lock`].
///
/// Releases the mutex when dropped.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
}

impl<'a, T> Drop for MutexGuard<'a, T> {
    fn drop(&mut self) {
        self.mutex.locked.store(false, Ordering::Release);

        if let Some(waker) = self.mutex.waiters.lock().unwrap().pop() {
            waker.wake();
        }
    }
}

impl<'a, T> Deref for MutexGuard<'a, T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        unsafe { &*self.mutex.data.get() }
    }
}

impl<'a, T> DerefMut for MutexGuard<'a, T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        unsafe { &mut *self.mutex.data.get() }
    }
}

#[cfg(test)]
mod tests {
    use super::Mutex;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn uncontended_lock_and_try_lock() {
        let mutex = Mutex::new(1);

        let guard = mutex.try_lock().expect("mutex should be free");
        assert!(mutex.try_lock().is_none());
        drop(guard);

        let guard = futures::executor::block_on(mutex.lock());
        assert_eq!(*guard, 1);
    }

    #[test]
    fn contended_lock_wakes_waiter() {
        let mutex = Arc::new(Mutex::new(0u32));
        let held = mutex.try_lock().expect("mutex should be free");

        let contender = {
            let mutex = mutex.clone();
            thread::spawn(move || {
                futures::executor::block_on(async {
                    *mutex.lock().await += 1;
                })
            })
        };

        thread::sleep(std::time::Duration::from_millis(20));
        drop(held);
        contender.join().unwrap();

        assert_eq!(*mutex.try_lock().unwrap(), 1);
    }
}
