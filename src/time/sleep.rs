use crate::reactor::{self, ReactorHandle};

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

/// Creates a future that completes after the given duration, timed by the
/// default reactor.
pub fn sleep(duration: Duration) -> Sleep {
    sleep_with(&reactor::global().handle(), duration)
}

/// Creates a sleep future timed by the given reactor.
pub fn sleep_with(reactor: &ReactorHandle, duration: Duration) -> Sleep {
    Sleep {
        reactor: reactor.clone(),
        deadline: Instant::now() + duration,
        registered: false,
        cancelled: Arc::new(AtomicBool::new(false)),
    }
}

/// A future that completes once its deadline is reached.
///
/// The timer is registered with the reactor on first poll and cancelled
/// if the future is dropped before completing, so an abandoned sleep
/// never wakes its task. Sleeping on a closed reactor completes
/// immediately.
pub struct Sleep {
    reactor: ReactorHandle,
    deadline: Instant,
    registered: bool,
    cancelled: Arc<AtomicBool>,
}

impl Future for Sleep {
    type Output = ();

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();

        if Instant::now() >= this.deadline {
            return Poll::Ready(());
        }

        if !this.registered {
            this.registered = true;

            let scheduled =
                this.reactor
                    .set_timer(this.deadline, cx.waker().clone(), this.cancelled.clone());

            if !scheduled {
                return Poll::Ready(());
            }
        }

        Poll::Pending
    }
}

impl Drop for Sleep {
    fn drop(&mut self) {
        self.cancelled.store(true, Ordering::Release);
    }
}
