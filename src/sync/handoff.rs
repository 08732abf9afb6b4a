use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Condvar, Mutex};
use std::task::{Context, Poll, Waker};

/// A small bounded hand-off queue between one blocking producer and one
/// suspending consumer.
///
/// The producer side is the reactor thread, which may block on a full
/// queue until the consumer catches up; the consumer side is an async
/// task. Closing the queue unblocks both sides: pending sends fail, and
/// the consumer drains buffered values before observing the end.
pub(crate) struct Handoff<T> {
    state: Mutex<State<T>>,
    producer: Condvar,
}

struct State<T> {
    queue: VecDeque<T>,
    capacity: usize,
    closed: bool,
    consumer: Option<Waker>,
}

impl<T> Handoff<T> {
    pub(crate) fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "handoff capacity must be > 0");

        Self {
            state: Mutex::new(State {
                queue: VecDeque::with_capacity(capacity),
                capacity,
                closed: false,
                consumer: None,
            }),
            producer: Condvar::new(),
        }
    }

    /// Delivers a value to the consumer, blocking while the queue is full.
    ///
    /// Returns the value back if the queue was closed before it could be
    /// delivered.
    pub(crate) fn send(&self, value: T) -> Result<(), T> {
        let mut state = self.state.lock().unwrap();

        loop {
            if state.closed {
                return Err(value);
            }

            if state.queue.len() < state.capacity {
                state.queue.push_back(value);

                if let Some(waker) = state.consumer.take() {
                    drop(state);
                    waker.wake();
                }

                return Ok(());
            }

            state = self.producer.wait(state).unwrap();
        }
    }

    /// Suspends until a value is available.
    ///
    /// Resolves to `None` once the queue is closed and drained.
    pub(crate) fn recv(&self) -> Recv<'_, T> {
        Recv { handoff: self }
    }

    /// Closes the queue.
    ///
    /// Blocked producers give up, the consumer is woken, and values
    /// already queued remain receivable.
    pub(crate) fn close(&self) {
        let mut state = self.state.lock().unwrap();

        if state.closed {
            return;
        }
        state.closed = true;

        let waker = state.consumer.take();
        drop(state);

        self.producer.notify_all();
        if let Some(waker) = waker {
            waker.wake();
        }
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }
}

pub(crate) struct Recv<'a, T> {
    handoff: &'a Handoff<T>,
}

impl<'a, T> Future for Recv<'a, T> {
    type Output = Option<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let mut state = self.handoff.state.lock().unwrap();

        if let Some(value) = state.queue.pop_front() {
            self.handoff.producer.notify_one();
            return Poll::Ready(Some(value));
        }

        if state.closed {
            return Poll::Ready(None);
        }

        state.consumer = Some(cx.waker().clone());
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::Handoff;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn delivers_in_order_and_ends_on_close() {
        let handoff = Arc::new(Handoff::new(2));

        let producer = {
            let handoff = handoff.clone();
            thread::spawn(move || {
                for i in 0..5 {
                    handoff.send(i).unwrap();
                }
                handoff.close();
            })
        };

        let received = futures::executor::block_on(async {
            let mut values = Vec::new();
            while let Some(v) = handoff.recv().await {
                values.push(v);
            }
            values
        });

        producer.join().unwrap();
        assert_eq!(received, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn send_after_close_returns_value() {
        let handoff = Handoff::new(1);
        handoff.close();
        assert_eq!(handoff.send(7), Err(7));
    }
}
