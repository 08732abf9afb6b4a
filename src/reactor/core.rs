use super::command::Command;
use super::event::Event;
use super::handler::EventHandler;
use super::poller::{PollWaker, Poller};
use super::timer::TimerEntry;
use crate::utils::Slab;

use std::collections::BinaryHeap;
use std::io;
use std::os::fd::RawFd;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::task::Waker;
use std::thread;
use std::time::Instant;

/// A readiness-multiplexing reactor.
///
/// Owns one background thread that polls the OS multiplexer and drives
/// every suspended I/O operation registered with it. Registrations arrive
/// through a multi-producer command queue that the thread drains before
/// each poll.
///
/// The reactor stops when [`close`](Reactor::close) shuts the multiplexer
/// down; every live registration is closed and every pending timer fires
/// on the way out, so no suspended task is left hanging.
pub struct Reactor {
    handle: ReactorHandle,
}

impl Reactor {
    /// Starts a reactor with a named polling thread.
    pub fn new(name: &str) -> io::Result<Reactor> {
        let poller = Poller::new()?;
        let waker = poller.waker();
        let (sender, receiver) = channel();

        let core = Core {
            receiver,
            poller,
            events: Vec::with_capacity(64),
            timers: BinaryHeap::new(),
            io: Slab::new(64),
        };

        thread::Builder::new()
            .name(name.to_string())
            .spawn(move || core.run())?;

        Ok(Reactor {
            handle: ReactorHandle { sender, waker },
        })
    }

    /// Returns a cloneable handle for registering resources.
    pub fn handle(&self) -> ReactorHandle {
        self.handle.clone()
    }

    /// Closes the multiplexer, terminating the polling thread.
    ///
    /// Idempotent. Registrations still alive are closed and their
    /// suspended operations fail instead of hanging.
    pub fn close(&self) {
        self.handle.send(Command::Shutdown);
    }
}

/// A handle to a running [`Reactor`].
#[derive(Clone)]
pub struct ReactorHandle {
    sender: Sender<Command>,
    waker: Arc<PollWaker>,
}

impl ReactorHandle {
    /// Registers a resource with the reactor.
    ///
    /// The registration is enqueued and the polling call woken; the
    /// reactor thread binds the handler to its token and applies the
    /// handler's current interest. Callable from any task.
    pub fn register(&self, fd: RawFd, handler: Arc<dyn EventHandler>) -> io::Result<()> {
        if self.send(Command::Register { fd, handler }) {
            Ok(())
        } else {
            Err(io::Error::other("reactor is closed"))
        }
    }

    /// Asks the reactor to re-read a registration's interest.
    pub(crate) fn refresh(&self, token: usize) {
        self.send(Command::Refresh { token });
    }

    /// Drops a registration. The descriptor is closed by its owner.
    pub(crate) fn deregister(&self, token: usize) {
        self.send(Command::Deregister { token });
    }

    /// Schedules a timer wake-up; returns false if the reactor is closed.
    pub(crate) fn set_timer(
        &self,
        deadline: Instant,
        waker: Waker,
        cancelled: Arc<AtomicBool>,
    ) -> bool {
        self.send(Command::SetTimer {
            deadline,
            waker,
            cancelled,
        })
    }

    fn send(&self, command: Command) -> bool {
        let delivered = self.sender.send(command).is_ok();
        self.waker.wake();
        delivered
    }
}

struct Registration {
    fd: RawFd,
    handler: Arc<dyn EventHandler>,
}

struct Core {
    receiver: Receiver<Command>,

    poller: Poller,
    events: Vec<Event>,

    timers: BinaryHeap<TimerEntry>,
    io: Slab<Registration>,
}

impl Core {
    fn run(mut self) {
        log::trace!("reactor loop started");

        loop {
            while let Ok(command) = self.receiver.try_recv() {
                match command {
                    Command::Register { fd, handler } => {
                        let token = self.io.insert(Registration {
                            fd,
                            handler: handler.clone(),
                        });
                        handler.bind(token);
                        self.poller.register(fd, token, handler.interest());
                    }

                    Command::Refresh { token } => {
                        if let Some(reg) = self.io.get(token) {
                            self.poller.reregister(reg.fd, token, reg.handler.interest());
                        }
                    }

                    Command::Deregister { token } => {
                        if self.io.contains(token) {
                            let reg = self.io.remove(token);
                            self.poller.deregister(reg.fd);
                        }
                    }

                    Command::SetTimer {
                        deadline,
                        waker,
                        cancelled,
                    } => {
                        self.timers.push(TimerEntry {
                            deadline,
                            waker,
                            cancelled,
                        });
                    }

                    Command::Shutdown => {
                        self.shutdown();
                        return;
                    }
                }
            }

            let timeout = self
                .timers
                .peek()
                .map(|t| t.deadline.saturating_duration_since(Instant::now()));

            if let Err(err) = self.poller.poll(&mut self.events, timeout) {
                log::error!("reactor poll failed: {err}");
                self.shutdown();
                return;
            }

            self.fire_timers();

            let events = std::mem::take(&mut self.events);
            for event in &events {
                self.dispatch(event);
            }
            self.events = events;
        }
    }

    fn fire_timers(&mut self) {
        let now = Instant::now();

        while let Some(timer) = self.timers.peek() {
            if timer.deadline > now {
                break;
            }

            let timer = self.timers.pop().unwrap();

            if timer.cancelled.load(Ordering::Acquire) {
                continue;
            }

            timer.waker.wake();
        }
    }

    /// Delivers at most one readiness callback for the event, in the
    /// fixed priority order, then re-applies the handler's interest.
    ///
    /// A panicking handler is logged and isolated; one misbehaving
    /// registration must not halt the reactor.
    fn dispatch(&mut self, event: &Event) {
        let Some(reg) = self.io.get(event.token) else {
            // Deregistered while the event was in flight.
            return;
        };

        let fd = reg.fd;
        let handler = reg.handler.clone();
        let interest = handler.interest();

        let outcome = catch_unwind(AssertUnwindSafe(|| {
            if event.readable && interest.accept {
                handler.acceptable();
            } else if (event.writable || event.readable) && interest.connect {
                handler.connectable();
            } else if event.readable && interest.read {
                handler.readable();
            } else if event.writable && interest.write {
                handler.writable();
            } else {
                return false;
            }
            true
        }));

        match outcome {
            Err(_) => {
                log::error!("reactor handler for fd {fd} panicked; continuing");
            }
            Ok(false) => {
                // Unsolicited event: an error or hang-up on a descriptor
                // with no armed interest. Level-triggered epoll would
                // report it forever, so drop the descriptor from the
                // poller; the next interest refresh re-adds it.
                self.poller.deregister(fd);
            }
            Ok(true) => {
                if self.io.contains(event.token) {
                    self.poller.reregister(fd, event.token, handler.interest());
                }
            }
        }
    }

    fn shutdown(mut self) {
        log::trace!("reactor shutting down");

        for reg in self.io.drain() {
            let outcome = catch_unwind(AssertUnwindSafe(|| reg.handler.close()));
            if outcome.is_err() {
                log::error!("handler close for fd {} panicked during shutdown", reg.fd);
            }
        }

        for timer in self.timers.drain() {
            if !timer.cancelled.load(Ordering::Acquire) {
                timer.waker.wake();
            }
        }
    }
}

impl std::fmt::Debug for Reactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reactor").finish_non_exhaustive()
    }
}
