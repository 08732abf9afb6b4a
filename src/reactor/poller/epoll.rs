//! Linux `epoll` poller backend.
//!
//! Owns the epoll instance, an internal `eventfd` wake source, and a
//! reusable event buffer. Readiness is level-triggered: anything a
//! registration stays interested in is re-reported on every poll until
//! the condition clears, which is what the endpoints' one-event-per-turn
//! dispatch relies on.

use super::common::{Interest, PollWaker};
use crate::reactor::event::Event;

use libc::{
    EPOLL_CLOEXEC, EPOLL_CTL_ADD, EPOLL_CTL_DEL, EPOLL_CTL_MOD, EPOLLERR, EPOLLHUP, EPOLLIN,
    EPOLLOUT, epoll_create1, epoll_ctl, epoll_event, epoll_wait,
};
use std::io;
use std::os::fd::RawFd;
use std::sync::Arc;
use std::time::Duration;

/// Reserved token for the wake-up eventfd.
///
/// Must never collide with a slab token; `u64::MAX` guarantees that.
const WAKE_TOKEN: u64 = u64::MAX;

pub(crate) struct EpollPoller {
    epoll: RawFd,
    events: Vec<epoll_event>,
    waker: Arc<PollWaker>,
}

unsafe impl Send for EpollPoller {}

impl PollWaker {
    /// Interrupts a blocking `epoll_wait` by writing to the eventfd.
    pub(crate) fn wake(&self) {
        let buf: u64 = 1;
        unsafe {
            libc::write(self.0, &buf as *const _ as *const _, 8);
        }
    }
}

impl EpollPoller {
    pub(crate) fn new() -> io::Result<Self> {
        let epoll = unsafe { epoll_create1(EPOLL_CLOEXEC) };
        if epoll < 0 {
            return Err(io::Error::last_os_error());
        }

        let eventfd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if eventfd < 0 {
            let err = io::Error::last_os_error();
            unsafe { libc::close(epoll) };
            return Err(err);
        }

        let mut event = epoll_event {
            events: EPOLLIN as u32,
            u64: WAKE_TOKEN,
        };

        let rc = unsafe { epoll_ctl(epoll, EPOLL_CTL_ADD, eventfd, &mut event) };
        if rc != 0 {
            let err = io::Error::last_os_error();
            unsafe {
                libc::close(eventfd);
                libc::close(epoll);
            }
            return Err(err);
        }

        Ok(Self {
            epoll,
            events: Vec::with_capacity(64),
            waker: Arc::new(PollWaker(eventfd)),
        })
    }

    pub(crate) fn waker(&self) -> Arc<PollWaker> {
        self.waker.clone()
    }

    fn flags(interest: Interest) -> u32 {
        let mut flags = 0;

        if interest.wants_readable() {
            flags |= EPOLLIN;
        }
        if interest.wants_writable() {
            flags |= EPOLLOUT;
        }

        flags as u32
    }

    pub(crate) fn register(&self, fd: RawFd, token: usize, interest: Interest) {
        let mut event = epoll_event {
            events: Self::flags(interest),
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event) };
        if rc != 0 {
            log::warn!(
                "failed to register fd {fd} with epoll: {}",
                io::Error::last_os_error()
            );
        }
    }

    /// Updates the interest flags of an already registered descriptor.
    ///
    /// A descriptor the poller dropped earlier (see
    /// [`deregister`](Self::deregister)) is re-added; one that was closed
    /// concurrently is silently skipped, its epoll entry disappeared with
    /// the descriptor.
    pub(crate) fn reregister(&self, fd: RawFd, token: usize, interest: Interest) {
        let mut event = epoll_event {
            events: Self::flags(interest),
            u64: token as u64,
        };

        let rc = unsafe { epoll_ctl(self.epoll, EPOLL_CTL_MOD, fd, &mut event) };
        if rc != 0 && io::Error::last_os_error().raw_os_error() == Some(libc::ENOENT) {
            unsafe {
                epoll_ctl(self.epoll, EPOLL_CTL_ADD, fd, &mut event);
            }
        }
    }

    pub(crate) fn deregister(&self, fd: RawFd) {
        unsafe {
            epoll_ctl(self.epoll, EPOLL_CTL_DEL, fd, std::ptr::null_mut());
        }
    }

    /// Blocks until at least one descriptor is ready, the wake event
    /// fires, or the optional timeout expires.
    pub(crate) fn poll(
        &mut self,
        events: &mut Vec<Event>,
        timeout: Option<Duration>,
    ) -> io::Result<()> {
        let timeout_ms = timeout
            .map(|t| i32::try_from(t.as_millis()).unwrap_or(i32::MAX))
            .unwrap_or(-1);

        unsafe {
            self.events.set_len(0);
        }

        let n = unsafe {
            epoll_wait(
                self.epoll,
                self.events.as_mut_ptr(),
                self.events.capacity() as i32,
                timeout_ms,
            )
        };

        if n < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                return Ok(());
            }
            return Err(err);
        }

        unsafe {
            self.events.set_len(n as usize);
        }

        events.clear();

        for ev in &self.events {
            if ev.u64 == WAKE_TOKEN {
                let mut buf = 0u64;
                unsafe {
                    libc::read(self.waker.0, &mut buf as *mut _ as *mut _, 8);
                }
                continue;
            }

            let token = ev.u64 as usize;

            let readable = ev.events & ((EPOLLIN | EPOLLERR | EPOLLHUP) as u32) != 0;
            let writable = ev.events & ((EPOLLOUT | EPOLLERR | EPOLLHUP) as u32) != 0;

            if let Some(e) = events.iter_mut().find(|e| e.token == token) {
                e.readable |= readable;
                e.writable |= writable;
            } else {
                events.push(Event {
                    token,
                    readable,
                    writable,
                });
            }
        }

        Ok(())
    }

}

impl Drop for EpollPoller {
    /// Closes the epoll instance. The wake eventfd is owned by the
    /// shared [`PollWaker`] and closes with its last handle.
    fn drop(&mut self) {
        unsafe {
            libc::close(self.epoll);
        }
    }
}
