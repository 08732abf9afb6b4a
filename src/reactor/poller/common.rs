use std::os::fd::RawFd;

/// Readiness interests a registration can ask for.
///
/// The four operations mirror what a socket can be waiting on: `accept`
/// and `read` map to read-readiness of the descriptor, `connect` and
/// `write` to write-readiness. Keeping them separate lets the reactor
/// dispatch exactly one kind of event per registration per iteration.
#[derive(Clone, Copy, Default)]
pub struct Interest {
    pub accept: bool,
    pub connect: bool,
    pub read: bool,
    pub write: bool,
}

impl Interest {
    pub const NONE: Interest = Interest {
        accept: false,
        connect: false,
        read: false,
        write: false,
    };

    pub(crate) fn wants_readable(&self) -> bool {
        self.accept || self.read
    }

    pub(crate) fn wants_writable(&self) -> bool {
        self.connect || self.write
    }
}

/// Wake handle for a blocked poll call.
///
/// Wraps the eventfd the poller registers for itself. The descriptor is
/// closed when the last holder drops the handle, never earlier: reactor
/// handles may still wake a poller that already shut down, and the write
/// must not land on a recycled descriptor.
pub(crate) struct PollWaker(pub(crate) RawFd);

unsafe impl Send for PollWaker {}
unsafe impl Sync for PollWaker {}

impl Drop for PollWaker {
    fn drop(&mut self) {
        unsafe {
            libc::close(self.0);
        }
    }
}
