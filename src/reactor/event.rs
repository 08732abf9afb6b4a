/// A readiness event reported by the poller.
///
/// Produced once per ready registration per poll; the reactor turns it
/// into at most one handler callback.
pub(crate) struct Event {
    /// Slab token of the registration the event belongs to.
    pub(crate) token: usize,

    /// The descriptor is readable (or in an error state).
    pub(crate) readable: bool,

    /// The descriptor is writable (or in an error state).
    pub(crate) writable: bool,
}
