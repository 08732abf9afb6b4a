use super::poller::Interest;

/// Reactor-side callbacks of a registered resource.
///
/// The reactor invokes at most one of the four readiness callbacks per
/// registration per loop iteration, in the fixed order `acceptable` >
/// `connectable` > `readable` > `writable`. A registration that is ready
/// in both directions gets the higher-priority callback now and the other
/// on the next poll — readiness is level-triggered and the untouched
/// interest bit keeps it pending.
///
/// Callbacks run on the reactor thread and must not block.
pub trait EventHandler: Send + Sync {
    /// Called once, on the reactor thread, when the registration is bound
    /// to its token.
    fn bind(&self, token: usize);

    /// The interests this registration currently wants. Read by the
    /// reactor after every registration change and dispatched event.
    fn interest(&self) -> Interest;

    /// A pending connection can be accepted.
    fn acceptable(&self) {}

    /// An in-flight connect can be completed.
    fn connectable(&self) {}

    /// The descriptor has data to read.
    fn readable(&self) {}

    /// The descriptor can accept writes.
    fn writable(&self) {}

    /// The reactor is shutting down; release the resource and fail any
    /// suspended operations.
    fn close(&self);
}
