pub(crate) mod common;
pub(crate) mod unix;

#[cfg(target_os = "linux")]
mod epoll;

#[cfg(target_os = "linux")]
pub(crate) type Poller = epoll::EpollPoller;

pub use common::Interest;
pub(crate) use common::PollWaker;
