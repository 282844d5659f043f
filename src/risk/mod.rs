//! Best-effort position-risk monitoring of the master account.

mod poller;

pub use poller::PositionRiskPoller;
