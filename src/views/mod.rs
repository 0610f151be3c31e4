pub mod live_ops;
pub mod tracking;
