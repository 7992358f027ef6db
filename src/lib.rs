pub mod bench;
pub mod collector;
pub mod config;
pub mod latency;
pub mod sched;
pub mod sink;
pub mod source;
