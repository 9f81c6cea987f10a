//! Background Tasks Module
//!
//! Background work that runs alongside a cache manager.
//!
//! # Tasks
//! - Expiry Sweep: removes expired elements from every cache at a fixed interval

mod expiry;

pub use expiry::spawn_expiry_task;
