pub mod addr;
pub mod cache;
pub mod config;
pub mod memory;
pub mod pattern;
pub mod plru;
pub mod set;
pub mod sim;
pub mod stat;
pub mod trace;
