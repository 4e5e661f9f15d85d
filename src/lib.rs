pub mod clock;
pub mod error;
pub mod inode;
pub mod mutator;
pub mod signal;
pub mod timestamp;
