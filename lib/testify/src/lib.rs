mod log;
pub mod random;
pub mod temp;
pub mod wait;

// re-export
pub use log::LogWriter;
pub use wait::{wait_for, wait_for_duration};
