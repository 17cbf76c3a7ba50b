pub mod debug_log;
pub mod logging;
