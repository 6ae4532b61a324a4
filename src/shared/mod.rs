pub mod json;
pub mod logging;

pub use json::{format_json, validate_json};
pub use logging::{append_session_log_line, now_secs, session_log_path};
