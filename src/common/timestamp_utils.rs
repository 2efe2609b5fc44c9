use chrono::{DateTime, Local, Utc};

pub const WALL_CLOCK_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Get current local timestamp as a formatted string
pub fn current_local_timestamp_str(format_str: &str) -> String {
    let now: DateTime<Local> = Local::now();
    now.format(format_str).to_string()
}

// UTC instant rendered in the operator's local time
pub fn format_wall_clock(at: &DateTime<Utc>) -> String {
    DateTime::<Local>::from(*at).format(WALL_CLOCK_FORMAT).to_string()
}
