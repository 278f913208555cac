//! Formatting helpers for text shown in the chat.

use chrono::{Local, TimeZone};

/// File size as `0.00KB`, or `0.00MB` above 1024 KB.
pub fn byte_to_string(bytes: u64) -> String {
    let kb = bytes as f64 / 1024.0;

    if kb > 1024.0 {
        format!("{:.2}MB", kb / 1024.0)
    } else {
        format!("{:.2}KB", kb)
    }
}

/// Time elapsed between two unix millis values as `N days, HH:MM:SS`.
pub fn how_long_from_now(then: i64, now: i64) -> String {
    if then == 0 {
        return "0 days, 00:00:00".to_string();
    }

    let total = (now - then).max(0) / 1000;
    let days = total / 86_400;
    let hours = (total % 86_400) / 3_600;
    let minutes = (total % 3_600) / 60;
    let seconds = total % 60;

    format!("{days} days, {hours:02}:{minutes:02}:{seconds:02}")
}

/// Timestamp shown in front of every chat line.
pub fn clock() -> String {
    Local::now().format("[%H:%M:%S]").to_string()
}

/// When a topic was set, e.g. `13:45:05, 22. Aug. 13`.
pub fn topic_time(millis: i64) -> String {
    match Local.timestamp_millis_opt(millis).single() {
        Some(time) => time.format("%H:%M:%S, %d. %b. %y").to_string(),
        None => String::new(),
    }
}

/// Today's date, e.g. `Monday, 19 October 2026`.
pub fn today() -> String {
    Local::now().format("%A, %-d %B %Y").to_string()
}
