//! Local-time stamps for log lines, chat messages and export file names.

use time::{format_description::FormatItem, macros::format_description, OffsetDateTime};

const LOG_FORMAT: &[FormatItem<'static>] =
    format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
const CHAT_FORMAT: &[FormatItem<'static>] = format_description!("[hour]:[minute]:[second]");
const FILE_FORMAT: &[FormatItem<'static>] =
    format_description!("[year][month][day]-[hour][minute][second]");

// Falls back to UTC when the local offset cannot be determined (e.g. multi-threaded on unix).
fn now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

fn stamp(format: &[FormatItem<'static>]) -> String {
    now().format(format).unwrap_or_else(|_| "now".into())
}

pub fn log_stamp() -> String {
    stamp(LOG_FORMAT)
}

pub fn chat_stamp() -> String {
    stamp(CHAT_FORMAT)
}

pub fn file_stamp() -> String {
    stamp(FILE_FORMAT)
}
