//! Age-based admission of source files.

use crate::models::RemoteFile;
use chrono::{DateTime, Datelike, TimeDelta, TimeZone, Utc};

/// Decides whether `file` is old enough to be archived under `max_age_days`.
///
/// - `max_age_days > 0`: admitted iff `now - max_age_days days` is not
///   earlier than the file's modification time.
/// - `max_age_days < 0`: the cutoff lies in the future, so every file not
///   dated after it is admitted.
/// - `max_age_days == 0`: admitted iff the file was modified in the same
///   calendar month as `now`, whatever the year. The month is taken in the
///   time zone of `now`.
///
/// Pure: the result depends only on the arguments.
#[must_use]
pub fn admits<Tz: TimeZone>(file: &RemoteFile, now: &DateTime<Tz>, max_age_days: i64) -> bool {
    if max_age_days == 0 {
        return file.last_modified.with_timezone(&now.timezone()).month() == now.month();
    }

    let cutoff = TimeDelta::try_days(max_age_days)
        .and_then(|age| now.clone().checked_sub_signed(age))
        .map(|cutoff| cutoff.with_timezone(&Utc));

    // Out-of-range cutoffs sit before or after every representable timestamp.
    cutoff.map_or(max_age_days < 0, |cutoff| cutoff >= file.last_modified)
}
