//! Pure presentation of entries: the relative timestamp label and the
//! ownership gate for edit/delete. Used by the shell and the home page.

use std::fmt::Display;

use chrono::{DateTime, Datelike, TimeZone, Utc};

use crate::models::Entry;

const MINUTE: i64 = 60;
const HOUR: i64 = 60 * MINUTE;
const DAY: i64 = 24 * HOUR;

/// What a list row shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryView {
    pub id: Option<String>,
    pub summary: String,
    pub label: String,
    pub user: Option<String>,
    /// Edit and delete are offered.
    pub controls: bool,
}

/// Label for an entry dated `date` as seen at `now`, in `now`'s time zone.
pub fn timestamp_label<Tz>(date: &DateTime<Utc>, now: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    let delta = (now.with_timezone(&Utc) - *date).num_seconds();

    if delta <= MINUTE {
        return "less than a minute ago".to_string();
    }
    if delta < HOUR {
        return format!("{} minutes ago", delta / MINUTE);
    }

    let local = date.with_timezone(&now.timezone());
    if delta < DAY && local.date_naive() == now.date_naive() {
        local.format("%I:%M %p").to_string()
    } else if local.year() == now.year() {
        local.format("%b %d at %I:%M %p").to_string()
    } else {
        local.format("%b %d %Y at %I:%M %p").to_string()
    }
}

pub fn render_entry<Tz>(entry: &Entry, now: &DateTime<Tz>, viewer: Option<&str>) -> EntryView
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    // Entries without a date have only just been written.
    let date = entry.date.unwrap_or_else(|| now.with_timezone(&Utc));

    EntryView {
        id: entry.id.clone(),
        summary: entry.summary.clone(),
        label: timestamp_label(&date, now),
        user: entry.user.clone(),
        controls: entry.is_owned_by(viewer),
    }
}
