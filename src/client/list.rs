use chrono::{DateTime, Utc};

use super::service::{EntryQuery, EntryService, SortOrder};
use super::ClientError;
use crate::models::Entry;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// Start over with the newest entries.
    Reset,
    /// Next page below what is already shown.
    More,
    /// Entries newer than the latest one seen.
    Newer,
}

/// A fetch in flight. Carries the query to send and the generation it was
/// issued under.
#[derive(Debug, Clone)]
pub struct FetchTicket {
    mode: FetchMode,
    generation: u64,
    query: EntryQuery,
}

impl FetchTicket {
    pub fn mode(&self) -> FetchMode {
        self.mode
    }

    pub fn query(&self) -> &EntryQuery {
        &self.query
    }
}

/// Pagination state of the entry list.
///
/// `total` counts the entries currently shown and doubles as the skip offset
/// for the next page. Every reset starts a new generation; responses to
/// tickets from an older generation are dropped.
#[derive(Debug, Default)]
pub struct ListController {
    entries: Vec<Entry>,
    total: u64,
    latest: Option<DateTime<Utc>>,
    generation: u64,
}

impl ListController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn latest(&self) -> Option<DateTime<Utc>> {
        self.latest
    }

    pub fn begin(&mut self, mode: FetchMode, now: DateTime<Utc>) -> FetchTicket {
        let (mode, query) = match (mode, self.latest) {
            (FetchMode::Newer, Some(latest)) => (mode, EntryQuery::date_after(&latest).skip(0)),
            (FetchMode::More, _) => (mode, EntryQuery::date_before(&now).skip(self.total)),
            // Polling with nothing seen yet is a fresh load.
            (FetchMode::Reset | FetchMode::Newer, _) => {
                self.entries.clear();
                self.total = 0;
                self.latest = None;
                self.generation += 1;
                (FetchMode::Reset, EntryQuery::date_before(&now).skip(0))
            }
        };

        FetchTicket {
            mode,
            generation: self.generation,
            query: query.sort("_date", SortOrder::Descending),
        }
    }

    /// Merge a response into the list. Returns `None` when the ticket was
    /// overtaken by a reset.
    pub fn apply(&mut self, ticket: FetchTicket, entries: Vec<Entry>) -> Option<usize> {
        if ticket.generation != self.generation {
            tracing::debug!(
                ticket = ticket.generation,
                current = self.generation,
                "discarding stale entry page"
            );
            return None;
        }

        let count = entries.len();
        for (i, entry) in entries.into_iter().enumerate() {
            self.observe(&entry);
            match ticket.mode {
                FetchMode::Newer => self.entries.insert(i, entry),
                FetchMode::Reset | FetchMode::More => self.entries.push(entry),
            }
            self.total += 1;
        }
        Some(count)
    }

    pub async fn populate(
        &mut self,
        service: &EntryService,
        mode: FetchMode,
        now: DateTime<Utc>,
    ) -> Result<usize, ClientError> {
        let ticket = self.begin(mode, now);
        let entries = service.get(ticket.query()).await?;
        Ok(self.apply(ticket, entries).unwrap_or(0))
    }

    /// Put a freshly created entry on top without asking the service.
    /// `latest` is left alone: it only follows fetched entries.
    pub fn prepend(&mut self, entry: Entry) {
        self.entries.insert(0, entry);
        self.total += 1;
    }

    pub fn remove(&mut self, id: &str) -> Option<Entry> {
        let index = self
            .entries
            .iter()
            .position(|entry| entry.id.as_deref() == Some(id))?;
        self.total = self.total.saturating_sub(1);
        Some(self.entries.remove(index))
    }

    fn observe(&mut self, entry: &Entry) {
        if let Some(date) = entry.date {
            if self.latest.is_none_or(|latest| date > latest) {
                self.latest = Some(date);
            }
        }
    }
}
