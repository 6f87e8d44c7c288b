use chrono::{DateTime, Utc};

use super::list::{FetchMode, ListController};
use super::service::{EntryPut, EntryQuery, EntryService, PutOutcome};
use super::ClientError;
use crate::models::{EDIT_FIELDS, Entry, EntryPatch, USER_TYPE};

#[derive(Debug, Clone, PartialEq)]
pub enum Submitted {
    /// The new entry, as prepended to the list.
    Created(Entry),
    Updated,
}

/// The entry form: summary text, optional date, and the id of the entry
/// being edited, if any.
#[derive(Debug, Default)]
pub struct FormController {
    id: Option<String>,
    summary: String,
    date: Option<DateTime<Utc>>,
}

impl FormController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn summary(&self) -> &str {
        &self.summary
    }

    pub fn set_summary(&mut self, summary: impl Into<String>) {
        self.summary = summary.into();
    }

    pub fn date(&self) -> Option<DateTime<Utc>> {
        self.date
    }

    pub fn set_date(&mut self, date: Option<DateTime<Utc>>) {
        self.date = date;
    }

    pub fn editing(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Load entry `id` from the service and stage it for editing.
    pub async fn edit(&mut self, service: &EntryService, id: &str) -> Result<(), ClientError> {
        let query = EntryQuery::by_id(id).fields(&EDIT_FIELDS);
        let entry = match service.get(&query).await {
            Ok(entries) => entries.into_iter().next(),
            Err(e) => {
                tracing::warn!(id, error = %e, "unable to load entry for editing");
                None
            }
        };
        let entry = entry.ok_or(ClientError::EntryUnavailable)?;

        self.id = Some(id.to_string());
        self.summary = entry.summary;
        self.date = entry.date;
        Ok(())
    }

    /// Check the form and build the write it stands for.
    pub fn validate(&self, now: DateTime<Utc>) -> Result<EntryPut, ClientError> {
        if self.summary.is_empty() {
            return Err(ClientError::SummaryRequired);
        }
        // Compared at the one-second precision of the wire format.
        if self.date.is_some_and(|date| date.timestamp() > now.timestamp()) {
            return Err(ClientError::FutureDate);
        }

        let put = match &self.id {
            Some(id) => EntryPut::Update {
                id: id.clone(),
                set: EntryPatch {
                    summary: Some(self.summary.clone()),
                    date: self.date,
                },
            },
            None => EntryPut::Create(Entry {
                date: self.date,
                kind: Some(USER_TYPE.to_string()),
                ..Entry::new(self.summary.clone())
            }),
        };
        Ok(put)
    }

    pub async fn submit(
        &mut self,
        service: &EntryService,
        list: &mut ListController,
        viewer: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<Submitted, ClientError> {
        let put = self.validate(now)?;
        let outcome = service.put(put).await?;
        self.clear();

        match outcome {
            PutOutcome::Updated => {
                // Reordering in place is not attempted; reload instead.
                list.populate(service, FetchMode::Reset, now).await?;
                Ok(Submitted::Updated)
            }
            PutOutcome::Created(mut entry) => {
                entry.date.get_or_insert(now);
                entry.user = viewer.map(str::to_string);
                list.prepend(entry.clone());
                Ok(Submitted::Created(entry))
            }
        }
    }
}
