//! Line-oriented terminal front end for the journal.

use std::fmt::Display;
use std::io::{self, Write};

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, Lines};

use super::form::{FormController, Submitted};
use super::list::{FetchMode, ListController};
use super::render::render_entry;
use super::service::EntryService;
use crate::models::Entry;
use crate::models::date::parse_oplog;

const HELP: &str = "\
commands:
  list | reload        load the newest entries
  more                 load the next page
  refresh              load entries newer than the latest shown
  show                 print the list again
  summary <text>       set the entry text
  date <YYYY-MM-DD HH:MM> | date none
  submit               save the form
  post <text>          set the entry text and save
  edit <n>             edit entry n
  delete <n>           delete entry n
  clear                reset the form
  quit";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Reload,
    More,
    Refresh,
    Show,
    Clear,
    Summary(String),
    Date(Option<String>),
    Submit,
    Post(String),
    Edit(usize),
    Delete(usize),
    Help,
    Quit,
}

impl Command {
    /// Parse one input line. Blank lines yield `Ok(None)`.
    pub fn parse(line: &str) -> Result<Option<Self>, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (word, rest) = match line.split_once(char::is_whitespace) {
            Some((word, rest)) => (word, rest.trim()),
            None => (line, ""),
        };
        let position = |rest: &str| {
            rest.parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| format!("{word} needs an entry number"))
        };

        let command = match word {
            "list" | "reload" => Command::Reload,
            "more" => Command::More,
            "refresh" => Command::Refresh,
            "show" => Command::Show,
            "clear" => Command::Clear,
            "summary" => Command::Summary(rest.to_string()),
            "date" if rest.is_empty() || rest == "none" => Command::Date(None),
            "date" => Command::Date(Some(rest.to_string())),
            "submit" => Command::Submit,
            "post" => Command::Post(rest.to_string()),
            "edit" => Command::Edit(position(rest)?),
            "delete" => Command::Delete(position(rest)?),
            "help" | "?" => Command::Help,
            "quit" | "exit" => Command::Quit,
            other => return Err(format!("Unknown command: {other}")),
        };
        Ok(Some(command))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Error,
    Notice,
    Info,
    Success,
}

impl StatusKind {
    fn tag(self) -> &'static str {
        match self {
            StatusKind::Error => "error",
            StatusKind::Notice => "notice",
            StatusKind::Info => "info",
            StatusKind::Success => "success",
        }
    }
}

pub struct Shell<Tz: TimeZone> {
    service: EntryService,
    list: ListController,
    form: FormController,
    viewer: Option<String>,
    zone: Tz,
}

impl<Tz> Shell<Tz>
where
    Tz: TimeZone,
    Tz::Offset: Display,
{
    pub fn new(service: EntryService, viewer: Option<String>, zone: Tz) -> Self {
        Self {
            service,
            list: ListController::new(),
            form: FormController::new(),
            viewer,
            zone,
        }
    }

    pub fn list(&self) -> &ListController {
        &self.list
    }

    pub fn form(&self) -> &FormController {
        &self.form
    }

    /// Load the newest entries, then serve commands until `quit` or end of
    /// input.
    pub async fn run<R, W>(&mut self, input: R, output: &mut W) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let mut lines = input.lines();
        self.execute(Command::Reload, &mut lines, output).await?;

        loop {
            write!(output, "> ")?;
            output.flush()?;
            let Some(line) = lines.next_line().await? else {
                break;
            };
            match Command::parse(&line) {
                Ok(Some(Command::Quit)) => break,
                Ok(Some(command)) => self.execute(command, &mut lines, output).await?,
                Ok(None) => {}
                Err(message) => status(output, StatusKind::Error, &message)?,
            }
        }
        Ok(())
    }

    pub async fn execute<R, W>(
        &mut self,
        command: Command,
        lines: &mut Lines<R>,
        output: &mut W,
    ) -> io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: Write,
    {
        let now = Utc::now();
        match command {
            Command::Reload => self.populate(FetchMode::Reset, output).await?,
            Command::More => self.populate(FetchMode::More, output).await?,
            Command::Refresh => self.populate(FetchMode::Newer, output).await?,
            Command::Show => self.print_list(output)?,
            Command::Clear => {
                self.form.clear();
                status(output, StatusKind::Info, "Form cleared.")?;
            }
            Command::Summary(text) => self.form.set_summary(text),
            Command::Date(None) => self.form.set_date(None),
            Command::Date(Some(text)) => match self.parse_date(&text) {
                Some(date) => self.form.set_date(Some(date)),
                None => status(output, StatusKind::Error, "Unable to parse date.")?,
            },
            Command::Post(text) => {
                self.form.set_summary(text);
                self.submit(now, output).await?;
            }
            Command::Submit => self.submit(now, output).await?,
            Command::Edit(position) => {
                let Some(id) = self.owned_entry(position, output)? else {
                    return Ok(());
                };
                match self.form.edit(&self.service, &id).await {
                    Ok(()) => {
                        let text = format!("Editing entry {position}: {}", self.form.summary());
                        status(output, StatusKind::Info, &text)?;
                    }
                    Err(e) => status(output, StatusKind::Error, &e.status_message("Unable to get entry."))?,
                }
            }
            Command::Delete(position) => {
                let Some(id) = self.owned_entry(position, output)? else {
                    return Ok(());
                };
                write!(output, "Delete entry? [y/N] ")?;
                output.flush()?;
                let answer = lines.next_line().await?.unwrap_or_default();
                if !matches!(answer.trim(), "y" | "Y" | "yes") {
                    return Ok(());
                }
                match self.service.del(&id).await {
                    Ok(()) => {
                        self.list.remove(&id);
                        status(output, StatusKind::Success, "Entry deleted.")?;
                        self.print_list(output)?;
                    }
                    Err(e) => status(output, StatusKind::Error, &e.status_message("Unable to delete entry."))?,
                }
            }
            Command::Help => writeln!(output, "{HELP}")?,
            Command::Quit => {}
        }
        Ok(())
    }

    async fn populate<W: Write>(&mut self, mode: FetchMode, output: &mut W) -> io::Result<()> {
        match self.list.populate(&self.service, mode, Utc::now()).await {
            Ok(_) => self.print_list(output),
            Err(e) => status(output, StatusKind::Error, &e.status_message("Unable to populate entries.")),
        }
    }

    async fn submit<W: Write>(&mut self, now: DateTime<Utc>, output: &mut W) -> io::Result<()> {
        let submitted = self
            .form
            .submit(&self.service, &mut self.list, self.viewer.as_deref(), now)
            .await;
        match submitted {
            Ok(Submitted::Created(_)) | Ok(Submitted::Updated) => self.print_list(output),
            Err(e) => status(output, StatusKind::Error, &e.status_message("Unable to put entries.")),
        }
    }

    /// Id of the entry shown at `position` (1-based), if the viewer owns it.
    fn owned_entry<W: Write>(&self, position: usize, output: &mut W) -> io::Result<Option<String>> {
        let entry = position.checked_sub(1).and_then(|i| self.list.entries().get(i));
        match entry {
            Some(entry) if !entry.is_owned_by(self.viewer.as_deref()) => {
                status(output, StatusKind::Notice, "Only your own entries can be changed.")?;
                Ok(None)
            }
            Some(Entry { id: Some(id), .. }) => Ok(Some(id.clone())),
            _ => {
                status(output, StatusKind::Error, &format!("No entry {position}."))?;
                Ok(None)
            }
        }
    }

    /// A `YYYY-MM-DD HH:MM` time in the shell's zone, or an oplog timestamp.
    fn parse_date(&self, text: &str) -> Option<DateTime<Utc>> {
        if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M") {
            return self
                .zone
                .from_local_datetime(&naive)
                .single()
                .map(|date| date.with_timezone(&Utc));
        }
        parse_oplog(text)
    }

    fn print_list<W: Write>(&self, output: &mut W) -> io::Result<()> {
        let now = Utc::now().with_timezone(&self.zone);
        if self.list.entries().is_empty() {
            return writeln!(output, "(no entries)");
        }
        for (i, entry) in self.list.entries().iter().enumerate() {
            let view = render_entry(entry, &now, self.viewer.as_deref());
            let controls = if view.controls { " [edit/delete]" } else { "" };
            match &view.user {
                Some(user) => writeln!(output, "{:>3}. {}{} - {}", i + 1, view.label, controls, user)?,
                None => writeln!(output, "{:>3}. {}", i + 1, view.label)?,
            }
            writeln!(output, "     {}", view.summary)?;
        }
        Ok(())
    }
}

fn status<W: Write>(output: &mut W, kind: StatusKind, text: &str) -> io::Result<()> {
    writeln!(output, "[{}] {}", kind.tag(), text)
}
