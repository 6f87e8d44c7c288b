//! Client side of the journal: RPC plumbing, the entry service, and the
//! controllers the shell drives.

pub mod error;
pub mod form;
pub mod list;
pub mod render;
pub mod rpc;
pub mod service;
pub mod shell;

pub use error::ClientError;
pub use form::{FormController, Submitted};
pub use list::{FetchMode, FetchTicket, ListController};
pub use render::{EntryView, render_entry, timestamp_label};
pub use rpc::{Envelope, HttpTransport, RpcClient, Transport};
pub use service::{EntryPut, EntryQuery, EntryService, PutOutcome, SortOrder};
pub use shell::Shell;
