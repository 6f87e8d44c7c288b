pub mod date;
pub mod entry;
pub mod user;

pub use entry::{EDIT_FIELDS, Entry, EntryPatch, StoredEntry, USER_TYPE};
pub use user::User;
