//! Sunote core library - shared types, traits, and business logic.
//!
//! This crate contains no storage engine and no terminal I/O. Storage
//! backends implement [`NoteStore`]; front ends drive [`NoteService`] and
//! observe [`QueryPipeline`].

mod codec;
mod dateparse;
mod error;
mod handle;
mod migrations;
mod note;
mod query;
mod service;
mod store;
mod subscription;
#[cfg(test)]
mod testing;

pub use codec::{decode_notes, encode_notes};
pub use dateparse::parse_due_at;
pub use error::Error;
pub use handle::{BackupFolder, DestinationHandle, FileHandle, SourceHandle};
pub use migrations::{get_pending_migrations, Migration, MIGRATIONS, SCHEMA_VERSION};
pub use note::{now_millis, Note};
pub use query::{PipelineConfig, QueryPipeline, QuerySnapshot};
pub use service::{ExportedNotes, NoteService, Outcome};
pub use store::{NoteFilter, NoteStore, SharedStore};
pub use subscription::Subscription;
