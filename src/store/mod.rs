//! Persistence: the opaque backend contract and the loaded-repository
//! context built on top of it.

mod backend;
mod datastore;

pub use backend::{Backend, JsonFileBackend};
pub use datastore::Datastore;
