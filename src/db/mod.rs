//! MongoDB persistence
//!
//! Typed collection wrapper, document schemas and the Mongo-backed
//! implementations of the store traits.

pub mod mongo;
pub mod schemas;
mod stores;

pub use mongo::{IntoIndexes, MongoClient, MongoCollection};
pub use stores::MongoStore;
