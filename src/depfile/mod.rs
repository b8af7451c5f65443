//! Compiler dependency artifacts and the records derived from them.

pub mod parser;
pub mod store;

pub use parser::{parse, DepParseError};
pub use store::{DepStore, IngestError, StoreError, WriteOutcome};
