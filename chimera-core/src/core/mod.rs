//! Core domain types shared by every layer of the execution spine.

pub mod errors;
pub mod types;

pub use errors::{AdapterError, LogError, OrderError, SnapshotError};
pub use types::{
    LifecycleEvent, OrderIntent, OrderRecord, OrderStatus, OrderSubmit, Side, SymbolMeta,
    SymbolTable, TopOfBook,
};
