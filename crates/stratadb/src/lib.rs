//! ## Crate layout
//! - `core`: runtime engine — schemas, collections, models, accessors,
//!   backends, and errors.
//!
//! The `prelude` module mirrors the runtime surface used by application
//! code; backend client traits live under `backends` for integrators
//! wiring real stores.

pub use stratadb_core as core;

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use stratadb_core::error::{DataAccessError, ValidationError};

///
/// Application Prelude
///

pub mod prelude {
    pub use crate::core::prelude::*;
    pub use serde_json::{Value, json};
}

///
/// Backend integration surface
/// Client protocols and adapters for wiring concrete stores.
///

pub mod backends {
    pub use crate::core::backend::{
        BackendKind, BatchGetOutput, QueryPage, StorageAdapter,
        keyvalue::{EntityStoreClient, KeyValueAdapter, StoreOutput, StoreQuery},
        relational::{
            RelationalAdapter, RestClient, RestFilter, RestRequest, RestResponse, RestVerb,
        },
    };
    pub use crate::core::error::{BackendError, RestError, StoreError, StoreErrorKind};
}
