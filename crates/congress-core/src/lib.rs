pub mod config;
pub mod cursor;
pub mod endpoint;
pub mod json;
pub mod schema;
pub mod time;

pub use config::{ConfigError, RetryPolicy, SyncConfig};
pub use cursor::{CursorEntry, CursorPatch, CursorState, StateError};
pub use endpoint::{DetailDescriptor, EndpointDescriptor, ResponseShape};
pub use schema::{ColumnType, TableDescriptor, schema};
pub use time::{Clock, FixedClock, SystemClock};
