//! callbridge: invoke server-side stored routines through a call-style SQL
//! statement over a wire protocol that only executes statements and returns
//! tabular results. Covers parameter-signature resolution (catalog-based with
//! a DDL-parsing fallback), placeholder-to-ordinal mapping, session-variable
//! emulation of OUT/INOUT parameters, and an LRU signature cache.

pub mod cache;
pub mod config;
pub mod emulate;
pub mod error;
pub mod exec;
pub mod ident;
pub mod placeholder;
pub mod scan;
pub mod signature;
pub mod typespec;

pub use cache::SignatureCache;
pub use config::CallConfig;
pub use emulate::{CallStatement, CallState};
pub use error::{CallError, CallResult};
pub use exec::{Connection, ExecOutcome, ResultRows, StatementExecutor};
pub use placeholder::PlaceholderMap;
pub use signature::resolve::resolve_signature;
pub use signature::{Direction, ParameterDescriptor, RoutineSignature};
