//! Collaborator statement-execution interface and connection serialization.
//! The wire protocol underneath only knows "execute this SQL text and hand
//! back a tabular result or a row count"; everything this crate does is
//! expressed through that single seam. The channel is not multiplexed, so all
//! statement activity on one logical connection serializes through an
//! exclusive session lock.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::error::{CallError, CallResult};

/// A tabular result: column names plus rows of JSON-shaped values.
#[derive(Debug, Clone, Default)]
pub struct ResultRows {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<serde_json::Value>>,
}

impl ResultRows {
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.eq_ignore_ascii_case(name))
    }

    /// The single row of a one-row result, if that is what this is.
    pub fn single_row(&self) -> Option<&[serde_json::Value]> {
        if self.rows.len() == 1 {
            Some(self.rows[0].as_slice())
        } else {
            None
        }
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[derive(Debug, Clone)]
pub enum ExecOutcome {
    Rows(ResultRows),
    Count(u64),
}

impl ExecOutcome {
    pub fn into_rows(self) -> CallResult<ResultRows> {
        match self {
            ExecOutcome::Rows(r) => Ok(r),
            ExecOutcome::Count(_) => Err(CallError::general(
                "unexpected_result",
                "expected a tabular result, got a row count",
            )),
        }
    }
}

/// The statement-execution seam. Implementations perform the blocking network
/// round trip; callers must not assume any internal locking beyond what
/// `Connection` provides.
pub trait StatementExecutor: Send + Sync {
    fn execute(&self, sql: &str) -> CallResult<ExecOutcome>;
}

/// One logical wire connection. Auxiliary resolution round trips, SET-binding
/// statements, the main call and the consolidated read-back all go through
/// `with_session`, which holds the exclusive channel lock for the duration of
/// the closure so multi-statement sequences execute in strict program order.
pub struct Connection {
    exec: Arc<dyn StatementExecutor>,
    session: Mutex<()>,
}

impl Connection {
    pub fn new(exec: Arc<dyn StatementExecutor>) -> Self {
        Self { exec, session: Mutex::new(()) }
    }

    /// Run `f` with exclusive use of the wire channel.
    pub fn with_session<R>(&self, f: impl FnOnce(&dyn StatementExecutor) -> CallResult<R>) -> CallResult<R> {
        let _guard = self.session.lock();
        f(self.exec.as_ref())
    }

    /// Execute a single statement under the session lock.
    pub fn execute(&self, sql: &str) -> CallResult<ExecOutcome> {
        self.with_session(|e| e.execute(sql))
    }
}
