use parking_lot::Mutex;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use callbridge::emulate::SESSION_VAR_PREFIX;
use callbridge::{
    resolve_signature, CallConfig, CallError, CallResult, CallState, CallStatement, Connection,
    Direction, ExecOutcome, ResultRows, SignatureCache, StatementExecutor,
};

fn init_logs() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type Handler = Box<dyn Fn(&str, &mut HashMap<String, Value>) -> CallResult<ExecOutcome> + Send + Sync>;

/// Scripted executor emulating a session: SET/SELECT over session variables
/// are interpreted directly, everything else goes through the test handler.
struct MockExecutor {
    vars: Mutex<HashMap<String, Value>>,
    log: Mutex<Vec<String>>,
    fail_readback: AtomicBool,
    handler: Handler,
}

impl MockExecutor {
    fn new(handler: Handler) -> Arc<Self> {
        Arc::new(Self {
            vars: Mutex::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            fail_readback: AtomicBool::new(false),
            handler,
        })
    }

    fn log_snapshot(&self) -> Vec<String> {
        self.log.lock().clone()
    }
}

impl StatementExecutor for MockExecutor {
    fn execute(&self, sql: &str) -> CallResult<ExecOutcome> {
        self.log.lock().push(sql.to_string());
        let trimmed = sql.trim();
        let mut vars = self.vars.lock();
        if let Some(rest) = trimmed.strip_prefix("SET @") {
            let (name, lit) = rest
                .split_once('=')
                .ok_or_else(|| CallError::general("mock", "malformed SET"))?;
            vars.insert(format!("@{}", name.trim()), parse_literal(lit.trim()));
            return Ok(ExecOutcome::Count(0));
        }
        if trimmed.starts_with("SELECT @") {
            if self.fail_readback.load(Ordering::SeqCst) {
                return Err(CallError::connection("io", "link dropped during read-back"));
            }
            let names: Vec<String> = trimmed["SELECT ".len()..]
                .split(',')
                .map(|s| s.trim().to_string())
                .collect();
            let row: Vec<Value> = names
                .iter()
                .map(|n| vars.get(n).cloned().unwrap_or(Value::Null))
                .collect();
            return Ok(ExecOutcome::Rows(ResultRows { columns: names, rows: vec![row] }));
        }
        (self.handler)(trimmed, &mut vars)
    }
}

fn parse_literal(lit: &str) -> Value {
    if lit.eq_ignore_ascii_case("NULL") {
        return Value::Null;
    }
    if lit.eq_ignore_ascii_case("TRUE") {
        return json!(true);
    }
    if lit.eq_ignore_ascii_case("FALSE") {
        return json!(false);
    }
    if lit.starts_with('\'') && lit.ends_with('\'') && lit.len() >= 2 {
        return json!(lit[1..lit.len() - 1].replace("''", "'").replace("\\\\", "\\"));
    }
    if let Ok(i) = lit.parse::<i64>() {
        return json!(i);
    }
    if let Ok(f) = lit.parse::<f64>() {
        return json!(f);
    }
    json!(lit)
}

const CATALOG_COLS: &[&str] = &[
    "PARAMETER_NAME",
    "PARAMETER_MODE",
    "ORDINAL_POSITION",
    "DATA_TYPE",
    "NUMERIC_PRECISION",
    "CHARACTER_MAXIMUM_LENGTH",
    "NUMERIC_SCALE",
    "IS_NULLABLE",
];

fn catalog_rows(rows: Vec<Vec<Value>>) -> ExecOutcome {
    ExecOutcome::Rows(ResultRows {
        columns: CATALOG_COLS.iter().map(|c| c.to_string()).collect(),
        rows,
    })
}

fn empty_catalog() -> ExecOutcome {
    ExecOutcome::Rows(ResultRows {
        columns: CATALOG_COLS.iter().map(|c| c.to_string()).collect(),
        rows: vec![],
    })
}

fn show_create(kind: &str, ddl: &str) -> ExecOutcome {
    ExecOutcome::Rows(ResultRows {
        columns: vec![
            kind.to_string(),
            "sql_mode".to_string(),
            format!("Create {kind}"),
            "character_set_client".to_string(),
        ],
        rows: vec![vec![json!("p"), json!(""), json!(ddl), json!("utf8mb4")]],
    })
}

fn param_row(name: &str, mode: &str, ordinal: i64, ty: &str) -> Vec<Value> {
    let mode_v = if mode.is_empty() { Value::Null } else { json!(mode) };
    vec![json!(name), mode_v, json!(ordinal), json!(ty), json!(10), Value::Null, json!(0), json!("YES")]
}

/// proc1(p1 IN INT, p2 IN INT, p3 OUT INT) resolvable via both catalog and DDL.
fn proc1_executor() -> Arc<MockExecutor> {
    MockExecutor::new(Box::new(|sql, vars| {
        if sql.contains("INFORMATION_SCHEMA.PARAMETERS") && sql.contains("'proc1'") {
            return Ok(catalog_rows(vec![
                param_row("p1", "IN", 1, "int"),
                param_row("p2", "IN", 2, "int"),
                param_row("p3", "OUT", 3, "int"),
            ]));
        }
        if sql.starts_with("SHOW CREATE PROCEDURE") && sql.contains("`proc1`") {
            return Ok(show_create(
                "Procedure",
                "CREATE PROCEDURE `proc1`(IN p1 INT, IN p2 INT, OUT p3 INT) BEGIN SET p3 = p1 + p2; END",
            ));
        }
        if sql.starts_with("CALL proc1(") {
            // p3 = p1 + p2, with p3 passed as the third argument variable
            let args = &sql["CALL proc1(".len()..sql.len() - 1];
            let parts: Vec<&str> = args.split(',').map(|s| s.trim()).collect();
            let a = parse_literal(parts[0]).as_i64().unwrap_or(0);
            let b = parse_literal(parts[1]).as_i64().unwrap_or(0);
            vars.insert(parts[2].to_string(), json!(a + b));
            return Ok(ExecOutcome::Count(0));
        }
        Err(CallError::general("mock", "unexpected statement"))
    }))
}

#[test]
fn placeholder_map_mixes_literals_and_markers() {
    init_logs();
    let exec = proc1_executor();
    let conn = Connection::new(exec);
    let cache = SignatureCache::new(16);
    let cfg = CallConfig::default();
    let text = "CALL proc1(?, 10, ?)";
    let sig = resolve_signature(&conn, &cache, &cfg, "demo", "proc1", false, text).unwrap();
    assert!(sig.resolved_via_catalog);

    let stmt = CallStatement::new(sig, text).unwrap();
    let map = stmt.placeholder_map();
    // Two markers, no implicit entry for a procedure
    assert_eq!(map.len(), 2);
    assert_eq!(map.ordinal_for(1).unwrap(), 0);
    assert_eq!(map.ordinal_for(2).unwrap(), 2);
}

#[test]
fn catalog_and_ddl_paths_agree() {
    init_logs();
    let conn_catalog = Connection::new(proc1_executor());
    let conn_ddl = Connection::new(proc1_executor());
    let cache_a = SignatureCache::new(4);
    let cache_b = SignatureCache::new(4);
    let text = "CALL proc1(?, ?, ?)";

    let via_catalog = resolve_signature(
        &conn_catalog,
        &cache_a,
        &CallConfig::default(),
        "demo",
        "proc1",
        false,
        text,
    )
    .unwrap();
    let restricted = CallConfig { restricted_catalog_access: true, ..CallConfig::default() };
    let via_ddl =
        resolve_signature(&conn_ddl, &cache_b, &restricted, "demo", "proc1", false, text).unwrap();

    assert!(via_catalog.resolved_via_catalog);
    assert!(!via_ddl.resolved_via_catalog);
    assert_eq!(via_catalog.parameters().len(), via_ddl.parameters().len());
    for (a, b) in via_catalog.parameters().iter().zip(via_ddl.parameters()) {
        assert_eq!(a.name, b.name);
        assert_eq!(a.direction, b.direction);
        assert_eq!(a.ordinal, b.ordinal);
    }
}

#[test]
fn cache_eviction_triggers_re_resolution() {
    init_logs();
    let exec = proc1_executor();
    let conn = Connection::new(exec.clone());
    let cache = SignatureCache::new(1);
    let cfg = CallConfig::default();

    let t1 = "CALL proc1(?, ?, ?)";
    let t2 = "CALL proc1(1, ?, ?)";
    resolve_signature(&conn, &cache, &cfg, "demo", "proc1", false, t1).unwrap();
    // Hit: no extra catalog query
    resolve_signature(&conn, &cache, &cfg, "demo", "proc1", false, t1).unwrap();
    let catalog_queries = |log: &[String]| {
        log.iter().filter(|s| s.contains("INFORMATION_SCHEMA.PARAMETERS")).count()
    };
    assert_eq!(catalog_queries(&exec.log_snapshot()), 1);

    // Fills the single slot with t2, evicting t1
    resolve_signature(&conn, &cache, &cfg, "demo", "proc1", false, t2).unwrap();
    assert!(cache.get("demo", t1).is_none());
    assert!(cache.get("demo", t2).is_some());

    // t1 is a miss again and re-resolves
    resolve_signature(&conn, &cache, &cfg, "demo", "proc1", false, t1).unwrap();
    assert_eq!(catalog_queries(&exec.log_snapshot()), 3);
}

#[test]
fn out_parameter_round_trip_through_session_variables() {
    init_logs();
    let exec = proc1_executor();
    let conn = Connection::new(exec.clone());
    let cache = SignatureCache::new(16);
    let cfg = CallConfig::default();
    let text = "CALL proc1(?, ?, ?)";
    let sig = resolve_signature(&conn, &cache, &cfg, "demo", "proc1", false, text).unwrap();

    let mut stmt = CallStatement::new(sig, text).unwrap();
    stmt.bind_input(1, json!(4)).unwrap();
    stmt.bind_input(2, json!(38)).unwrap();
    stmt.register_output(3).unwrap();
    let ret = stmt.execute(&conn).unwrap();
    assert!(ret.is_none());
    assert_eq!(stmt.state(), CallState::OutputsRead);
    assert_eq!(stmt.read_output(3).unwrap(), json!(42));

    // The main call referenced the mangled variable, not a literal
    let log = exec.log_snapshot();
    let call = log.iter().find(|s| s.starts_with("CALL proc1(")).unwrap();
    assert!(call.contains(&format!("{SESSION_VAR_PREFIX}p3")));
    // And exactly one consolidated read-back ran
    assert_eq!(log.iter().filter(|s| s.starts_with("SELECT @")).count(), 1);
}

#[test]
fn catalog_resolution_carries_nullability() {
    init_logs();
    let conn = Connection::new(proc1_executor());
    let cache = SignatureCache::new(4);
    let sig = resolve_signature(
        &conn,
        &cache,
        &CallConfig::default(),
        "demo",
        "proc1",
        false,
        "CALL proc1(?, ?, ?)",
    )
    .unwrap();
    assert!(sig
        .parameters()
        .iter()
        .all(|p| p.nullability == callbridge::typespec::Nullability::Nullable));
}

#[test]
fn concurrent_statement_cannot_interleave_with_readback() {
    init_logs();
    let exec = proc1_executor();
    let conn = Arc::new(Connection::new(exec.clone()));
    let cache = SignatureCache::new(16);
    let text = "CALL proc1(?, ?, ?)";
    let sig =
        resolve_signature(&conn, &cache, &CallConfig::default(), "demo", "proc1", false, text)
            .unwrap();

    let mut stmt = CallStatement::new(sig, text).unwrap();
    stmt.bind_input(1, json!(40)).unwrap();
    stmt.bind_input(2, json!(2)).unwrap();
    stmt.register_output(3).unwrap();

    // A second session user fires a clobbering SET for the same mangled
    // variable as soon as it sees the main call go out
    let clobber = format!("SET {SESSION_VAR_PREFIX}p3 = 999");
    let intruder = {
        let exec = exec.clone();
        let conn = Arc::clone(&conn);
        let clobber = clobber.clone();
        std::thread::spawn(move || {
            while !exec.log_snapshot().iter().any(|s| s.starts_with("CALL proc1(")) {
                std::thread::yield_now();
            }
            conn.execute(&clobber).unwrap();
        })
    };
    stmt.execute(&conn).unwrap();
    intruder.join().unwrap();

    // The clobber could not slip between the call and its read-back
    assert_eq!(stmt.read_output(3).unwrap(), json!(42));
    let log = exec.log_snapshot();
    let readback_pos = log.iter().position(|s| s.starts_with("SELECT @")).unwrap();
    let clobber_pos = log.iter().position(|s| s == &clobber).unwrap();
    assert!(clobber_pos > readback_pos);
}

#[test]
fn inout_parameter_is_seeded_then_read_back() {
    init_logs();
    let exec = MockExecutor::new(Box::new(|sql, vars| {
        if sql.contains("INFORMATION_SCHEMA.PARAMETERS") && sql.contains("'double_it'") {
            return Ok(catalog_rows(vec![param_row("v", "INOUT", 1, "int")]));
        }
        if sql.starts_with("CALL double_it(") {
            let var = sql["CALL double_it(".len()..sql.len() - 1].trim().to_string();
            let cur = vars.get(&var).and_then(|v| v.as_i64()).unwrap_or(0);
            vars.insert(var, json!(cur * 2));
            return Ok(ExecOutcome::Count(0));
        }
        Err(CallError::general("mock", "unexpected statement"))
    }));
    let conn = Connection::new(exec.clone());
    let cache = SignatureCache::new(16);
    let text = "CALL double_it(?)";
    let sig =
        resolve_signature(&conn, &cache, &CallConfig::default(), "demo", "double_it", false, text)
            .unwrap();

    let mut stmt = CallStatement::new(sig, text).unwrap();
    stmt.bind_input(1, json!(5)).unwrap();
    stmt.register_output(1).unwrap();
    stmt.execute(&conn).unwrap();
    assert_eq!(stmt.read_output(1).unwrap(), json!(10));

    // SET seeding ran before the call
    let log = exec.log_snapshot();
    let set_pos = log.iter().position(|s| s.starts_with("SET @")).unwrap();
    let call_pos = log.iter().position(|s| s.starts_with("CALL double_it(")).unwrap();
    assert!(set_pos < call_pos);
}

#[test]
fn pure_input_call_is_single_statement_passthrough() {
    init_logs();
    let exec = MockExecutor::new(Box::new(|sql, _vars| {
        if sql.contains("INFORMATION_SCHEMA.PARAMETERS") {
            return Ok(catalog_rows(vec![
                param_row("a", "IN", 1, "int"),
                param_row("b", "IN", 2, "varchar"),
            ]));
        }
        if sql.starts_with("CALL log_event(") {
            return Ok(ExecOutcome::Count(1));
        }
        Err(CallError::general("mock", "unexpected statement"))
    }));
    let conn = Connection::new(exec.clone());
    let cache = SignatureCache::new(16);
    let text = "CALL log_event(?, ?)";
    let sig =
        resolve_signature(&conn, &cache, &CallConfig::default(), "demo", "log_event", false, text)
            .unwrap();

    let mut stmt = CallStatement::new(sig, text).unwrap();
    stmt.bind_input(1, json!(9)).unwrap();
    stmt.bind_input(2, json!("boot")).unwrap();
    let before = exec.log_snapshot().len();
    stmt.execute(&conn).unwrap();
    let after = exec.log_snapshot().len();
    // No SET, no consolidated SELECT: exactly one statement
    assert_eq!(after - before, 1);
    assert_eq!(stmt.state(), CallState::OutputsRead);
    let log = exec.log_snapshot();
    assert_eq!(log.last().unwrap(), "CALL log_event(9, 'boot')");
}

#[test]
fn function_returns_value_distinct_from_outputs() {
    init_logs();
    let exec = MockExecutor::new(Box::new(|sql, _vars| {
        if sql.starts_with("SHOW CREATE FUNCTION") && sql.contains("`f`") {
            return Ok(show_create(
                "Function",
                "CREATE FUNCTION `f`(x INT) RETURNS INT DETERMINISTIC RETURN x + 1",
            ));
        }
        if sql.starts_with("SELECT f(") {
            let arg = parse_literal(sql["SELECT f(".len()..sql.len() - 1].trim());
            let x = arg.as_i64().unwrap_or(0);
            return Ok(ExecOutcome::Rows(ResultRows {
                columns: vec!["f".to_string()],
                rows: vec![vec![json!(x + 1)]],
            }));
        }
        Err(CallError::general("mock", "unexpected statement"))
    }));
    let conn = Connection::new(exec);
    let cache = SignatureCache::new(16);
    let restricted = CallConfig { restricted_catalog_access: true, ..CallConfig::default() };
    let text = "SELECT f(?)";
    let sig = resolve_signature(&conn, &cache, &restricted, "demo", "f", true, text).unwrap();

    // Ordinal 0 is the OUT return pseudo-parameter, ordinal 1 is x (IN)
    assert_eq!(sig.return_parameter().unwrap().direction, Direction::Out);
    assert_eq!(sig.parameters()[1].name, "x");
    assert_eq!(sig.parameters()[1].direction, Direction::In);

    let mut stmt = CallStatement::new(sig, text).unwrap();
    let map = stmt.placeholder_map();
    assert_eq!(map.placeholder_ordinals(), &[1]);
    assert_eq!(map.ordinal_for(1).unwrap(), 0);
    assert_eq!(map.ordinal_for(2).unwrap(), 1);

    stmt.bind_input(2, json!(41)).unwrap();
    let ret = stmt.execute(&conn).unwrap();
    assert_eq!(ret, Some(json!(42)));
    // The return value is also addressable at caller index 1
    assert_eq!(stmt.read_output(1).unwrap(), json!(42));
}

#[test]
fn caller_index_out_of_range_everywhere() {
    init_logs();
    let conn = Connection::new(proc1_executor());
    let cache = SignatureCache::new(16);
    let text = "CALL proc1(?, 10, ?)";
    let sig =
        resolve_signature(&conn, &cache, &CallConfig::default(), "demo", "proc1", false, text)
            .unwrap();
    let mut stmt = CallStatement::new(sig, text).unwrap();

    for bad in [0usize, 3, 99] {
        assert!(matches!(stmt.bind_input(bad, json!(1)), Err(CallError::IllegalArgument { .. })));
        assert!(matches!(stmt.register_output(bad), Err(CallError::IllegalArgument { .. })));
        assert!(matches!(stmt.read_output(bad), Err(CallError::IllegalArgument { .. })));
    }
}

#[test]
fn readback_failure_leaves_statement_executed() {
    init_logs();
    let exec = proc1_executor();
    let conn = Connection::new(exec.clone());
    let cache = SignatureCache::new(16);
    let text = "CALL proc1(?, ?, ?)";
    let sig =
        resolve_signature(&conn, &cache, &CallConfig::default(), "demo", "proc1", false, text)
            .unwrap();

    let mut stmt = CallStatement::new(sig, text).unwrap();
    stmt.bind_input(1, json!(1)).unwrap();
    stmt.bind_input(2, json!(2)).unwrap();
    stmt.register_output(3).unwrap();
    exec.fail_readback.store(true, Ordering::SeqCst);
    let err = stmt.execute(&conn).unwrap_err();
    assert!(err.is_transport());
    assert_eq!(stmt.state(), CallState::Executed);
    // Reads must not return stale/default data
    assert!(matches!(stmt.read_output(3), Err(CallError::General { .. })));
}

#[test]
fn synthetic_signature_for_unrecognized_text() {
    init_logs();
    let exec = MockExecutor::new(Box::new(|sql, _vars| {
        if sql.contains("INFORMATION_SCHEMA.PARAMETERS") {
            return Ok(empty_catalog());
        }
        Err(CallError::general("mock", "routine body inaccessible"))
    }));
    let conn = Connection::new(exec);
    let cache = SignatureCache::new(16);
    let cfg = CallConfig::default();
    let text = "INSERT INTO audit VALUES (?, ?)";
    let sig = resolve_signature(&conn, &cache, &cfg, "demo", "audit_hook", false, text).unwrap();
    assert!(sig.is_synthetic);
    assert_eq!(sig.parameters().len(), 2);
    assert!(sig.parameters().iter().all(|p| p.direction == Direction::In));
}

#[test]
fn genuine_call_without_metadata_fails_unless_relaxed() {
    init_logs();
    let make_exec = || {
        MockExecutor::new(Box::new(|sql, _vars| {
            if sql.contains("INFORMATION_SCHEMA.PARAMETERS") {
                return Ok(empty_catalog());
            }
            Err(CallError::general("mock", "routine body inaccessible"))
        }))
    };
    let text = "CALL hidden_proc(?)";

    let conn = Connection::new(make_exec());
    let strict = CallConfig::default();
    let err = resolve_signature(&conn, &SignatureCache::new(4), &strict, "demo", "hidden_proc", false, text)
        .unwrap_err();
    assert!(matches!(err, CallError::General { .. }));

    let conn2 = Connection::new(make_exec());
    let relaxed = CallConfig { relaxed_synthetic_params: true, ..CallConfig::default() };
    let sig = resolve_signature(&conn2, &SignatureCache::new(4), &relaxed, "demo", "hidden_proc", false, text)
        .unwrap();
    assert!(sig.is_synthetic);
    assert_eq!(sig.parameters().len(), 1);
}

#[test]
fn transport_error_during_resolution_propagates_unmodified() {
    init_logs();
    let exec = MockExecutor::new(Box::new(|sql, _vars| {
        if sql.contains("INFORMATION_SCHEMA.PARAMETERS") {
            return Err(CallError::connection("io", "connection reset"));
        }
        Err(CallError::general("mock", "unexpected statement"))
    }));
    let conn = Connection::new(exec);
    let err = resolve_signature(
        &conn,
        &SignatureCache::new(4),
        &CallConfig::default(),
        "demo",
        "p",
        false,
        "CALL p(?)",
    )
    .unwrap_err();
    assert!(err.is_transport());
    assert_eq!(err.message(), "connection reset");
}
