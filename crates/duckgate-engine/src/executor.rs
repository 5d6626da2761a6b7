//! Materialising query execution.
//!
//! [`QueryExecutor::execute`] runs one filtered statement to completion and
//! converts every row into a JSON object keyed by column name.
//!
//! # Value conversion
//!
//! | DuckDB | JSON |
//! |--------|------|
//! | integers within ±(2^53 − 1) | number |
//! | integers outside that range | decimal string |
//! | FLOAT / DOUBLE | number, non-finite → `null` |
//! | DECIMAL | number; string when the integer part is outside ±(2^53 − 1) |
//! | VARCHAR / ENUM | string |
//! | BLOB | base64 string |
//! | DATE / TIME / TIMESTAMP | ISO-8601 string |
//! | INTERVAL | `{months, days, micros}` |
//! | LIST / ARRAY | array |
//! | STRUCT | object |
//! | MAP | object keyed by the stringified key |
//!
//! The integer rule keeps results lossless for JavaScript clients, which
//! parse every JSON number as a double.

use crate::error::Result;
use crate::filter::{filter, FilterVerdict};
use crate::session::EngineSession;
use base64::Engine as _;
use chrono::{DateTime, NaiveTime};
use duckdb::types::{TimeUnit, Value};
use duckdb::Connection;
use serde::Serialize;
use serde_json::{Map, Number, Value as JsonValue};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Largest integer a double represents exactly.
pub const MAX_SAFE_INTEGER: i64 = 9_007_199_254_740_991;

/// One result row, in column order.
pub type Row = Map<String, JsonValue>;

/// A fully materialised result.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RowSet {
    pub columns: Vec<String>,
    pub rows: Vec<Row>,
}

impl RowSet {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_rows(self) -> Vec<Row> {
        self.rows
    }
}

/// Executes statements and materialises their results.
#[derive(Debug, Clone)]
pub struct QueryExecutor {
    session: Arc<EngineSession>,
}

impl QueryExecutor {
    pub fn new(session: Arc<EngineSession>) -> Self {
        Self { session }
    }

    pub fn session(&self) -> &Arc<EngineSession> {
        &self.session
    }

    /// Initialize the session if needed, filter `sql` and run it.
    ///
    /// A filtered statement is not an error: the returned rows describe the
    /// rejection.
    pub async fn execute(&self, sql: &str) -> Result<RowSet> {
        self.session.ensure_initialized().await?;

        let verdict = filter(sql, true);
        if let FilterVerdict::Rejected { category, .. } = &verdict {
            info!(category = %category, "Statement rejected by filter");
        }
        let statement = verdict.statement().to_string();

        let start = Instant::now();
        let result = self
            .session
            .with_connection(move |conn| materialize(conn, &statement))
            .await?;

        debug!(
            rows = result.len(),
            columns = result.columns.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Query executed"
        );

        Ok(result)
    }
}

fn materialize(conn: &Connection, sql: &str) -> Result<RowSet> {
    let mut stmt = conn.prepare(sql)?;
    let mut rows_result = stmt.query([])?;

    // Column names are only readable once `Rows` releases the statement, so
    // values are collected positionally first.
    let mut raw_rows: Vec<Vec<JsonValue>> = Vec::new();
    while let Some(row) = rows_result.next()? {
        let mut values = Vec::new();
        for i in 0.. {
            match row.get::<_, Value>(i) {
                Ok(value) => values.push(value_to_json(value)),
                Err(duckdb::Error::InvalidColumnIndex(_)) => break,
                Err(e) => return Err(e.into()),
            }
        }
        raw_rows.push(values);
    }
    drop(rows_result);

    let columns: Vec<String> = stmt.column_names();

    let rows = raw_rows
        .into_iter()
        .map(|values| {
            columns
                .iter()
                .cloned()
                .zip(values)
                .collect::<Row>()
        })
        .collect();

    Ok(RowSet { columns, rows })
}

/// Convert one DuckDB value into JSON.
pub fn value_to_json(value: Value) -> JsonValue {
    match value {
        Value::Null => JsonValue::Null,
        Value::Boolean(b) => JsonValue::Bool(b),
        Value::TinyInt(i) => JsonValue::Number(i.into()),
        Value::SmallInt(i) => JsonValue::Number(i.into()),
        Value::Int(i) => JsonValue::Number(i.into()),
        Value::UTinyInt(i) => JsonValue::Number(i.into()),
        Value::USmallInt(i) => JsonValue::Number(i.into()),
        Value::UInt(i) => JsonValue::Number(i.into()),
        Value::BigInt(i) => integer_to_json(i as i128),
        Value::UBigInt(i) => integer_to_json(i as i128),
        Value::HugeInt(i) => integer_to_json(i),
        Value::Float(f) => float_to_json(f as f64),
        Value::Double(f) => float_to_json(f),
        Value::Decimal(d) => decimal_to_json(d.to_string()),
        Value::Text(s) | Value::Enum(s) => JsonValue::String(s),
        Value::Blob(b) => {
            JsonValue::String(base64::engine::general_purpose::STANDARD.encode(b))
        }
        Value::Date32(days) => DateTime::from_timestamp(days as i64 * 86_400, 0)
            .map(|dt| JsonValue::String(dt.date_naive().format("%Y-%m-%d").to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Time64(unit, v) => {
            let micros = to_micros(unit, v);
            NaiveTime::from_num_seconds_from_midnight_opt(
                micros.div_euclid(1_000_000) as u32,
                (micros.rem_euclid(1_000_000) * 1_000) as u32,
            )
            .map(|t| JsonValue::String(t.format("%H:%M:%S%.f").to_string()))
            .unwrap_or(JsonValue::Null)
        }
        Value::Timestamp(unit, v) => DateTime::from_timestamp_micros(to_micros(unit, v))
            .map(|dt| JsonValue::String(dt.format("%Y-%m-%dT%H:%M:%S%.3fZ").to_string()))
            .unwrap_or(JsonValue::Null),
        Value::Interval {
            months,
            days,
            nanos,
        } => {
            let mut interval = Map::new();
            interval.insert("months".into(), JsonValue::Number(months.into()));
            interval.insert("days".into(), JsonValue::Number(days.into()));
            interval.insert("micros".into(), integer_to_json((nanos / 1_000) as i128));
            JsonValue::Object(interval)
        }
        Value::List(items) | Value::Array(items) => {
            JsonValue::Array(items.into_iter().map(value_to_json).collect())
        }
        Value::Struct(fields) => JsonValue::Object(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), value_to_json(v.clone())))
                .collect(),
        ),
        Value::Map(entries) => JsonValue::Object(
            entries
                .iter()
                .map(|(k, v)| (map_key(k.clone()), value_to_json(v.clone())))
                .collect(),
        ),
        Value::Union(inner) => value_to_json(*inner),
        #[allow(unreachable_patterns)]
        other => JsonValue::String(format!("{:?}", other)),
    }
}

fn integer_to_json(n: i128) -> JsonValue {
    if (-(MAX_SAFE_INTEGER as i128)..=MAX_SAFE_INTEGER as i128).contains(&n) {
        JsonValue::Number((n as i64).into())
    } else {
        JsonValue::String(n.to_string())
    }
}

/// Integral decimals follow the integer rule. Fractional decimals become
/// numbers unless their integer part is already outside the safe range.
fn decimal_to_json(text: String) -> JsonValue {
    let (whole, fraction) = text.split_once('.').unwrap_or((text.as_str(), ""));
    if fraction.bytes().all(|b| b == b'0') {
        if let Ok(n) = whole.parse::<i128>() {
            return integer_to_json(n);
        }
    }
    match whole.trim_start_matches('-').parse::<u128>() {
        Ok(n) if n <= MAX_SAFE_INTEGER as u128 => text
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(JsonValue::Number)
            .unwrap_or_else(|| JsonValue::String(text)),
        _ => JsonValue::String(text),
    }
}

fn float_to_json(f: f64) -> JsonValue {
    Number::from_f64(f)
        .map(JsonValue::Number)
        .unwrap_or(JsonValue::Null)
}

fn to_micros(unit: TimeUnit, v: i64) -> i64 {
    match unit {
        TimeUnit::Second => v.saturating_mul(1_000_000),
        TimeUnit::Millisecond => v.saturating_mul(1_000),
        TimeUnit::Microsecond => v,
        TimeUnit::Nanosecond => v / 1_000,
    }
}

fn map_key(key: Value) -> String {
    match value_to_json(key) {
        JsonValue::String(s) => s,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::error::EngineError;
    use serde_json::json;

    fn executor() -> (QueryExecutor, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let session = EngineSession::open(SessionConfig::offline(dir.path())).unwrap();
        (QueryExecutor::new(Arc::new(session)), dir)
    }

    #[test]
    fn test_integer_boundaries() {
        assert_eq!(value_to_json(Value::BigInt(MAX_SAFE_INTEGER)), json!(9007199254740991i64));
        assert_eq!(
            value_to_json(Value::BigInt(MAX_SAFE_INTEGER + 1)),
            json!("9007199254740992")
        );
        assert_eq!(
            value_to_json(Value::BigInt(-MAX_SAFE_INTEGER - 1)),
            json!("-9007199254740992")
        );
        assert_eq!(value_to_json(Value::UBigInt(u64::MAX)), json!("18446744073709551615"));
        assert_eq!(value_to_json(Value::HugeInt(42)), json!(42));
        assert_eq!(
            value_to_json(Value::HugeInt(i128::MAX)),
            json!(i128::MAX.to_string())
        );
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(value_to_json(Value::Null), JsonValue::Null);
        assert_eq!(value_to_json(Value::Boolean(true)), json!(true));
        assert_eq!(value_to_json(Value::Double(1.5)), json!(1.5));
        assert_eq!(value_to_json(Value::Double(f64::NAN)), JsonValue::Null);
        assert_eq!(value_to_json(Value::Float(f32::INFINITY)), JsonValue::Null);
        assert_eq!(value_to_json(Value::Text("abc".into())), json!("abc"));
        assert_eq!(value_to_json(Value::Enum("red".into())), json!("red"));
        assert_eq!(value_to_json(Value::Blob(vec![0xde, 0xad])), json!("3q0="));
    }

    #[test]
    fn test_temporal_conversions() {
        assert_eq!(value_to_json(Value::Date32(19_724)), json!("2024-01-02"));
        assert_eq!(
            value_to_json(Value::Timestamp(TimeUnit::Microsecond, 1_704_164_645_678_000)),
            json!("2024-01-02T03:04:05.678Z")
        );
        assert_eq!(
            value_to_json(Value::Timestamp(TimeUnit::Second, 0)),
            json!("1970-01-01T00:00:00.000Z")
        );
        assert_eq!(
            value_to_json(Value::Time64(TimeUnit::Microsecond, 45_296_000_000)),
            json!("12:34:56")
        );
        assert_eq!(
            value_to_json(Value::Interval {
                months: 1,
                days: 2,
                nanos: 3_000
            }),
            json!({"months": 1, "days": 2, "micros": 3})
        );
    }

    #[test]
    fn test_nested_conversions_apply_integer_rule() {
        let list = Value::List(vec![Value::BigInt(1), Value::BigInt(i64::MAX)]);
        assert_eq!(value_to_json(list), json!([1, "9223372036854775807"]));
    }

    #[tokio::test]
    async fn test_execute_simple_select() {
        let (executor, _dir) = executor();
        let result = executor.execute("SELECT 1 AS a").await.unwrap();
        assert_eq!(result.columns, vec!["a"]);
        assert_eq!(
            serde_json::to_value(result.into_rows()).unwrap(),
            json!([{"a": 1}])
        );
        assert!(executor.session().is_initialized());
    }

    #[tokio::test]
    async fn test_execute_preserves_column_order() {
        let (executor, _dir) = executor();
        let result = executor
            .execute("SELECT 3 AS z, 'x' AS a, NULL AS m")
            .await
            .unwrap();
        let keys: Vec<&String> = result.rows[0].keys().collect();
        assert_eq!(keys, vec!["z", "a", "m"]);
        assert_eq!(result.rows[0]["m"], JsonValue::Null);
    }

    #[tokio::test]
    async fn test_execute_oversized_bigint_as_string() {
        let (executor, _dir) = executor();
        let result = executor
            .execute("SELECT 9223372036854775807::BIGINT AS big, 42::BIGINT AS small")
            .await
            .unwrap();
        assert_eq!(
            serde_json::to_value(&result.rows).unwrap(),
            json!([{"big": "9223372036854775807", "small": 42}])
        );
    }

    #[test]
    fn test_decimal_text_conversion() {
        assert_eq!(decimal_to_json("12.50".into()), json!(12.5));
        assert_eq!(decimal_to_json("-0.25".into()), json!(-0.25));
        assert_eq!(decimal_to_json("7.00".into()), json!(7));
        assert_eq!(decimal_to_json("9007199254740991".into()), json!(9007199254740991_i64));
        assert_eq!(
            decimal_to_json("9007199254740993".into()),
            json!("9007199254740993")
        );
        assert_eq!(
            decimal_to_json("-12345678901234567890.000".into()),
            json!("-12345678901234567890")
        );
        assert_eq!(
            decimal_to_json("12345678901234567890.5".into()),
            json!("12345678901234567890.5")
        );
    }

    #[tokio::test]
    async fn test_execute_decimals() {
        let (executor, _dir) = executor();
        let result = executor
            .execute(
                "SELECT 12.50::DECIMAL(10,2) AS price, \
                 9007199254740993::DECIMAL(38,0) AS big, \
                 12345678901234567890123::DECIMAL(38,0) AS bigger",
            )
            .await
            .unwrap();
        let row = &result.rows[0];
        assert_eq!(row["price"], json!(12.5));
        assert_eq!(row["big"], json!("9007199254740993"));
        assert_eq!(row["bigger"], json!("12345678901234567890123"));
    }

    #[tokio::test]
    async fn test_execute_nested_and_temporal_types() {
        let (executor, _dir) = executor();
        let result = executor
            .execute(
                "SELECT [1, 2, 3] AS l, {'k': 'v', 'n': 2} AS s, \
                 DATE '2024-01-02' AS d, TIMESTAMP '2024-01-02 03:04:05.678' AS ts, \
                 'AQI='::BLOB AS b",
            )
            .await
            .unwrap();
        let row = &result.rows[0];
        assert_eq!(row["l"], json!([1, 2, 3]));
        assert_eq!(row["s"], json!({"k": "v", "n": 2}));
        assert_eq!(row["d"], json!("2024-01-02"));
        assert_eq!(row["ts"], json!("2024-01-02T03:04:05.678Z"));
        assert_eq!(row["b"], json!("QVFJPQ=="));
    }

    #[tokio::test]
    async fn test_execute_empty_result() {
        let (executor, _dir) = executor();
        let result = executor
            .execute("SELECT * FROM range(10) WHERE range > 100")
            .await
            .unwrap();
        assert!(result.is_empty());
        assert_eq!(result.columns, vec!["range"]);
    }

    #[tokio::test]
    async fn test_rejected_statement_returns_row() {
        let (executor, _dir) = executor();
        let result = executor.execute("SET threads=1").await.unwrap();
        assert_eq!(
            serde_json::to_value(&result.rows).unwrap(),
            json!([{"error": "Using SET is disabled"}])
        );

        let result = executor.execute("INSTALL spatial").await.unwrap();
        assert_eq!(
            serde_json::to_value(&result.rows).unwrap(),
            json!([{"error": "Extension installation disabled"}])
        );
    }

    #[tokio::test]
    async fn test_syntax_error_is_execution_error() {
        let (executor, _dir) = executor();
        let err = executor.execute("SELEC 1").await.unwrap_err();
        assert!(matches!(err, EngineError::Execution(_)), "{err:?}");
        assert!(err.to_string().to_lowercase().contains("syntax"));
    }

    #[tokio::test]
    async fn test_state_persists_across_statements() {
        let (executor, _dir) = executor();
        executor
            .execute("CREATE TABLE t AS SELECT range AS id FROM range(3)")
            .await
            .unwrap();
        let result = executor.execute("SELECT count(*) AS n FROM t").await.unwrap();
        assert_eq!(result.rows[0]["n"], json!(3));
    }
}
