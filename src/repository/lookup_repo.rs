// ==========================================
// 商业案例计算引擎 - 公式查表数据源
// ==========================================
// 职责: 为公式 lookup 变量提供单列点查
// 约束: 表名/列名来自公式定义，不可参数化；
//       仅接受 [A-Za-z_][A-Za-z0-9_]* 并以双引号包裹
// ==========================================

use crate::engine::formula::LookupSource;
use crate::repository::error::RepositoryError;
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::error::Error;

/// 基于 SQLite 连接的查表数据源
///
/// 借用调用方已持有的连接（通常为事务），不另行加锁。
pub struct SqliteLookupSource<'a> {
    conn: &'a Connection,
}

impl<'a> SqliteLookupSource<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl<'a> LookupSource for SqliteLookupSource<'a> {
    fn lookup(
        &self,
        table: &str,
        key_column: &str,
        value_column: &str,
        key: &Value,
    ) -> Result<Option<Value>, Box<dyn Error + Send + Sync>> {
        let sql = format!(
            "SELECT {} FROM {} WHERE {} = ?1 LIMIT 1",
            quote_identifier(value_column)?,
            quote_identifier(table)?,
            quote_identifier(key_column)?,
        );

        let key_param = json_to_sql(key)?;
        let value = self
            .conn
            .query_row(&sql, params![key_param], |row| {
                Ok(match row.get_ref(0)? {
                    ValueRef::Null => None,
                    ValueRef::Integer(i) => Some(Value::from(i)),
                    ValueRef::Real(f) => Some(Value::from(f)),
                    ValueRef::Text(t) => Some(Value::String(String::from_utf8_lossy(t).into_owned())),
                    ValueRef::Blob(_) => None,
                })
            })
            .optional()
            .map_err(RepositoryError::from)?;

        Ok(value.flatten())
    }
}

/// 校验并引用 SQL 标识符
fn quote_identifier(ident: &str) -> Result<String, RepositoryError> {
    let mut chars = ident.chars();
    let valid = match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        _ => false,
    };
    if !valid {
        return Err(RepositoryError::InvalidIdentifier(ident.to_string()));
    }
    Ok(format!("\"{}\"", ident))
}

fn json_to_sql(value: &Value) -> Result<SqlValue, RepositoryError> {
    match value {
        Value::String(s) => Ok(SqlValue::Text(s.clone())),
        Value::Bool(b) => Ok(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Ok(SqlValue::Integer(i)),
            None => Ok(SqlValue::Real(n.as_f64().unwrap_or_default())),
        },
        other => Err(RepositoryError::DataFormatError {
            field: "lookup_key".to_string(),
            message: format!("不支持的查表键类型: {}", other),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_schema;
    use serde_json::json;

    fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO catalog_determinations (id, name, cost_per_test) VALUES ('det-1', '葡萄糖', 1.25)",
            [],
        )
        .unwrap();
        conn
    }

    #[test]
    fn test_lookup_hit() {
        let conn = setup();
        let source = SqliteLookupSource::new(&conn);
        let value = source
            .lookup("catalog_determinations", "id", "cost_per_test", &json!("det-1"))
            .unwrap();
        assert_eq!(value, Some(json!(1.25)));
    }

    #[test]
    fn test_lookup_miss_and_null() {
        let conn = setup();
        let source = SqliteLookupSource::new(&conn);
        assert_eq!(
            source
                .lookup("catalog_determinations", "id", "cost_per_test", &json!("det-x"))
                .unwrap(),
            None
        );
        assert_eq!(
            source
                .lookup("catalog_determinations", "id", "wash_cycles", &json!("det-1"))
                .unwrap(),
            None
        );
    }

    #[test]
    fn test_lookup_rejects_injected_identifiers() {
        let conn = setup();
        let source = SqliteLookupSource::new(&conn);
        assert!(source
            .lookup("catalog_determinations; DROP TABLE equipment", "id", "cost_per_test", &json!("det-1"))
            .is_err());
        assert!(source
            .lookup("catalog_determinations", "id", "cost_per_test\"", &json!("det-1"))
            .is_err());
    }

    #[test]
    fn test_lookup_unknown_table_is_error() {
        let conn = setup();
        let source = SqliteLookupSource::new(&conn);
        assert!(source
            .lookup("no_such_table", "id", "value", &json!("x"))
            .is_err());
    }
}
