//! SQL rendering for the supported dialects.

use super::ast::{
    AggregateFunc, ColumnRef, Delete, Expr, Insert, Join, Select, TableRef, Update,
};
use crate::error::Error;
use ormapi_proto::Value;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Target SQL dialect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Dialect {
    /// SQLite: `?` placeholders, `LIKE`, `REGEXP`, `json_each` array overlap.
    #[default]
    Sqlite,
    /// PostgreSQL: `$n` placeholders, `ILIKE`, `~`, `&&` array overlap.
    Postgres,
}

impl Dialect {
    /// Dialect name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Dialect::Sqlite => "sqlite",
            Dialect::Postgres => "postgres",
        }
    }
}

impl fmt::Display for Dialect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Dialect {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "sqlite" => Ok(Dialect::Sqlite),
            "postgres" | "postgresql" | "pg" => Ok(Dialect::Postgres),
            other => Err(Error::Configuration(format!("unknown SQL dialect '{}'", other))),
        }
    }
}

/// Rendered statement text with its bound parameters in placeholder order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompiledSql {
    pub sql: String,
    pub params: Vec<Value>,
}

impl CompiledSql {
    /// A statement without parameters.
    pub fn raw(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }
}

impl fmt::Display for CompiledSql {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

/// Statements that render to SQL.
pub trait Compile {
    /// Render for a dialect.
    fn compile(&self, dialect: Dialect) -> CompiledSql;
}

impl Compile for Select {
    fn compile(&self, dialect: Dialect) -> CompiledSql {
        let mut w = Writer::new(dialect);
        w.select(self);
        w.finish()
    }
}

impl Compile for Insert {
    fn compile(&self, dialect: Dialect) -> CompiledSql {
        let mut w = Writer::new(dialect);
        w.insert(self);
        w.finish()
    }
}

impl Compile for Update {
    fn compile(&self, dialect: Dialect) -> CompiledSql {
        let mut w = Writer::new(dialect);
        w.update(self);
        w.finish()
    }
}

impl Compile for Delete {
    fn compile(&self, dialect: Dialect) -> CompiledSql {
        let mut w = Writer::new(dialect);
        w.delete(self);
        w.finish()
    }
}

/// Quote an identifier.
pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

struct Writer {
    dialect: Dialect,
    sql: String,
    params: Vec<Value>,
}

impl Writer {
    fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn finish(self) -> CompiledSql {
        CompiledSql {
            sql: self.sql,
            params: self.params,
        }
    }

    fn push(&mut self, text: &str) {
        self.sql.push_str(text);
    }

    fn ident(&mut self, ident: &str) {
        self.sql.push_str(&quote(ident));
    }

    fn param(&mut self, value: &Value) {
        self.params.push(value.clone());
        match self.dialect {
            Dialect::Sqlite => self.sql.push('?'),
            Dialect::Postgres => {
                let n = self.params.len();
                self.sql.push_str(&format!("${}", n));
            }
        }
    }

    fn params(&mut self, values: &[Value]) {
        for (i, value) in values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.param(value);
        }
    }

    fn column(&mut self, column: &ColumnRef) {
        if let Some(table) = &column.table {
            self.ident(table);
            self.push(".");
        }
        self.ident(&column.name);
    }

    fn select(&mut self, select: &Select) {
        self.push("SELECT ");
        if select.distinct {
            self.push("DISTINCT ");
        }
        if select.projection.is_empty() {
            self.push("*");
        }
        for (i, item) in select.projection.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(&item.expr);
            if let Some(alias) = &item.alias {
                self.push(" AS ");
                self.ident(alias);
            }
        }
        self.push(" FROM ");
        match &select.from {
            TableRef::Table { name, alias } => self.table(name, alias),
            TableRef::Subquery { select, alias } => {
                self.push("(");
                self.select(select);
                self.push(") AS ");
                self.ident(alias);
            }
        }
        for join in &select.joins {
            self.join(join);
        }
        self.where_clause(&select.filter);
        if !select.group_by.is_empty() {
            self.push(" GROUP BY ");
            self.list(&select.group_by);
        }
        if !select.order_by.is_empty() {
            self.push(" ORDER BY ");
            for (i, item) in select.order_by.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.expr(&item.expr);
                self.push(" ");
                self.push(item.direction.as_sql());
            }
        }
        // both dialects take signed 64-bit row counts
        let bound = |n: u64| n.min(i64::MAX as u64);
        match (select.limit.map(bound), select.offset.map(bound)) {
            (Some(limit), offset) => {
                self.push(&format!(" LIMIT {}", limit));
                if let Some(offset) = offset.filter(|o| *o > 0) {
                    self.push(&format!(" OFFSET {}", offset));
                }
            }
            // SQLite requires a LIMIT before OFFSET.
            (None, Some(offset)) if offset > 0 => match self.dialect {
                Dialect::Sqlite => self.push(&format!(" LIMIT -1 OFFSET {}", offset)),
                Dialect::Postgres => self.push(&format!(" OFFSET {}", offset)),
            },
            _ => {}
        }
    }

    fn table(&mut self, name: &str, alias: &str) {
        self.ident(name);
        if name != alias {
            self.push(" AS ");
            self.ident(alias);
        }
    }

    fn join(&mut self, join: &Join) {
        self.push(" LEFT JOIN ");
        self.table(&join.table, &join.alias);
        self.push(" ON ");
        self.expr(&join.on);
    }

    fn where_clause(&mut self, filter: &[Expr]) {
        if filter.is_empty() {
            return;
        }
        self.push(" WHERE ");
        for (i, condition) in filter.iter().enumerate() {
            if i > 0 {
                self.push(" AND ");
            }
            self.nested(condition);
        }
    }

    fn list(&mut self, exprs: &[Expr]) {
        for (i, expr) in exprs.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.expr(expr);
        }
    }

    /// Render an operand of AND/OR, parenthesising nested disjunctions.
    fn nested(&mut self, expr: &Expr) {
        match expr {
            Expr::Or(items) if items.len() > 1 => {
                self.push("(");
                self.expr(expr);
                self.push(")");
            }
            Expr::And(items) if items.len() > 1 => {
                self.push("(");
                self.expr(expr);
                self.push(")");
            }
            _ => self.expr(expr),
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Column(column) => self.column(column),
            Expr::Value(value) => self.param(value),
            Expr::One => self.push("1"),
            Expr::IsNull { expr, negated } => {
                self.expr(expr);
                self.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Expr::Compare { left, op, right } => {
                self.expr(left);
                self.push(" ");
                self.push(op.as_sql());
                self.push(" ");
                self.expr(right);
            }
            Expr::InList {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    self.push(if *negated { "1 = 1" } else { "1 = 0" });
                    return;
                }
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.params(list);
                self.push(")");
            }
            Expr::InSubquery {
                expr,
                subquery,
                negated,
            } => {
                self.expr(expr);
                self.push(if *negated { " NOT IN (" } else { " IN (" });
                self.select(subquery);
                self.push(")");
            }
            Expr::Like { expr, pattern } => {
                self.expr(expr);
                self.push(match self.dialect {
                    Dialect::Sqlite => " LIKE ",
                    Dialect::Postgres => " ILIKE ",
                });
                self.param(pattern);
            }
            Expr::Regexp { expr, pattern } => {
                self.expr(expr);
                self.push(match self.dialect {
                    Dialect::Sqlite => " REGEXP ",
                    Dialect::Postgres => " ~ ",
                });
                self.param(pattern);
            }
            Expr::Overlaps { expr, values } => {
                if values.is_empty() {
                    self.push("1 = 0");
                    return;
                }
                match self.dialect {
                    Dialect::Sqlite => {
                        self.push("EXISTS (SELECT 1 FROM json_each(");
                        self.expr(expr);
                        self.push(") WHERE json_each.value IN (");
                        self.params(values);
                        self.push("))");
                    }
                    Dialect::Postgres => {
                        self.expr(expr);
                        self.push(" && ARRAY[");
                        self.params(values);
                        self.push("]");
                    }
                }
            }
            Expr::Exists { subquery, negated } => {
                self.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.select(subquery);
                self.push(")");
            }
            Expr::And(items) => {
                if items.is_empty() {
                    self.push("1 = 1");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(" AND ");
                    }
                    self.nested(item);
                }
            }
            Expr::Or(items) => {
                if items.is_empty() {
                    self.push("1 = 0");
                }
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        self.push(" OR ");
                    }
                    self.nested(item);
                }
            }
            Expr::Aggregate {
                func,
                expr,
                distinct,
            } => {
                self.push(match func {
                    AggregateFunc::Count => "COUNT(",
                    AggregateFunc::Min => "MIN(",
                    AggregateFunc::Max => "MAX(",
                });
                if *distinct {
                    self.push("DISTINCT ");
                }
                self.expr(expr);
                self.push(")");
            }
        }
    }

    fn insert(&mut self, insert: &Insert) {
        self.push("INSERT INTO ");
        self.ident(&insert.table);
        if insert.columns.is_empty() {
            self.push(" DEFAULT VALUES");
        } else {
            self.push(" (");
            for (i, column) in insert.columns.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.ident(column);
            }
            self.push(") VALUES ");
            for (i, row) in insert.rows.iter().enumerate() {
                if i > 0 {
                    self.push(", ");
                }
                self.push("(");
                self.params(row);
                self.push(")");
            }
        }
        if let Some(column) = &insert.returning {
            self.push(" RETURNING ");
            self.ident(column);
        }
    }

    fn update(&mut self, update: &Update) {
        self.push("UPDATE ");
        self.ident(&update.table);
        self.push(" SET ");
        for (i, (column, value)) in update.assignments.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.ident(column);
            self.push(" = ");
            self.param(value);
        }
        self.where_clause(&update.filter);
    }

    fn delete(&mut self, delete: &Delete) {
        self.push("DELETE FROM ");
        self.ident(&delete.table);
        self.where_clause(&delete.filter);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sql::ast::CompareOp;
    use ormapi_proto::SortDirection;

    #[test]
    fn test_select_with_join_and_order() {
        let select = Select::from_table("users", "users")
            .column(Expr::col("users", "id"))
            .left_join(
                "comments",
                "comments",
                Expr::col("comments", "user_id").eq(Expr::col("users", "id")),
            )
            .filter(Expr::col("users", "login").eq(Expr::value("ann")))
            .order_by(Expr::col("users", "id"), SortDirection::Desc);

        let sqlite = select.compile(Dialect::Sqlite);
        assert_eq!(
            sqlite.sql,
            "SELECT \"users\".\"id\" FROM \"users\" LEFT JOIN \"comments\" ON \"comments\".\"user_id\" = \"users\".\"id\" WHERE \"users\".\"login\" = ? ORDER BY \"users\".\"id\" DESC"
        );
        assert_eq!(sqlite.params, vec![Value::from("ann")]);
    }

    #[test]
    fn test_postgres_placeholders_are_numbered() {
        let select = Select::from_table("users", "u")
            .column(Expr::One)
            .filter(Expr::col("u", "age").compare(CompareOp::Gt, Expr::value(18)))
            .filter(Expr::col("u", "id").in_list(vec![Value::Int(1), Value::Int(2)]));

        let pg = select.compile(Dialect::Postgres);
        assert_eq!(
            pg.sql,
            "SELECT 1 FROM \"users\" AS \"u\" WHERE \"u\".\"age\" > $1 AND \"u\".\"id\" IN ($2, $3)"
        );
        assert_eq!(pg.params.len(), 3);
    }

    #[test]
    fn test_dialect_specific_operators() {
        let like = Expr::Like {
            expr: Box::new(Expr::col("u", "login")),
            pattern: Value::from("%an%"),
        };
        let overlaps = Expr::Overlaps {
            expr: Box::new(Expr::col("u", "tags")),
            values: vec![Value::from("a")],
        };
        let select = Select::from_table("users", "u")
            .column(Expr::One)
            .filter(like)
            .filter(overlaps);

        assert_eq!(
            select.compile(Dialect::Sqlite).sql,
            "SELECT 1 FROM \"users\" AS \"u\" WHERE \"u\".\"login\" LIKE ? AND EXISTS (SELECT 1 FROM json_each(\"u\".\"tags\") WHERE json_each.value IN (?))"
        );
        assert_eq!(
            select.compile(Dialect::Postgres).sql,
            "SELECT 1 FROM \"users\" AS \"u\" WHERE \"u\".\"login\" ILIKE $1 AND \"u\".\"tags\" && ARRAY[$2]"
        );
    }

    #[test]
    fn test_empty_in_list() {
        let select = Select::from_table("t", "t")
            .column(Expr::One)
            .filter(Expr::col("t", "id").in_list(vec![]))
            .filter(Expr::col("t", "id").not_in_list(vec![]));
        assert_eq!(
            select.compile(Dialect::Sqlite).sql,
            "SELECT 1 FROM \"t\" WHERE 1 = 0 AND 1 = 1"
        );
    }

    #[test]
    fn test_limit_offset() {
        let mut select = Select::from_table("t", "t").column(Expr::col("t", "id"));
        select.limit = Some(10);
        select.offset = Some(20);
        assert!(select.compile(Dialect::Sqlite).sql.ends_with(" LIMIT 10 OFFSET 20"));
        select.offset = Some(0);
        assert!(select.compile(Dialect::Sqlite).sql.ends_with(" LIMIT 10"));
        select.limit = Some(u64::MAX);
        select.offset = Some(u64::MAX);
        assert!(select
            .compile(Dialect::Postgres)
            .sql
            .ends_with(" LIMIT 9223372036854775807 OFFSET 9223372036854775807"));
    }

    #[test]
    fn test_writes() {
        let insert = Insert::row(
            "users",
            vec![("login".to_string(), Value::from("ann")), ("age".to_string(), Value::Int(3))],
        )
        .returning("id");
        assert_eq!(
            insert.compile(Dialect::Postgres).sql,
            "INSERT INTO \"users\" (\"login\", \"age\") VALUES ($1, $2) RETURNING \"id\""
        );
        assert_eq!(
            Insert::into_table("users").compile(Dialect::Sqlite).sql,
            "INSERT INTO \"users\" DEFAULT VALUES"
        );

        let update = Update::table("users")
            .set("manager_id", Value::Null)
            .filter(Expr::bare("id").eq(Expr::value(7)));
        assert_eq!(
            update.compile(Dialect::Sqlite).sql,
            "UPDATE \"users\" SET \"manager_id\" = ? WHERE \"id\" = ?"
        );

        let delete = Delete::from_table("users_have_roles")
            .filter(Expr::bare("user_id").eq(Expr::value(1)))
            .filter(Expr::bare("role_id").in_list(vec![Value::Int(2)]));
        let compiled = delete.compile(Dialect::Postgres);
        assert_eq!(
            compiled.sql,
            "DELETE FROM \"users_have_roles\" WHERE \"user_id\" = $1 AND \"role_id\" IN ($2)"
        );
        assert_eq!(compiled.params, vec![Value::Int(1), Value::Int(2)]);
    }

    #[test]
    fn test_dialect_parse() {
        assert_eq!("postgres".parse::<Dialect>().unwrap(), Dialect::Postgres);
        assert_eq!("SQLite".parse::<Dialect>().unwrap(), Dialect::Sqlite);
        assert!("oracle".parse::<Dialect>().is_err());
    }
}
