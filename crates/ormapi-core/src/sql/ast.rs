//! Relational statement IR.
//!
//! The compilers build these nodes; [`super::render`] turns them into
//! parameterised SQL for a concrete dialect. Literals never appear inline in
//! rendered text, they always travel as bound parameters.

use ormapi_proto::{SortDirection, Value};

/// A column, optionally qualified by a table alias.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnRef {
    /// Table alias; `None` renders the bare column name.
    pub table: Option<String>,
    /// Column name.
    pub name: String,
}

impl ColumnRef {
    /// Qualified column reference.
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Unqualified column reference.
    pub fn bare(name: impl Into<String>) -> Self {
        Self {
            table: None,
            name: name.into(),
        }
    }
}

/// Binary comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

impl CompareOp {
    pub(crate) fn as_sql(&self) -> &'static str {
        match self {
            CompareOp::Eq => "=",
            CompareOp::Ne => "<>",
            CompareOp::Lt => "<",
            CompareOp::Le => "<=",
            CompareOp::Gt => ">",
            CompareOp::Ge => ">=",
        }
    }
}

/// Aggregate functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Min,
    Max,
}

/// Scalar and boolean expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Column reference.
    Column(ColumnRef),
    /// Bound literal.
    Value(Value),
    /// The constant `1`, used by `SELECT 1` in existence probes.
    One,
    /// `expr IS [NOT] NULL`.
    IsNull { expr: Box<Expr>, negated: bool },
    /// `left op right`.
    Compare {
        left: Box<Expr>,
        op: CompareOp,
        right: Box<Expr>,
    },
    /// `expr [NOT] IN (values)`; an empty list is constant false (true when negated).
    InList {
        expr: Box<Expr>,
        list: Vec<Value>,
        negated: bool,
    },
    /// `expr [NOT] IN (subquery)`.
    InSubquery {
        expr: Box<Expr>,
        subquery: Box<Select>,
        negated: bool,
    },
    /// Case-insensitive pattern match.
    Like { expr: Box<Expr>, pattern: Value },
    /// Regular expression match.
    Regexp { expr: Box<Expr>, pattern: Value },
    /// Array column shares at least one element with the list.
    Overlaps { expr: Box<Expr>, values: Vec<Value> },
    /// `[NOT] EXISTS (subquery)`.
    Exists { subquery: Box<Select>, negated: bool },
    /// Conjunction; empty is constant true.
    And(Vec<Expr>),
    /// Disjunction; empty is constant false.
    Or(Vec<Expr>),
    /// Aggregate call.
    Aggregate {
        func: AggregateFunc,
        expr: Box<Expr>,
        distinct: bool,
    },
}

impl Expr {
    /// Qualified column expression.
    pub fn col(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::new(table, name))
    }

    /// Unqualified column expression.
    pub fn bare(name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef::bare(name))
    }

    /// Bound literal.
    pub fn value(value: impl Into<Value>) -> Self {
        Expr::Value(value.into())
    }

    pub fn eq(self, right: Expr) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    pub fn compare(self, op: CompareOp, right: Expr) -> Self {
        Expr::Compare {
            left: Box::new(self),
            op,
            right: Box::new(right),
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn in_list(self, list: Vec<Value>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: false,
        }
    }

    pub fn not_in_list(self, list: Vec<Value>) -> Self {
        Expr::InList {
            expr: Box::new(self),
            list,
            negated: true,
        }
    }

    pub fn in_subquery(self, subquery: Select) -> Self {
        Expr::InSubquery {
            expr: Box::new(self),
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn exists(subquery: Select) -> Self {
        Expr::Exists {
            subquery: Box::new(subquery),
            negated: false,
        }
    }

    pub fn not_exists(subquery: Select) -> Self {
        Expr::Exists {
            subquery: Box::new(subquery),
            negated: true,
        }
    }

    pub fn aggregate(func: AggregateFunc, expr: Expr) -> Self {
        Expr::Aggregate {
            func,
            expr: Box::new(expr),
            distinct: false,
        }
    }

    pub fn count_distinct(expr: Expr) -> Self {
        Expr::Aggregate {
            func: AggregateFunc::Count,
            expr: Box::new(expr),
            distinct: true,
        }
    }

    /// Fold a list of conditions into one conjunction.
    pub fn all(mut conditions: Vec<Expr>) -> Self {
        if conditions.len() == 1 {
            conditions.remove(0)
        } else {
            Expr::And(conditions)
        }
    }
}

/// One projected expression.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectItem {
    pub expr: Expr,
    pub alias: Option<String>,
}

/// A FROM source.
#[derive(Debug, Clone, PartialEq)]
pub enum TableRef {
    /// Base table with alias.
    Table { name: String, alias: String },
    /// Derived table.
    Subquery { select: Box<Select>, alias: String },
}

impl TableRef {
    pub fn table(name: impl Into<String>, alias: impl Into<String>) -> Self {
        TableRef::Table {
            name: name.into(),
            alias: alias.into(),
        }
    }

    pub fn alias(&self) -> &str {
        match self {
            TableRef::Table { alias, .. } | TableRef::Subquery { alias, .. } => alias,
        }
    }
}

/// A `LEFT JOIN`.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub table: String,
    pub alias: String,
    pub on: Expr,
}

/// One ORDER BY term.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub expr: Expr,
    pub direction: SortDirection,
}

/// `SELECT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub distinct: bool,
    pub projection: Vec<SelectItem>,
    pub from: TableRef,
    pub joins: Vec<Join>,
    /// Conditions joined with AND.
    pub filter: Vec<Expr>,
    pub group_by: Vec<Expr>,
    pub order_by: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    /// Empty select over a source.
    pub fn from(from: TableRef) -> Self {
        Self {
            distinct: false,
            projection: Vec::new(),
            from,
            joins: Vec::new(),
            filter: Vec::new(),
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Empty select over a base table.
    pub fn from_table(table: impl Into<String>, alias: impl Into<String>) -> Self {
        Self::from(TableRef::table(table, alias))
    }

    pub fn column(mut self, expr: Expr) -> Self {
        self.projection.push(SelectItem { expr, alias: None });
        self
    }

    pub fn column_as(mut self, expr: Expr, alias: impl Into<String>) -> Self {
        self.projection.push(SelectItem {
            expr,
            alias: Some(alias.into()),
        });
        self
    }

    pub fn left_join(mut self, table: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        self.joins.push(Join {
            table: table.into(),
            alias: alias.into(),
            on,
        });
        self
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter.push(condition);
        self
    }

    pub fn filters(mut self, conditions: impl IntoIterator<Item = Expr>) -> Self {
        self.filter.extend(conditions);
        self
    }

    pub fn order_by(mut self, expr: Expr, direction: SortDirection) -> Self {
        self.order_by.push(OrderItem { expr, direction });
        self
    }

    /// Check whether a join with this alias is already present.
    pub fn has_join(&self, alias: &str) -> bool {
        self.joins.iter().any(|j| j.alias == alias)
    }
}

/// `INSERT` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub columns: Vec<String>,
    /// One entry per row, each as long as `columns`.
    pub rows: Vec<Vec<Value>>,
    /// Column to return from the inserted row.
    pub returning: Option<String>,
}

impl Insert {
    pub fn into_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            columns: Vec::new(),
            rows: Vec::new(),
            returning: None,
        }
    }

    /// Single-row insert from column/value pairs.
    pub fn row(table: impl Into<String>, values: Vec<(String, Value)>) -> Self {
        let (columns, row): (Vec<_>, Vec<_>) = values.into_iter().unzip();
        Self {
            table: table.into(),
            columns,
            rows: vec![row],
            returning: None,
        }
    }

    pub fn returning(mut self, column: impl Into<String>) -> Self {
        self.returning = Some(column.into());
        self
    }
}

/// `UPDATE` statement. Filters use bare column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub filter: Vec<Expr>,
}

impl Update {
    pub fn table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            assignments: Vec::new(),
            filter: Vec::new(),
        }
    }

    pub fn set(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.push((column.into(), value.into()));
        self
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter.push(condition);
        self
    }
}

/// `DELETE` statement. Filters use bare column names.
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Vec<Expr>,
}

impl Delete {
    pub fn from_table(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: Vec::new(),
        }
    }

    pub fn filter(mut self, condition: Expr) -> Self {
        self.filter.push(condition);
        self
    }
}
