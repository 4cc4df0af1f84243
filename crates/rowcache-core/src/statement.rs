//! Statement introspection model.
//!
//! The host translates its pending query into a [`Statement`] so the cache
//! can classify it and derive keys without understanding the query engine.

use crate::value::BoundArg;

/// Whether a statement participates in caching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// Use the cache when the layer and table allow it.
    #[default]
    Default,
    /// The caller opted out; always execute directly.
    Bypass,
}

/// Schema metadata for the statement's table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    /// Table name as known to the schema.
    pub table: String,
    /// Primary key column name, if the table has one.
    pub primary_key: Option<String>,
}

impl TableSchema {
    /// Create schema metadata for a table.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            primary_key: None,
        }
    }

    /// Set the primary key column.
    pub fn with_primary_key(mut self, column: impl Into<String>) -> Self {
        self.primary_key = Some(column.into());
        self
    }
}

/// A column referenced by a filter expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnRef {
    /// The table's primary key, whatever its name.
    PrimaryKey,
    /// A named column, optionally qualified with a table.
    Named {
        table: Option<String>,
        name: String,
    },
}

impl ColumnRef {
    /// Reference a column by name.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named {
            table: None,
            name: name.into(),
        }
    }

    /// Reference a table-qualified column.
    pub fn qualified(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Named {
            table: Some(table.into()),
            name: name.into(),
        }
    }

    /// Check if this column is the primary key named `primary_key`.
    pub fn is_primary_key(&self, primary_key: &str) -> bool {
        match self {
            Self::PrimaryKey => true,
            Self::Named { name, .. } => name == primary_key,
        }
    }
}

/// One top-level expression of a statement's filter clause.
///
/// Multiple expressions on a statement are implicitly AND-ed.
#[derive(Debug, Clone, PartialEq)]
pub enum FilterExpr {
    /// `column = value`
    Equality { column: ColumnRef, value: BoundArg },
    /// `column IN (values...)`
    Membership {
        column: ColumnRef,
        values: Vec<BoundArg>,
    },
    /// Opaque SQL fragment with its own bound variables.
    Raw { sql: String, vars: Vec<BoundArg> },
    /// Anything else (ranges, LIKE, NOT, sub-queries...).
    Other,
}

impl FilterExpr {
    /// Create an equality expression.
    pub fn eq(column: ColumnRef, value: impl Into<BoundArg>) -> Self {
        Self::Equality {
            column,
            value: value.into(),
        }
    }

    /// Create a membership expression.
    pub fn is_in<I, T>(column: ColumnRef, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BoundArg>,
    {
        Self::Membership {
            column,
            values: values.into_iter().map(Into::into).collect(),
        }
    }

    /// Create a raw SQL expression.
    pub fn raw(sql: impl Into<String>, vars: Vec<BoundArg>) -> Self {
        Self::Raw {
            sql: sql.into(),
            vars,
        }
    }
}

/// Read access to a pending query.
#[derive(Debug, Clone, Default)]
pub struct Statement {
    /// Table name as set on the query.
    pub table: String,
    /// Schema of the model the query targets.
    pub schema: Option<TableSchema>,
    /// Top-level filter expressions.
    pub filters: Vec<FilterExpr>,
    /// Row limit, if any.
    pub limit: Option<u64>,
    /// Arguments bound to the rendered statement.
    pub args: Vec<BoundArg>,
    /// Rendered statement text.
    pub sql: String,
    /// Caller's cache preference.
    pub mode: CacheMode,
}

impl Statement {
    /// Create a statement against `table`.
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            ..Default::default()
        }
    }

    /// Attach schema metadata.
    pub fn with_schema(mut self, schema: TableSchema) -> Self {
        self.schema = Some(schema);
        self
    }

    /// Add a filter expression.
    pub fn filter(mut self, expr: FilterExpr) -> Self {
        self.filters.push(expr);
        self
    }

    /// Set the row limit.
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Set the rendered SQL text.
    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = sql.into();
        self
    }

    /// Bind an argument.
    pub fn arg(mut self, arg: impl Into<BoundArg>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Bind several arguments.
    pub fn args<I, T>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<BoundArg>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Opt this statement out of caching.
    pub fn bypass_cache(mut self) -> Self {
        self.mode = CacheMode::Bypass;
        self
    }

    /// Table name used in cache keys: the schema table when present.
    pub fn table_name(&self) -> &str {
        match &self.schema {
            Some(schema) => &schema.table,
            None => &self.table,
        }
    }

    /// Primary key column of the target table.
    pub fn primary_key(&self) -> Option<&str> {
        self.schema
            .as_ref()
            .and_then(|s| s.primary_key.as_deref())
            .filter(|pk| !pk.is_empty())
    }
}
