//! Predicate classification.
//!
//! Decides whether a statement targets specific rows by primary key (a
//! *detail* query) or anything broader (a *list* query). Anything the
//! classifier cannot prove is pinned to the primary key resolves to
//! [`RowIdentity::List`].

use rowcache_core::{BoundArg, FilterExpr, Statement};

/// Key segment used for list queries.
pub const LIST_KEY: &str = "LIST";

/// The row scope a statement touches.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowIdentity {
    /// Not provably restricted to known primary keys.
    List,
    /// Primary-key tokens in discovery order, duplicates kept.
    Rows(Vec<String>),
}

impl RowIdentity {
    /// Classify a read. Only single-row lookups (`LIMIT 1`) can be detail reads.
    pub fn for_read(stmt: &Statement) -> Self {
        classify(stmt.limit, &stmt.filters, stmt.primary_key())
    }

    /// Classify a write. Writes carry no limit, so only the filters count.
    pub fn for_write(stmt: &Statement) -> Self {
        classify_filters(&stmt.filters, stmt.primary_key())
    }

    /// Check if this is the list scope.
    pub fn is_list(&self) -> bool {
        matches!(self, Self::List)
    }

    /// Primary-key tokens, empty for lists.
    pub fn tokens(&self) -> &[String] {
        match self {
            Self::List => &[],
            Self::Rows(tokens) => tokens,
        }
    }

    /// One single-row identity per distinct token, in discovery order.
    pub fn split_rows(&self) -> Vec<RowIdentity> {
        let mut seen: Vec<&String> = Vec::new();
        for token in self.tokens() {
            if !seen.contains(&token) {
                seen.push(token);
            }
        }
        seen.into_iter()
            .map(|t| RowIdentity::Rows(vec![t.clone()]))
            .collect()
    }

    /// Key segment: `LIST` or the tokens joined by `_`.
    pub fn segment(&self) -> String {
        match self {
            Self::List => LIST_KEY.to_string(),
            Self::Rows(tokens) => tokens.join("_"),
        }
    }
}

/// Classify a read given its limit, filters and primary-key column.
pub fn classify(
    limit: Option<u64>,
    filters: &[FilterExpr],
    primary_key: Option<&str>,
) -> RowIdentity {
    if limit != Some(1) {
        return RowIdentity::List;
    }
    classify_filters(filters, primary_key)
}

/// Classify filters alone, ignoring any limit.
pub fn classify_filters(filters: &[FilterExpr], primary_key: Option<&str>) -> RowIdentity {
    let Some(pk) = primary_key else {
        return RowIdentity::List;
    };

    let mut tokens = Vec::new();
    for expr in filters {
        match expr {
            FilterExpr::Equality { column, value } if column.is_primary_key(pk) => {
                if !value.is_null() {
                    tokens.push(value.to_string());
                }
            }
            FilterExpr::Membership { column, values } if column.is_primary_key(pk) => {
                for value in values {
                    value.flatten_into(&mut tokens);
                }
            }
            FilterExpr::Raw { sql, vars } => raw_tokens(sql, vars, pk, &mut tokens),
            _ => {}
        }
    }

    if tokens.is_empty() {
        RowIdentity::List
    } else {
        RowIdentity::Rows(tokens)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RawShape {
    Eq,
    In,
}

/// Split a normalized raw expression into its shape, column and right-hand side.
///
/// This is plain substring matching: a column whose name contains `in`,
/// `and` or `or` is misread and the expression falls back to a list.
fn parse_raw(normalized: &str) -> Option<(RawShape, &str, &str)> {
    if normalized.contains("and") || normalized.contains("or") {
        return None;
    }

    if normalized.contains('=') {
        let mut parts = normalized.split('=');
        let (lhs, rhs) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        if rhs == "?" || rhs.parse::<i64>().is_ok() {
            return Some((RawShape::Eq, lhs, rhs));
        }
        return None;
    }

    if normalized.contains("in") {
        let mut parts = normalized.split("in");
        let (lhs, rhs) = (parts.next()?, parts.next()?);
        if parts.next().is_some() {
            return None;
        }
        if rhs.len() > 1 && rhs.starts_with('(') && rhs.ends_with(')') {
            return Some((RawShape::In, lhs, rhs));
        }
    }

    None
}

fn raw_tokens(sql: &str, vars: &[BoundArg], primary_key: &str, out: &mut Vec<String>) {
    let normalized: String = sql
        .chars()
        .filter(|c| !c.is_whitespace())
        .collect::<String>()
        .to_lowercase();

    let Some((shape, lhs, rhs)) = parse_raw(&normalized) else {
        return;
    };

    let column = lhs.rsplit('.').next().unwrap_or(lhs);
    if column != primary_key.to_lowercase() {
        return;
    }

    match shape {
        RawShape::Eq => {
            if rhs == "?" {
                out.extend(vars.iter().map(ToString::to_string));
            } else {
                out.push(rhs.to_string());
            }
        }
        RawShape::In => {
            let items = &rhs[1..rhs.len() - 1];
            for item in items.split(',') {
                if item == "?" {
                    for var in vars {
                        var.flatten_into(out);
                    }
                    break;
                }
                if let Ok(id) = item.parse::<i64>() {
                    out.push(id.to_string());
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowcache_core::{ColumnRef, TableSchema};

    fn users() -> Statement {
        Statement::new("users").with_schema(TableSchema::new("users").with_primary_key("id"))
    }

    fn rows(tokens: &[&str]) -> RowIdentity {
        RowIdentity::Rows(tokens.iter().map(|t| t.to_string()).collect())
    }

    #[test]
    fn test_pk_equality_with_limit_one() {
        let stmt = users()
            .filter(FilterExpr::eq(ColumnRef::named("id"), 5))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["5"]));
    }

    #[test]
    fn test_without_limit_is_list() {
        let stmt = users().filter(FilterExpr::eq(ColumnRef::named("id"), 5));
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);

        let stmt = users()
            .filter(FilterExpr::eq(ColumnRef::named("id"), 5))
            .limit(10);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_write_mode_ignores_limit() {
        let stmt = users().filter(FilterExpr::eq(ColumnRef::named("id"), 2));
        assert_eq!(RowIdentity::for_write(&stmt), rows(&["2"]));
    }

    #[test]
    fn test_non_pk_column_is_list() {
        let stmt = users()
            .filter(FilterExpr::eq(ColumnRef::named("name"), "alice"))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_missing_schema_is_list() {
        let stmt = Statement::new("users")
            .filter(FilterExpr::eq(ColumnRef::named("id"), 5))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_membership_flattens() {
        let stmt = users()
            .filter(FilterExpr::is_in(
                ColumnRef::PrimaryKey,
                vec![BoundArg::from(1), BoundArg::from(vec![2, 3]), BoundArg::Null],
            ))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["1", "2", "3"]));
    }

    #[test]
    fn test_tokens_keep_order_and_duplicates() {
        let stmt = users()
            .filter(FilterExpr::eq(ColumnRef::named("id"), 4))
            .filter(FilterExpr::eq(ColumnRef::named("name"), "x"))
            .filter(FilterExpr::is_in(ColumnRef::named("id"), [4, 1]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["4", "4", "1"]));
    }

    #[test]
    fn test_other_expression_ignored() {
        let stmt = users().filter(FilterExpr::Other).limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_raw_placeholder_equality() {
        let stmt = users()
            .filter(FilterExpr::raw("id = ?", vec![BoundArg::from(7)]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["7"]));
    }

    #[test]
    fn test_raw_literal_equality() {
        let stmt = users()
            .filter(FilterExpr::raw("ID = 12", vec![]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["12"]));
    }

    #[test]
    fn test_raw_qualified_membership_expands_list_var() {
        let stmt = users()
            .filter(FilterExpr::raw(
                "users.id IN (?)",
                vec![BoundArg::from(vec![3, 4])],
            ))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["3", "4"]));
    }

    #[test]
    fn test_raw_literal_membership_normalizes() {
        let stmt = users()
            .filter(FilterExpr::raw("id in (01, 2, abc)", vec![]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["1", "2"]));
    }

    #[test]
    fn test_raw_connector_is_list() {
        let stmt = users()
            .filter(FilterExpr::raw("id = 1 and name = ?", vec![BoundArg::from("x")]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_raw_non_numeric_equality_is_list() {
        let stmt = users()
            .filter(FilterExpr::raw("id = 'abc'", vec![]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_raw_other_column_is_list() {
        let stmt = users()
            .filter(FilterExpr::raw("age = ?", vec![BoundArg::from(30)]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);
    }

    #[test]
    fn test_null_equality_adds_no_token() {
        let stmt = users()
            .filter(FilterExpr::eq(ColumnRef::PrimaryKey, BoundArg::Null))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), RowIdentity::List);

        let stmt = users()
            .filter(FilterExpr::eq(ColumnRef::PrimaryKey, BoundArg::Null))
            .filter(FilterExpr::is_in(ColumnRef::PrimaryKey, [8]))
            .limit(1);
        assert_eq!(RowIdentity::for_read(&stmt), rows(&["8"]));
    }

    #[test]
    fn test_split_rows_dedups_in_order() {
        assert_eq!(
            rows(&["4", "4", "1"]).split_rows(),
            vec![rows(&["4"]), rows(&["1"])]
        );
        assert!(RowIdentity::List.split_rows().is_empty());
    }

    #[test]
    fn test_segment() {
        assert_eq!(RowIdentity::List.segment(), "LIST");
        assert_eq!(rows(&["1", "2"]).segment(), "1_2");
        assert!(RowIdentity::List.tokens().is_empty());
    }
}
