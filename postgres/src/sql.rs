//! Translation of [`Filter`] and [`Query`] into SQL over a JSONB `doc` column.
//!
//! Field names are inlined as JSON path literals; values always go through
//! bind parameters. Callers validate names with
//! [`book_exchange_core::store::validate_query`] before building.

use book_exchange_core::query::{Direction, Filter, Query};
use sqlx::types::Json;
use sqlx::{Postgres, QueryBuilder};

/// Append a boolean SQL expression equivalent to `filter.matches(doc)`.
pub(crate) fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &Filter) {
    match filter {
        Filter::All => {
            qb.push("TRUE");
        }
        Filter::Eq(field, value) => {
            qb.push(format!("doc->'{field}' = "));
            qb.push_bind(Json(value.clone()));
        }
        Filter::Contains(field, value) => {
            qb.push(format!(
                "(jsonb_typeof(doc->'{field}') = 'array' AND doc->'{field}' @> jsonb_build_array("
            ));
            qb.push_bind(Json(value.clone()));
            qb.push("))");
        }
        Filter::Like(field, text) => {
            qb.push(format!(
                "(jsonb_typeof(doc->'{field}') = 'string' AND doc->>'{field}' ILIKE "
            ));
            qb.push_bind(like_pattern(text));
            qb.push(" ESCAPE '\\')");
        }
        Filter::And(filters) => push_joined(qb, filters, " AND ", "TRUE"),
        Filter::Or(filters) => push_joined(qb, filters, " OR ", "FALSE"),
    }
}

fn push_joined(qb: &mut QueryBuilder<'_, Postgres>, filters: &[Filter], op: &str, empty: &str) {
    if filters.is_empty() {
        qb.push(empty);
        return;
    }
    qb.push("(");
    for (i, filter) in filters.iter().enumerate() {
        if i > 0 {
            qb.push(op);
        }
        push_filter(qb, filter);
    }
    qb.push(")");
}

/// Append `WHERE`, `ORDER BY` and `LIMIT` clauses for a query.
///
/// Missing fields sort like JSON `null`: first ascending, last descending.
/// Ties keep insertion order.
pub(crate) fn push_query(qb: &mut QueryBuilder<'_, Postgres>, query: &Query) {
    qb.push(" WHERE ");
    push_filter(qb, &query.filter);

    qb.push(" ORDER BY ");
    if let Some(sort) = &query.sort {
        let direction = match sort.direction {
            Direction::Ascending => "ASC NULLS FIRST",
            Direction::Descending => "DESC NULLS LAST",
        };
        qb.push(format!("doc->'{}' {direction}, ", sort.field));
    }
    qb.push("seq ASC");

    if let Some(limit) = query.limit {
        qb.push(" LIMIT ");
        qb.push_bind(i64::try_from(limit).unwrap_or(i64::MAX));
    }
}

/// `ILIKE` pattern matching `text` anywhere, with wildcards in `text` escaped.
pub(crate) fn like_pattern(text: &str) -> String {
    let mut pattern = String::with_capacity(text.len() + 2);
    pattern.push('%');
    for c in text.chars() {
        if matches!(c, '%' | '_' | '\\') {
            pattern.push('\\');
        }
        pattern.push(c);
    }
    pattern.push('%');
    pattern
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sql_for(query: &Query) -> String {
        let mut qb = QueryBuilder::<Postgres>::new("SELECT doc FROM books");
        push_query(&mut qb, query);
        qb.sql().to_string()
    }

    #[test]
    fn eq_binds_value() {
        let sql = sql_for(&Query::filter(Filter::eq("genre", "sci-fi")));
        assert_eq!(sql, "SELECT doc FROM books WHERE doc->'genre' = $1 ORDER BY seq ASC");
    }

    #[test]
    fn sort_and_limit() {
        let sql = sql_for(&Query::all().sorted_by("rating", Direction::Descending).limit(10));
        assert_eq!(
            sql,
            "SELECT doc FROM books WHERE TRUE ORDER BY doc->'rating' DESC NULLS LAST, seq ASC LIMIT $1"
        );
    }

    #[test]
    fn or_of_likes() {
        let filter = Filter::Or(vec![Filter::like("title", "dune"), Filter::like("author", "dune")]);
        let sql = sql_for(&Query::filter(filter));
        assert!(sql.contains("doc->>'title' ILIKE $1"));
        assert!(sql.contains(" OR "));
        assert!(sql.contains("doc->>'author' ILIKE $2"));
    }

    #[test]
    fn empty_or_matches_nothing() {
        let sql = sql_for(&Query::filter(Filter::Or(Vec::new())));
        assert!(sql.contains("WHERE FALSE"));
    }

    #[test]
    fn like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("50%_off"), "%50\\%\\_off%");
        assert_eq!(like_pattern("dune"), "%dune%");
    }
}
