//! View definition decomposition.
//!
//! MySQL reports a view as a single `CREATE ... SQL SECURITY DEFINER VIEW
//! `name` AS select ...` line. [`ViewDecomposer`] turns that text into an
//! [`SqlTemplate`] with injectable `{WHERE}`, `{ORDER_BY}`, `{LIMIT}` and
//! `{OFFSET}` slots, moving the view's own top-level WHERE into the entity's
//! base condition and its ORDER BY into the default ordering.
//!
//! The body is first normalized with the `sqlparser` MySQL tokenizer so that
//! every top-level clause starts on its own line; clause extraction then works
//! line by line and never looks inside parentheses.

use crate::error::{DbError, DbResult};
use crate::models::{BaseCondition, SqlTemplate};
use sqlparser::dialect::MySqlDialect;
use sqlparser::tokenizer::{Token, Tokenizer};
use tracing::{debug, warn};

const VIEW_MARKER: &str = "SECURITY DEFINER VIEW `";

/// Words upper-cased during normalization.
const KEYWORDS: &[&str] = &[
    "ALGORITHM", "ALL", "AND", "AS", "ASC", "BETWEEN", "BY", "CASCADED", "CASE", "CHECK",
    "COLLATE", "CREATE", "CROSS", "DEFINER", "DESC", "DISTINCT", "DIV", "ELSE", "END", "EXISTS",
    "FALSE", "FROM", "GROUP", "HAVING", "IN", "INNER", "INTERVAL", "INVOKER", "IS", "JOIN",
    "LEFT", "LIKE", "LIMIT", "LOCAL", "MERGE", "MOD", "NATURAL", "NOT", "NULL", "OFFSET", "ON",
    "OPTION", "OR", "ORDER", "OUTER", "REGEXP", "RIGHT", "ROLLUP", "SECURITY", "SELECT", "SQL",
    "STRAIGHT_JOIN", "TEMPTABLE", "THEN", "TRUE", "UNDEFINED", "UNION", "USING", "VIEW", "WHEN",
    "WHERE", "WITH", "XOR",
];

/// Words that start a new line when they appear outside parentheses.
const CLAUSE_STARTS: &[&str] = &[
    "CROSS", "FROM", "GROUP", "HAVING", "INNER", "JOIN", "LEFT", "LIMIT", "NATURAL", "ORDER",
    "RIGHT", "STRAIGHT_JOIN", "UNION", "WHERE",
];

/// Clause words that are also function names, e.g. `LEFT(name, 3)`.
const FUNCTION_WORDS: &[&str] = &["LEFT", "RIGHT"];

/// Words that may precede `JOIN` (or each other) within one join clause.
const JOIN_MODIFIERS: &[&str] = &["CROSS", "INNER", "LEFT", "NATURAL", "OUTER", "RIGHT"];

/// Template and extracted clauses of one view.
#[derive(Debug, Clone, PartialEq)]
pub struct DecomposedView {
    pub statement: SqlTemplate,
    pub base_condition: BaseCondition,
    /// ORDER BY body of the view, without the keyword; empty for none.
    pub default_order_by: String,
    /// The whole definition, normalized.
    pub create_statement: String,
}

/// Splits view definitions into reusable statement templates.
pub struct ViewDecomposer;

impl ViewDecomposer {
    /// Decompose the `SHOW CREATE VIEW` text of `view_name`.
    pub fn decompose(view_name: &str, create_view: &str) -> DbResult<DecomposedView> {
        let body = extract_body(view_name, create_view)?;
        let body = normalize(body).map_err(|e| DbError::view_parse(view_name, e))?;
        debug!(view = %view_name, "Normalized view body");

        if body.contains("\nUNION") {
            return Err(DbError::view_parse(
                view_name,
                "compound (UNION) views cannot take an injected WHERE clause",
            ));
        }

        let (body, base_condition) = take_clause_line(&body, "\nWHERE ");
        let (body, default_order_by) = take_clause_line(&body, "\nORDER BY ");
        let body = tidy_lines(&body);

        if body.contains("\nLIMIT ") {
            warn!(
                view = %view_name,
                "View defines its own LIMIT; injected LIMIT will conflict"
            );
        }

        let statement = match body.find("\nGROUP BY") {
            Some(at) => format!(
                "{} \n{{WHERE}} {} \n{{ORDER_BY}} \n{{LIMIT}} \n{{OFFSET}}",
                &body[..at],
                &body[at..]
            ),
            None => format!("{}\n{{WHERE}} \n{{ORDER_BY}} \n{{LIMIT}} \n{{OFFSET}}", body),
        };

        let create_statement = normalize(create_view).unwrap_or_else(|e| {
            debug!(view = %view_name, error = %e, "Keeping raw create statement");
            create_view.trim().to_string()
        });

        Ok(DecomposedView {
            statement: SqlTemplate::new(statement),
            base_condition: base_condition
                .map(|sql| BaseCondition::from_sql(&sql))
                .unwrap_or_default(),
            default_order_by: default_order_by.unwrap_or_default(),
            create_statement,
        })
    }
}

/// The SELECT body after `... SECURITY DEFINER VIEW `name` AS `.
fn extract_body<'a>(view_name: &str, create_view: &'a str) -> DbResult<&'a str> {
    let not_a_view = || {
        DbError::view_parse(
            view_name,
            "definition does not match `SQL SECURITY DEFINER VIEW `name` AS ...`",
        )
    };

    let start = create_view.find(VIEW_MARKER).ok_or_else(not_a_view)? + VIEW_MARKER.len();
    let after_name = create_view[start..].find('`').ok_or_else(not_a_view)? + start + 1;
    let body = create_view[after_name..]
        .strip_prefix(" AS ")
        .ok_or_else(not_a_view)?
        .trim();
    if body.is_empty() {
        return Err(not_a_view());
    }
    Ok(unwrap_parentheses(body))
}

/// Strip one pair of parentheses enclosing the whole text.
fn unwrap_parentheses(body: &str) -> &str {
    let Some(inner) = body.strip_prefix('(').and_then(|b| b.strip_suffix(')')) else {
        return body;
    };
    let mut depth = 0i32;
    for c in inner.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return body;
                }
            }
            _ => {}
        }
    }
    if depth == 0 { inner } else { body }
}

fn is_word(token: Option<&Token>, list: &[&str]) -> bool {
    match token {
        Some(Token::Word(w)) if w.quote_style.is_none() => {
            list.iter().any(|k| w.value.eq_ignore_ascii_case(k))
        }
        _ => false,
    }
}

/// Re-render SQL with collapsed whitespace, upper-case keywords and one line
/// per top-level clause.
fn normalize(sql: &str) -> Result<String, String> {
    let dialect = MySqlDialect {};
    let tokens = Tokenizer::new(&dialect, sql)
        .with_unescape(false)
        .tokenize()
        .map_err(|e| format!("tokenizer failed: {}", e))?;

    // (token, preceded by whitespace)
    let mut pieces: Vec<(Token, bool)> = Vec::with_capacity(tokens.len());
    let mut spaced = false;
    for token in tokens {
        match token {
            Token::Whitespace(_) => spaced = true,
            Token::EOF => {}
            token => {
                pieces.push((token, spaced));
                spaced = false;
            }
        }
    }

    let mut out = String::with_capacity(sql.len());
    let mut depth = 0usize;
    for (i, (token, spaced)) in pieces.iter().enumerate() {
        let prev = i.checked_sub(1).and_then(|p| pieces.get(p)).map(|(t, _)| t);
        let next = pieces.get(i + 1).map(|(t, _)| t);
        let dotted = matches!(prev, Some(Token::Period)) || matches!(next, Some(Token::Period));

        let breaks = i > 0
            && depth == 0
            && !dotted
            && is_word(Some(token), CLAUSE_STARTS)
            && !(is_word(Some(token), FUNCTION_WORDS) && matches!(next, Some(Token::LParen)))
            && !is_word(prev, JOIN_MODIFIERS);

        if breaks {
            out.push('\n');
        } else if *spaced && i > 0 {
            out.push(' ');
        }

        match token {
            Token::Word(w) if !dotted && is_word(Some(token), KEYWORDS) => {
                out.push_str(&w.value.to_uppercase());
            }
            Token::LParen => {
                depth += 1;
                out.push('(');
            }
            Token::RParen => {
                depth = depth.saturating_sub(1);
                out.push(')');
            }
            other => out.push_str(&other.to_string()),
        }
    }
    Ok(out)
}

/// Remove the line introduced by `marker` and return its trimmed content.
fn take_clause_line(body: &str, marker: &str) -> (String, Option<String>) {
    let Some(start) = body.find(marker) else {
        return (body.to_string(), None);
    };
    let content_start = start + marker.len();
    let (content, rest) = match body[content_start..].find('\n') {
        Some(end) => (
            &body[content_start..content_start + end],
            &body[content_start + end + 1..],
        ),
        None => (&body[content_start..], ""),
    };
    (
        format!("{}\n{}", &body[..start], rest),
        Some(content.trim().to_string()),
    )
}

fn tidy_lines(body: &str) -> String {
    body.lines()
        .map(str::trim_end)
        .filter(|line| !line.trim().is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn definition(body: &str) -> String {
        format!(
            "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER VIEW `v_orders` AS {}",
            body
        )
    }

    #[test]
    fn test_extracts_where_and_order_by() {
        let view = ViewDecomposer::decompose(
            "v_orders",
            &definition(
                "select o.id, o.status from orders o WHERE o.status = 'open'\nORDER BY o.created DESC",
            ),
        )
        .unwrap();

        assert_eq!(
            view.base_condition,
            BaseCondition::Filter("o.status = 'open'".into())
        );
        assert_eq!(view.default_order_by, "o.created DESC");
        let template = view.statement.as_str();
        assert!(!template.contains("o.status = 'open'"));
        assert!(!template.contains("o.created DESC"));
        assert_eq!(
            template,
            "SELECT o.id, o.status\nFROM orders o\n{WHERE} \n{ORDER_BY} \n{LIMIT} \n{OFFSET}"
        );
    }

    #[test]
    fn test_mysql_canonical_definition() {
        let view = ViewDecomposer::decompose(
            "v_orders",
            &definition(
                "select `o`.`id` AS `id`,`o`.`status` AS `status` from `orders` `o` where (`o`.`status` = _utf8mb4'open') order by `o`.`id` desc",
            ),
        )
        .unwrap();

        assert_eq!(
            view.base_condition,
            BaseCondition::Filter("(`o`.`status` = _utf8mb4'open')".into())
        );
        assert_eq!(view.default_order_by, "`o`.`id` DESC");
        assert!(view.statement.as_str().starts_with(
            "SELECT `o`.`id` AS `id`,`o`.`status` AS `status`\nFROM `orders` `o`\n{WHERE}"
        ));
    }

    #[test]
    fn test_no_where_means_always() {
        let view =
            ViewDecomposer::decompose("v_orders", &definition("select id from orders")).unwrap();
        assert_eq!(view.base_condition, BaseCondition::Always);
        assert_eq!(view.default_order_by, "");
        assert!(view.statement.has_slot(SqlTemplate::WHERE));
        assert!(!view.statement.has_slot(SqlTemplate::PROJECTION));
    }

    #[test]
    fn test_group_by_slot_placement() {
        let view = ViewDecomposer::decompose(
            "v_totals",
            &definition(
                "select customer_id, sum(total) AS total from orders where paid = 1 group by customer_id having sum(total) > 10 order by total desc",
            ),
        )
        .unwrap();

        assert_eq!(view.base_condition, BaseCondition::Filter("paid = 1".into()));
        assert_eq!(view.default_order_by, "total DESC");
        assert_eq!(
            view.statement.as_str(),
            "SELECT customer_id, sum(total) AS total\nFROM orders \n{WHERE} \nGROUP BY customer_id\nHAVING sum(total) > 10 \n{ORDER_BY} \n{LIMIT} \n{OFFSET}"
        );
        assert!(!view.statement.order_by_precedes_group_by());
    }

    #[test]
    fn test_nested_clauses_stay_inline() {
        let view = ViewDecomposer::decompose(
            "v_recent",
            &definition(
                "(select a.id from (select id from items where price > 5 order by id) a left join tags t on t.item_id = a.id where t.name is not null)",
            ),
        )
        .unwrap();

        assert_eq!(
            view.base_condition,
            BaseCondition::Filter("t.name IS NOT NULL".into())
        );
        assert_eq!(
            view.statement.as_str(),
            "SELECT a.id\nFROM (SELECT id FROM items WHERE price > 5 ORDER BY id) a\nLEFT JOIN tags t ON t.item_id = a.id\n{WHERE} \n{ORDER_BY} \n{LIMIT} \n{OFFSET}"
        );
    }

    #[test]
    fn test_lowercase_clauses_before_parenthesis() {
        let view = ViewDecomposer::decompose(
            "v",
            "CREATE ALGORITHM=UNDEFINED DEFINER=`root`@`%` SQL SECURITY DEFINER VIEW `v` AS select `o`.`id` AS `id` from `orders` `o` where (`o`.`status` = 'open') order by `o`.`id` desc",
        )
        .unwrap();

        assert_eq!(
            view.base_condition,
            BaseCondition::Filter("(`o`.`status` = 'open')".into())
        );
        assert_eq!(view.default_order_by, "`o`.`id` DESC");
        assert_eq!(
            view.statement.as_str(),
            "SELECT `o`.`id` AS `id`\nFROM `orders` `o`\n{WHERE} \n{ORDER_BY} \n{LIMIT} \n{OFFSET}"
        );

        let body = normalize("select x from (select 1) s join (select 2) t where (x = 1)");
        assert_eq!(
            body.unwrap(),
            "SELECT x\nFROM (SELECT 1) s\nJOIN (SELECT 2) t\nWHERE (x = 1)"
        );
    }

    #[test]
    fn test_left_function_is_not_a_join() {
        let body = normalize("select left(name, 3) AS p from users").unwrap();
        assert_eq!(body, "SELECT LEFT(name, 3) AS p\nFROM users");
    }

    #[test]
    fn test_rejects_other_definitions() {
        let err = ViewDecomposer::decompose("v", "CREATE VIEW v AS SELECT 1").unwrap_err();
        assert!(matches!(err, DbError::ViewParse { ref view, .. } if view == "v"));

        let err = ViewDecomposer::decompose(
            "v_union",
            &definition("select id from a union select id from b"),
        )
        .unwrap_err();
        assert!(matches!(err, DbError::ViewParse { .. }));
    }

    #[test]
    fn test_unwrap_parentheses() {
        assert_eq!(unwrap_parentheses("(select 1)"), "select 1");
        assert_eq!(unwrap_parentheses("(a) union (b)"), "(a) union (b)");
        assert_eq!(unwrap_parentheses("select 1"), "select 1");
    }
}
