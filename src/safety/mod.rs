//! SQL safety validator
//!
//! Pure inspection of planner-generated SQL before it may touch the warehouse.
//! Rules run in order and the first failure determines the rejection reason:
//!
//! 1. Read-only: the statement must start with SELECT.
//! 2. No unconstrained `*` column selector (`SELECT *` or `alias.*`).
//! 3. Every numeric LIMIT must be positive and within the configured cap, and
//!    at least one must be present.
//! 4. Table references must be backtick-delimited, qualified BigQuery paths.
//!
//! String literals are masked before rules 2 to 4 run, so `r'Nike.*'` in a
//! REGEXP_CONTAINS call is not a wildcard and a quoted `LIMIT` is not a
//! clause. A FROM inside function arguments (`EXTRACT(YEAR FROM ...)`,
//! `TRIM(x FROM y)`) is not a table reference either; subquery FROMs still
//! are.
//!
//! The validator never rewrites the input. A bad query is rejected with an
//! actionable detail string; silent correction would hide the planner's mistake
//! from the reflect step. No I/O, deterministic, idempotent.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::warn;

use crate::config::SafetyConfig;

static LEADING_SELECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)^\s*select\b").expect("valid regex"));

/// `SELECT *` or `SELECT DISTINCT *` with nothing constraining the projection.
static BARE_WILDCARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\bselect\s+(?:distinct\s+)?\*").expect("valid regex"));

/// `alias.*` anywhere in the projection. `count(*)` does not match: the star
/// there follows an opening paren, not a dot.
static ALIAS_WILDCARD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_]*\.\*").expect("valid regex"));

static LIMIT_CLAUSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\blimit\s+(\S+)").expect("valid regex"));

/// Table reference following FROM/JOIN: either a backtick-delimited path or a
/// bare identifier chain. Parenthesized subqueries produce no capture.
static TABLE_REF: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(?:from|join)\s+(`[^`]+`|[A-Za-z0-9_.\-]+)").expect("valid regex")
});

/// Why a query was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    NotReadOnly,
    WildcardSelect,
    MissingOrExcessiveLimit,
    UnqualifiedTable,
}

impl fmt::Display for RejectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::NotReadOnly => "not read-only",
            Self::WildcardSelect => "wildcard select",
            Self::MissingOrExcessiveLimit => "missing or excessive limit",
            Self::UnqualifiedTable => "unqualified table",
        };
        f.write_str(s)
    }
}

/// Validation outcome, produced once per query text and consumed immediately
/// by the executor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected {
        reason: RejectReason,
        detail: String,
    },
}

impl Verdict {
    fn rejected(reason: RejectReason, detail: impl Into<String>) -> Self {
        Self::Rejected {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted)
    }
}

/// Safety validator for planner-generated SQL.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    row_limit_cap: u64,
}

impl SqlValidator {
    pub fn new(safety: &SafetyConfig) -> Self {
        Self {
            row_limit_cap: safety.row_limit_cap,
        }
    }

    /// Inspect the SQL text and return a verdict. Pure: re-validating identical
    /// text always yields an identical verdict.
    pub fn validate(&self, sql: &str) -> Verdict {
        if !LEADING_SELECT.is_match(sql) {
            warn!("rejected non-SELECT statement");
            return Verdict::rejected(
                RejectReason::NotReadOnly,
                "only read-only SELECT statements are allowed",
            );
        }

        // Quoted literals are free text the rules below must not see.
        let masked = mask_string_literals(sql);
        let sql = masked.as_str();

        if BARE_WILDCARD.is_match(sql) || ALIAS_WILDCARD.is_match(sql) {
            warn!("rejected SELECT * usage");
            return Verdict::rejected(
                RejectReason::WildcardSelect,
                "avoid `SELECT *`; list the required columns explicitly",
            );
        }

        match self.parse_limit(sql) {
            LimitCheck::Ok => {}
            LimitCheck::Missing => {
                warn!("rejected query without a numeric LIMIT clause");
                return Verdict::rejected(
                    RejectReason::MissingOrExcessiveLimit,
                    "query must include a numeric LIMIT clause",
                );
            }
            LimitCheck::OutOfRange(value) => {
                warn!(limit = value, cap = self.row_limit_cap, "rejected LIMIT");
                return Verdict::rejected(
                    RejectReason::MissingOrExcessiveLimit,
                    format!(
                        "LIMIT {} is outside the allowed range 1..={}",
                        value, self.row_limit_cap
                    ),
                );
            }
        }

        if let Some(table) = self.first_unqualified_table(sql) {
            warn!(table = %table, "rejected unqualified table reference");
            return Verdict::rejected(
                RejectReason::UnqualifiedTable,
                format!(
                    "table `{}` must be a backtick-delimited, fully qualified \
                     reference like `project.dataset.table`",
                    table
                ),
            );
        }

        Verdict::Accepted
    }

    /// Every LIMIT in the statement must hold, not just the first: a capped
    /// subquery does not excuse an uncapped or oversized outer clause.
    fn parse_limit(&self, sql: &str) -> LimitCheck {
        let mut seen = false;
        for caps in LIMIT_CLAUSE.captures_iter(sql) {
            seen = true;
            let literal = caps[1].trim_end_matches(|c| c == ';' || c == ')');
            match literal.parse::<u64>() {
                // A zero limit returns nothing and signals a confused planner.
                Ok(0) => return LimitCheck::OutOfRange(0),
                Ok(n) if n > self.row_limit_cap => return LimitCheck::OutOfRange(n),
                Ok(_) => {}
                // Non-numeric bound (e.g. `LIMIT all`) counts as missing.
                Err(_) => return LimitCheck::Missing,
            }
        }
        if seen {
            LimitCheck::Ok
        } else {
            LimitCheck::Missing
        }
    }

    /// First FROM/JOIN reference that is not backtick-delimited and qualified.
    ///
    /// BigQuery Standard SQL against a cross-project dataset needs the
    /// `` `project.dataset.table` `` form, so this rule is enforced rather than
    /// advisory. UNNEST is a value operator, not a table, and is skipped, as
    /// is a FROM serving as a function argument separator.
    fn first_unqualified_table(&self, sql: &str) -> Option<String> {
        for caps in TABLE_REF.captures_iter(sql) {
            let Some(whole) = caps.get(0) else { continue };
            if in_function_args(&sql[..whole.start()]) {
                continue;
            }
            let reference = &caps[1];
            if reference.eq_ignore_ascii_case("unnest") {
                continue;
            }
            let qualified = reference.starts_with('`')
                && reference.ends_with('`')
                && reference.contains('.');
            if !qualified {
                return Some(reference.to_string());
            }
        }
        None
    }
}

/// True when the position ending `prefix` sits inside parentheses that are
/// function arguments rather than a subquery. `EXTRACT(YEAR FROM x)` and
/// `TRIM(x FROM y)` qualify; `IN (SELECT ...)` does not.
fn in_function_args(prefix: &str) -> bool {
    let mut open_parens: Vec<usize> = Vec::new();
    for (i, c) in prefix.char_indices() {
        match c {
            '(' => open_parens.push(i),
            ')' => {
                open_parens.pop();
            }
            _ => {}
        }
    }
    match open_parens.last() {
        Some(&open) => {
            let body = prefix[open + 1..].trim_start();
            !body
                .get(..6)
                .is_some_and(|head| head.eq_ignore_ascii_case("select"))
        }
        None => false,
    }
}

/// Replace the contents of single- and double-quoted literals with spaces,
/// keeping the quotes and overall shape. Backslash escapes are honored so an
/// escaped quote does not end the literal early.
fn mask_string_literals(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut chars = sql.chars();
    while let Some(c) = chars.next() {
        if c != '\'' && c != '"' {
            out.push(c);
            continue;
        }
        out.push(c);
        while let Some(inner) = chars.next() {
            if inner == '\\' {
                out.push(' ');
                if chars.next().is_some() {
                    out.push(' ');
                }
            } else if inner == c {
                out.push(c);
                break;
            } else {
                out.push(' ');
            }
        }
    }
    out
}

enum LimitCheck {
    Ok,
    Missing,
    OutOfRange(u64),
}

/// The numeric LIMIT the outermost clause declares, if any: the last LIMIT in
/// the text, since subquery limits come first. Used by the executor to size
/// the row budget; validation has already guaranteed presence and range by
/// the time execution happens.
pub fn declared_limit(sql: &str) -> Option<u64> {
    LIMIT_CLAUSE
        .captures_iter(&mask_string_literals(sql))
        .last()
        .and_then(|caps| {
            caps[1]
                .trim_end_matches(|c| c == ';' || c == ')')
                .parse::<u64>()
                .ok()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> SqlValidator {
        SqlValidator::new(&SafetyConfig::default())
    }

    fn reason(verdict: &Verdict) -> Option<RejectReason> {
        match verdict {
            Verdict::Accepted => None,
            Verdict::Rejected { reason, .. } => Some(*reason),
        }
    }

    #[test]
    fn accepts_well_formed_query() {
        let v = validator().validate(
            "SELECT order_id, status FROM `bigquery-public-data.thelook_ecommerce.orders` LIMIT 1000",
        );
        assert!(v.is_accepted());
    }

    #[test]
    fn rejects_non_select_statements() {
        for sql in [
            "DELETE FROM `p.d.orders` WHERE 1=1 LIMIT 10",
            "UPDATE `p.d.orders` SET status = 'x' LIMIT 10",
            "  drop table `p.d.orders`",
            "WITH x AS (SELECT 1) SELECT * FROM x LIMIT 1",
        ] {
            assert_eq!(
                reason(&validator().validate(sql)),
                Some(RejectReason::NotReadOnly),
                "should reject: {sql}"
            );
        }
    }

    #[test]
    fn rejects_wildcard_even_with_valid_limit() {
        let v = validator().validate("SELECT * FROM `p.d.orders` LIMIT 10");
        assert_eq!(reason(&v), Some(RejectReason::WildcardSelect));
    }

    #[test]
    fn rejects_alias_wildcard() {
        let v = validator()
            .validate("SELECT o.* FROM `p.d.orders` AS o LIMIT 10");
        assert_eq!(reason(&v), Some(RejectReason::WildcardSelect));
    }

    #[test]
    fn count_star_is_not_a_wildcard() {
        let v = validator().validate("SELECT COUNT(*) AS n FROM `p.d.orders` LIMIT 1");
        assert!(v.is_accepted());
    }

    #[test]
    fn rejects_missing_limit() {
        let v = validator().validate("SELECT order_id FROM `p.d.orders`");
        assert_eq!(reason(&v), Some(RejectReason::MissingOrExcessiveLimit));
    }

    #[test]
    fn rejects_excessive_limit() {
        let v = validator().validate("SELECT order_id FROM `p.d.orders` LIMIT 5000");
        assert_eq!(reason(&v), Some(RejectReason::MissingOrExcessiveLimit));
    }

    #[test]
    fn rejects_zero_and_non_numeric_limit() {
        for sql in [
            "SELECT order_id FROM `p.d.orders` LIMIT 0",
            "SELECT order_id FROM `p.d.orders` LIMIT all",
        ] {
            assert_eq!(
                reason(&validator().validate(sql)),
                Some(RejectReason::MissingOrExcessiveLimit),
                "should reject: {sql}"
            );
        }
    }

    #[test]
    fn limit_at_cap_is_accepted() {
        let v = validator().validate("SELECT order_id FROM `p.d.orders` LIMIT 1000");
        assert!(v.is_accepted());
    }

    #[test]
    fn trailing_semicolon_does_not_break_limit_parse() {
        let v = validator().validate("SELECT order_id FROM `p.d.orders` LIMIT 10;");
        assert!(v.is_accepted());
    }

    #[test]
    fn rejects_unqualified_table() {
        let v = validator().validate("SELECT order_id FROM orders LIMIT 10");
        assert_eq!(reason(&v), Some(RejectReason::UnqualifiedTable));
    }

    #[test]
    fn rejects_undelimited_qualified_table() {
        let v = validator()
            .validate("SELECT order_id FROM bigquery-public-data.thelook_ecommerce.orders LIMIT 10");
        assert_eq!(reason(&v), Some(RejectReason::UnqualifiedTable));
    }

    #[test]
    fn join_tables_are_checked_too() {
        let v = validator().validate(
            "SELECT o.order_id FROM `p.d.orders` o JOIN users u ON o.user_id = u.id LIMIT 10",
        );
        assert_eq!(reason(&v), Some(RejectReason::UnqualifiedTable));
    }

    #[test]
    fn function_argument_from_is_not_a_table_reference() {
        for sql in [
            "SELECT EXTRACT(YEAR FROM created_at) AS y, COUNT(*) AS n \
             FROM `p.d.orders` GROUP BY y LIMIT 100",
            "SELECT TRIM('x' FROM name) AS clean FROM `p.d.products` LIMIT 100",
        ] {
            assert!(
                validator().validate(sql).is_accepted(),
                "should accept: {sql}"
            );
        }
    }

    #[test]
    fn subquery_tables_are_still_checked() {
        let v = validator().validate(
            "SELECT order_id FROM `p.d.orders` \
             WHERE user_id IN (SELECT id FROM users LIMIT 5) LIMIT 10",
        );
        assert_eq!(reason(&v), Some(RejectReason::UnqualifiedTable));
    }

    #[test]
    fn regex_literal_is_not_a_wildcard() {
        let v = validator().validate(
            "SELECT name FROM `p.d.products` \
             WHERE REGEXP_CONTAINS(name, r'Nike.*') LIMIT 100",
        );
        assert!(v.is_accepted());
    }

    #[test]
    fn quoted_text_is_not_sql() {
        // A literal mentioning SELECT * or LIMIT must not trip the rules.
        let v = validator().validate(
            "SELECT order_id FROM `p.d.orders` \
             WHERE note != 'use SELECT * LIMIT 9999' LIMIT 10",
        );
        assert!(v.is_accepted());
    }

    #[test]
    fn every_limit_clause_is_checked() {
        let v = validator().validate(
            "SELECT order_id FROM `p.d.orders` \
             WHERE user_id IN (SELECT id FROM `p.d.users` LIMIT 5) LIMIT 5000",
        );
        assert_eq!(reason(&v), Some(RejectReason::MissingOrExcessiveLimit));

        let v = validator().validate(
            "SELECT order_id FROM `p.d.orders` \
             WHERE user_id IN (SELECT id FROM `p.d.users` LIMIT 5) LIMIT 100",
        );
        assert!(v.is_accepted());
    }

    #[test]
    fn unnest_is_not_a_table_reference() {
        let v = validator().validate(
            "SELECT item FROM `p.d.orders`, UNNEST(items) AS item LIMIT 10",
        );
        assert!(v.is_accepted());
    }

    #[test]
    fn first_failing_rule_wins() {
        // Wildcard and bad limit together: statement-kind rule passes, the
        // wildcard rule fires before the limit rule.
        let v = validator().validate("SELECT * FROM orders LIMIT 5000");
        assert_eq!(reason(&v), Some(RejectReason::WildcardSelect));
    }

    #[test]
    fn validation_is_idempotent() {
        let sql = "SELECT order_id FROM orders LIMIT 10";
        let v = validator();
        assert_eq!(v.validate(sql), v.validate(sql));
    }

    #[test]
    fn declared_limit_extraction() {
        assert_eq!(declared_limit("SELECT a FROM `p.d.t` LIMIT 25"), Some(25));
        assert_eq!(declared_limit("SELECT a FROM `p.d.t` limit 25;"), Some(25));
        assert_eq!(declared_limit("SELECT a FROM `p.d.t`"), None);
    }

    #[test]
    fn declared_limit_is_the_outermost_clause() {
        assert_eq!(
            declared_limit(
                "SELECT a FROM `p.d.t` WHERE b IN (SELECT c FROM `p.d.u` LIMIT 5) LIMIT 100"
            ),
            Some(100)
        );
    }

    #[test]
    fn case_and_whitespace_insensitive_select() {
        let v = validator()
            .validate("\n  select order_id from `p.d.orders` limit 10");
        assert!(v.is_accepted());
    }
}
