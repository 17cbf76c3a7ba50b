/// Write operations are matched with a trailing space so identifiers like
/// `updates` do not trip the check.
const FORBIDDEN_VERBS: [&str; 8] = [
    "insert ",
    "update ",
    "delete ",
    "drop ",
    "create ",
    "alter ",
    "truncate ",
    "replace ",
];

/// Static gate between a generated statement and the database. Total and
/// case-insensitive: any input that cannot be shown safe is unsafe.
///
/// Rejects multi-statement input (any `;`), any forbidden write verb, and
/// anything that does not start with `select`. When a non-empty allowlist
/// is supplied, at least one allowed table name must appear in the
/// statement; passing `None` (no configured database, or the explicit
/// debug override) skips only that membership rule.
pub fn is_safe_select(sql_text: &str, allowed_tables: Option<&[String]>) -> bool {
    let low = sql_text.to_lowercase();

    if low.contains(';') {
        return false;
    }

    if FORBIDDEN_VERBS.iter().any(|verb| low.contains(verb)) {
        return false;
    }

    if !low.trim_start().starts_with("select") {
        return false;
    }

    if let Some(tables) = allowed_tables {
        if !tables.is_empty()
            && !tables
                .iter()
                .any(|table| !table.is_empty() && low.contains(&table.to_lowercase()))
        {
            return false;
        }
    }

    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn allow(tables: &[&str]) -> Vec<String> {
        tables.iter().map(|t| t.to_string()).collect()
    }

    #[test]
    fn statement_separator_is_rejected_regardless_of_allowlist() {
        let sql = "select * from orders; drop table orders";
        assert!(!is_safe_select(sql, None));
        assert!(!is_safe_select(sql, Some(&allow(&["orders"]))));
        assert!(!is_safe_select("select 1;", None));
    }

    #[test]
    fn forbidden_verbs_are_rejected_even_with_select_elsewhere() {
        assert!(!is_safe_select("update orders set x = (select 1)", None));
        assert!(!is_safe_select("DELETE FROM orders WHERE id IN (select 1)", None));
        assert!(!is_safe_select("select * from orders where 1=1 or insert whatever", None));
    }

    #[test]
    fn verb_inside_identifier_does_not_trip_the_check() {
        assert!(is_safe_select("select * from updates", None));
        assert!(is_safe_select("select created_at from orders", Some(&allow(&["orders"]))));
    }

    #[test]
    fn must_start_with_select_after_trimming() {
        assert!(!is_safe_select("show tables", None));
        assert!(!is_safe_select("with t as (select 1) select * from t", None));
        assert!(is_safe_select("   SELECT 1", None));
    }

    #[test]
    fn allowlist_membership_is_required_when_supplied() {
        let allowed = allow(&["orders"]);
        assert!(!is_safe_select("select * from customers", Some(&allowed)));
        assert!(is_safe_select("select * from orders", Some(&allowed)));
    }

    #[test]
    fn missing_or_empty_allowlist_skips_the_membership_rule() {
        assert!(is_safe_select("select * from customers", None));
        assert!(is_safe_select("select * from customers", Some(&[])));
    }

    #[test]
    fn allowlist_matching_is_case_insensitive() {
        let allowed = allow(&["Orders"]);
        assert!(is_safe_select("select * from ORDERS", Some(&allowed)));
    }
}
