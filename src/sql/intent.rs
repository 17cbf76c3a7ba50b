use crate::llm::ModelClient;
use crate::sql::prompt;
use crate::sql::{CandidateOrigin, CandidateSql};
use regex::Regex;
use tracing::debug;

/// Token the intent probe returns when no database query is needed.
pub const NO_SQL_TOKEN: &str = "NO_SQL";

/// Requests that read as data analysis rather than data retrieval. An
/// explicit analysis request never auto-triggers SQL.
const ANALYSIS_KEYWORDS: [&str; 26] = [
    "分析",
    "描述",
    "统计",
    "汇总",
    "可视化",
    "画图",
    "总结",
    "解释",
    "洞察",
    "趋势",
    "分布",
    "关联",
    "analyze",
    "analyse",
    "describe",
    "summarize",
    "summarise",
    "visualize",
    "visualise",
    "plot",
    "chart",
    "explain",
    "insight",
    "trend",
    "distribution",
    "correlate",
];

#[derive(Debug)]
pub enum Intent {
    FreeText,
    /// SQL should be produced; the probe may already have supplied the
    /// initial candidate.
    NeedsSql(Option<CandidateSql>),
}

/// Keyword/regex rules, applied in order; the first hit wins. `None` means
/// no rule fired and the caller should fall back to the model probe.
pub fn heuristic_needs_sql(user_text: &str, known_tables: Option<&[String]>) -> Option<bool> {
    if user_text.trim().is_empty() {
        return Some(false);
    }
    let text = user_text.to_lowercase();

    // Explicit write-me-SQL phrasing.
    if text.contains("帮我写") && (text.contains("sql") || text.contains("查询")) {
        return Some(true);
    }
    let write_sql =
        Regex::new(r"写(一条|一个)?\s*(sql|查询)|write\s+(me\s+)?(a\s+|one\s+)?(sql|query)")
            .unwrap();
    if write_sql.is_match(&text) {
        return Some(true);
    }

    // "query <identifier>" style requests.
    let query_table = Regex::new(r"(查询|query)\s+([\w\.]+)").unwrap();
    if query_table.is_match(&text) {
        return Some(true);
    }

    // A known table named directly in the request.
    if let Some(tables) = known_tables {
        if tables
            .iter()
            .any(|table| !table.is_empty() && text.contains(&table.to_lowercase()))
        {
            return Some(true);
        }
    }

    if ANALYSIS_KEYWORDS
        .iter()
        .any(|keyword| text.contains(keyword))
    {
        return Some(false);
    }

    None
}

/// Decides whether this turn should produce SQL. Heuristics run first;
/// when none fires, one advisory model call settles it. The probe's own
/// SQL output is still subject to the full safety validation before any
/// execution path is reachable.
pub async fn classify(
    user_text: &str,
    known_tables: Option<&[String]>,
    model: &ModelClient,
) -> Intent {
    match heuristic_needs_sql(user_text, known_tables) {
        Some(true) => return Intent::NeedsSql(None),
        Some(false) => return Intent::FreeText,
        None => {}
    }

    let reply = model.complete(&prompt::intent_prompt(user_text)).await;
    for line in reply.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case(NO_SQL_TOKEN) {
            return Intent::FreeText;
        }
        debug!("intent probe produced a candidate statement");
        return Intent::NeedsSql(Some(CandidateSql::new(
            line,
            CandidateOrigin::IntentClassification,
        )));
    }
    Intent::FreeText
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::tests::{FailingTransport, ScriptedTransport, test_llm_config};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn tables(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn explicit_write_sql_phrasing_wins() {
        let known = tables(&["orders"]);
        assert_eq!(
            heuristic_needs_sql("请帮我写一条查询 orders 的SQL", Some(&known)),
            Some(true)
        );
        assert_eq!(heuristic_needs_sql("帮我写一个查询", None), Some(true));
        assert_eq!(heuristic_needs_sql("写一条 sql 看看销量", None), Some(true));
        assert_eq!(
            heuristic_needs_sql("please write a query for monthly totals", None),
            Some(true)
        );
    }

    #[test]
    fn query_identifier_pattern_fires() {
        assert_eq!(
            heuristic_needs_sql("查询 wx_tm_market_goods_data", None),
            Some(true)
        );
        assert_eq!(heuristic_needs_sql("query sales_2024", None), Some(true));
    }

    #[test]
    fn known_table_mention_fires() {
        let known = tables(&["orders", "customers"]);
        assert_eq!(
            heuristic_needs_sql("how are Customers doing this month", Some(&known)),
            Some(true)
        );
    }

    #[test]
    fn analysis_request_short_circuits_to_false() {
        assert_eq!(
            heuristic_needs_sql("请分析一下这个数据集的分布", None),
            Some(false)
        );
        assert_eq!(
            heuristic_needs_sql("请分析一下这个数据集的分布", Some(&tables(&["orders"]))),
            Some(false)
        );
        assert_eq!(
            heuristic_needs_sql("summarize the uploaded data for me", None),
            Some(false)
        );
    }

    #[test]
    fn no_rule_fires_for_plain_chat() {
        assert_eq!(heuristic_needs_sql("hello, who are you?", None), None);
    }

    #[tokio::test]
    async fn heuristic_hits_never_reach_the_model() {
        let dir = tempfile::tempdir().unwrap();
        let calls = Arc::new(AtomicUsize::new(0));
        let model = ModelClient::with_transport(
            Box::new(FailingTransport {
                calls: Arc::clone(&calls),
            }),
            &test_llm_config(dir.path()),
        );

        let known = tables(&["orders"]);
        assert!(matches!(
            classify("请帮我写一条查询 orders 的SQL", Some(&known), &model).await,
            Intent::NeedsSql(None)
        ));
        assert!(matches!(
            classify("请分析一下这个数据集的分布", Some(&known), &model).await,
            Intent::FreeText
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn model_fallback_parses_no_sql_token() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelClient::with_transport(
            Box::new(ScriptedTransport::new(vec![json!({ "text": "\nNO_SQL\n" })])),
            &test_llm_config(dir.path()),
        );

        assert!(matches!(
            classify("tell me something about my business", None, &model).await,
            Intent::FreeText
        ));
    }

    #[tokio::test]
    async fn model_fallback_select_becomes_initial_candidate() {
        let dir = tempfile::tempdir().unwrap();
        let model = ModelClient::with_transport(
            Box::new(ScriptedTransport::new(vec![
                json!({ "text": "SELECT count(*) FROM orders" }),
            ])),
            &test_llm_config(dir.path()),
        );

        match classify("how many records are there", None, &model).await {
            Intent::NeedsSql(Some(candidate)) => {
                assert_eq!(candidate.sql, "SELECT count(*) FROM orders");
                assert_eq!(candidate.origin, CandidateOrigin::IntentClassification);
            }
            other => panic!("unexpected intent: {:?}", other),
        }
    }
}
