use crate::collection::Collection;
use serde::Serialize;
use std::sync::Arc;

use super::exec::{AccessPath, execute_find, log_event};
use super::parse::filter_to_document;
use super::types::{Filter, FindOptions};

/// Execution statistics for one query, shaped like MongoDB's `explain("executionStats")`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExplainReport {
    pub query_planner: QueryPlanner,
    pub execution_stats: ExecutionStats,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlanner {
    pub namespace: String,
    pub parsed_query: serde_json::Value,
    pub winning_plan: WinningPlan,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WinningPlan {
    pub stage: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_stage: Option<InputStage>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputStage {
    pub stage: String,
    pub index_name: String,
    pub key_pattern: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionStats {
    pub n_returned: usize,
    pub execution_time_millis: u64,
    pub total_keys_examined: usize,
    pub total_docs_examined: usize,
}

impl ExplainReport {
    #[must_use]
    pub fn used_index(&self) -> Option<&str> {
        self.query_planner.winning_plan.input_stage.as_ref().map(|s| s.index_name.as_str())
    }
}

/// Run `filter` and report how it was executed.
pub fn explain(col: &Arc<Collection>, namespace: &str, filter: &Filter) -> ExplainReport {
    let (_, stats) = execute_find(col, filter, &FindOptions::default());
    let winning_plan = match &stats.access {
        AccessPath::CollScan => WinningPlan { stage: "COLLSCAN".into(), input_stage: None },
        AccessPath::IndexScan { index_name } => {
            let key_pattern = col
                .list_indexes()
                .into_iter()
                .find(|d| &d.name == index_name)
                .map(|d| bson::Bson::Document(d.key_pattern()).into_relaxed_extjson())
                .unwrap_or(serde_json::Value::Null);
            WinningPlan {
                stage: "FETCH".into(),
                input_stage: Some(InputStage { stage: "IXSCAN".into(), index_name: index_name.clone(), key_pattern }),
            }
        }
    };
    let report = ExplainReport {
        query_planner: QueryPlanner {
            namespace: namespace.to_string(),
            parsed_query: bson::Bson::Document(filter_to_document(filter)).into_relaxed_extjson(),
            winning_plan,
        },
        execution_stats: ExecutionStats {
            n_returned: stats.n_returned,
            execution_time_millis: u64::try_from(stats.elapsed.as_millis()).unwrap_or(u64::MAX),
            total_keys_examined: stats.keys_examined,
            total_docs_examined: stats.docs_examined,
        },
    };
    log_event("explain", col, serde_json::json!({"stage": report.query_planner.winning_plan.stage, "index": report.used_index()}));
    report
}
