//! Result summaries parsed from the final PULL or DISCARD metadata.

use boltwire_protocol::{Metadata, ProtocolError, Value};
use std::time::Duration;

/// Kind of work a query performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    ReadOnly,
    WriteOnly,
    ReadWrite,
    SchemaWrite,
}

impl QueryType {
    pub fn from_code(code: &str) -> Result<Self, ProtocolError> {
        match code {
            "r" => Ok(QueryType::ReadOnly),
            "w" => Ok(QueryType::WriteOnly),
            "rw" => Ok(QueryType::ReadWrite),
            "s" => Ok(QueryType::SchemaWrite),
            other => Err(ProtocolError::InvalidMetadata(format!(
                "unknown query type: {}",
                other
            ))),
        }
    }
}

/// Update counters reported by the server.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SummaryCounters {
    pub nodes_created: i64,
    pub nodes_deleted: i64,
    pub relationships_created: i64,
    pub relationships_deleted: i64,
    pub properties_set: i64,
    pub labels_added: i64,
    pub labels_removed: i64,
    pub indexes_added: i64,
    pub indexes_removed: i64,
    pub constraints_added: i64,
    pub constraints_removed: i64,
    pub system_updates: i64,
    pub contains_updates: bool,
    pub contains_system_updates: bool,
}

impl SummaryCounters {
    pub fn from_map(stats: &Metadata) -> Result<Self, ProtocolError> {
        let count = |key: &str| -> Result<i64, ProtocolError> {
            match stats.get(key) {
                None => Ok(0),
                Some(value) => value.as_i64().map_err(|_| invalid(key, value)),
            }
        };

        let mut counters = SummaryCounters {
            nodes_created: count("nodes-created")?,
            nodes_deleted: count("nodes-deleted")?,
            relationships_created: count("relationships-created")?,
            relationships_deleted: count("relationships-deleted")?,
            properties_set: count("properties-set")?,
            labels_added: count("labels-added")?,
            labels_removed: count("labels-removed")?,
            indexes_added: count("indexes-added")?,
            indexes_removed: count("indexes-removed")?,
            constraints_added: count("constraints-added")?,
            constraints_removed: count("constraints-removed")?,
            system_updates: count("system-updates")?,
            contains_updates: false,
            contains_system_updates: false,
        };

        counters.contains_updates = match stats.get("contains-updates") {
            Some(value) => value
                .as_bool()
                .map_err(|_| invalid("contains-updates", value))?,
            None => counters.total_updates() > 0,
        };
        counters.contains_system_updates = match stats.get("contains-system-updates") {
            Some(value) => value
                .as_bool()
                .map_err(|_| invalid("contains-system-updates", value))?,
            None => counters.system_updates > 0,
        };
        Ok(counters)
    }

    fn total_updates(&self) -> i64 {
        self.nodes_created
            + self.nodes_deleted
            + self.relationships_created
            + self.relationships_deleted
            + self.properties_set
            + self.labels_added
            + self.labels_removed
            + self.indexes_added
            + self.indexes_removed
            + self.constraints_added
            + self.constraints_removed
    }
}

/// Everything the server reports once a result stream is exhausted.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResultSummary {
    pub query_type: Option<QueryType>,
    pub counters: SummaryCounters,
    /// Time until the first record was available, from RUN.
    pub result_available_after: Option<Duration>,
    /// Time until the last record was consumed.
    pub result_consumed_after: Option<Duration>,
    pub bookmark: Option<String>,
    pub database: Option<String>,
    pub plan: Option<Value>,
    pub profile: Option<Value>,
    pub notifications: Vec<Value>,
}

impl ResultSummary {
    pub fn from_metadata(
        metadata: &Metadata,
        result_available_after: Option<Duration>,
    ) -> Result<Self, ProtocolError> {
        let query_type = match metadata.get("type") {
            Some(value) => Some(QueryType::from_code(
                value.as_str().map_err(|_| invalid("type", value))?,
            )?),
            None => None,
        };
        let counters = match metadata.get("stats") {
            Some(Value::Map(stats)) => SummaryCounters::from_map(stats)?,
            Some(other) => return Err(invalid("stats", other)),
            None => SummaryCounters::default(),
        };
        let notifications = match metadata.get("notifications") {
            Some(Value::List(items)) => items.clone(),
            Some(other) => return Err(invalid("notifications", other)),
            None => Vec::new(),
        };

        Ok(ResultSummary {
            query_type,
            counters,
            result_available_after,
            result_consumed_after: millis(metadata, "t_last")?,
            bookmark: string(metadata, "bookmark")?,
            database: string(metadata, "db")?,
            plan: metadata.get("plan").cloned(),
            profile: metadata.get("profile").cloned(),
            notifications,
        })
    }

    pub fn has_plan(&self) -> bool {
        self.plan.is_some() || self.profile.is_some()
    }
}

/// Reads an optional string entry.
pub(crate) fn string(metadata: &Metadata, key: &str) -> Result<Option<String>, ProtocolError> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(other) => Err(invalid(key, other)),
    }
}

/// Reads an optional millisecond entry.
pub(crate) fn millis(metadata: &Metadata, key: &str) -> Result<Option<Duration>, ProtocolError> {
    match metadata.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Integer(ms)) if *ms >= 0 => Ok(Some(Duration::from_millis(*ms as u64))),
        Some(other) => Err(invalid(key, other)),
    }
}

pub(crate) fn invalid(key: &str, value: &Value) -> ProtocolError {
    ProtocolError::InvalidMetadata(format!("unexpected {} for '{}'", value.type_name(), key))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stats(pairs: &[(&str, Value)]) -> Metadata {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_counters_from_stats() {
        let counters = SummaryCounters::from_map(&stats(&[
            ("nodes-created", Value::from(2)),
            ("properties-set", Value::from(4)),
            ("labels-added", Value::from(1)),
        ]))
        .unwrap();
        assert_eq!(counters.nodes_created, 2);
        assert_eq!(counters.properties_set, 4);
        assert_eq!(counters.relationships_created, 0);
        assert!(counters.contains_updates);
        assert!(!counters.contains_system_updates);
    }

    #[test]
    fn test_counters_explicit_flags_win() {
        let counters = SummaryCounters::from_map(&stats(&[
            ("system-updates", Value::from(3)),
            ("contains-updates", Value::from(false)),
        ]))
        .unwrap();
        assert_eq!(counters.system_updates, 3);
        assert!(!counters.contains_updates);
        assert!(counters.contains_system_updates);
    }

    #[test]
    fn test_counters_reject_bad_types() {
        let result = SummaryCounters::from_map(&stats(&[("nodes-created", Value::from("two"))]));
        assert!(matches!(result, Err(ProtocolError::InvalidMetadata(_))));
    }

    #[test]
    fn test_summary_from_metadata() {
        let mut metadata = stats(&[
            ("type", Value::from("rw")),
            ("t_last", Value::from(12)),
            ("bookmark", Value::from("FB:kcwQ")),
            ("db", Value::from("neo4j")),
            ("notifications", Value::List(vec![Value::from("n1")])),
        ]);
        metadata.insert(
            "stats".into(),
            Value::Map(stats(&[("relationships-created", Value::from(1))])),
        );

        let summary = ResultSummary::from_metadata(&metadata, Some(Duration::from_millis(3))).unwrap();
        assert_eq!(summary.query_type, Some(QueryType::ReadWrite));
        assert_eq!(summary.counters.relationships_created, 1);
        assert_eq!(summary.result_available_after, Some(Duration::from_millis(3)));
        assert_eq!(summary.result_consumed_after, Some(Duration::from_millis(12)));
        assert_eq!(summary.bookmark.as_deref(), Some("FB:kcwQ"));
        assert_eq!(summary.database.as_deref(), Some("neo4j"));
        assert_eq!(summary.notifications.len(), 1);
        assert!(!summary.has_plan());
    }

    #[test]
    fn test_empty_summary() {
        let summary = ResultSummary::from_metadata(&Metadata::new(), None).unwrap();
        assert_eq!(summary, ResultSummary::default());
    }

    #[test]
    fn test_unknown_query_type() {
        let metadata = stats(&[("type", Value::from("x"))]);
        assert!(ResultSummary::from_metadata(&metadata, None).is_err());
    }
}
