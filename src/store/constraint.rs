use std::cmp::Ordering as CmpOrdering;

use chrono::{DateTime, Utc};
use serde_json::Value;

use super::{Document, Fields};

/// ===============================
/// Query clause variants
/// ===============================
///
/// Constraints are kept as a tagged variant so the degradation path can
/// pattern-match on what to drop instead of inspecting loosely-typed objects.
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    /// `field == value`
    Equality { field: String, value: Value },
    /// `field in values`
    Membership { field: String, values: Vec<Value> },
    /// Single-field ordering.
    Ordering { field: String, direction: Direction },
    /// Result-set cap, applied after ordering.
    Limit(usize),
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum Direction {
    Ascending,
    Descending,
}

impl Constraint {
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Constraint::Equality {
            field: field.into(),
            value: value.into(),
        }
    }

    pub fn any_of(field: impl Into<String>, values: Vec<Value>) -> Self {
        Constraint::Membership {
            field: field.into(),
            values,
        }
    }

    pub fn order_by(field: impl Into<String>, direction: Direction) -> Self {
        Constraint::Ordering {
            field: field.into(),
            direction,
        }
    }

    pub fn limit(n: usize) -> Self {
        Constraint::Limit(n)
    }

    /// True for clauses that filter the result set (survive degradation).
    pub fn is_filter(&self) -> bool {
        matches!(
            self,
            Constraint::Equality { .. } | Constraint::Membership { .. }
        )
    }

    pub fn summary(&self) -> String {
        match self {
            Constraint::Equality { field, value } => format!("{field} == {value}"),
            Constraint::Membership { field, values } => {
                format!("{field} in [{} values]", values.len())
            }
            Constraint::Ordering { field, direction } => {
                let dir = match direction {
                    Direction::Ascending => "asc",
                    Direction::Descending => "desc",
                };
                format!("order by {field} {dir}")
            }
            Constraint::Limit(n) => format!("limit {n}"),
        }
    }
}

/// Comma-joined clause summary, used to annotate errors and log lines.
pub fn summarize(constraints: &[Constraint]) -> String {
    constraints
        .iter()
        .map(Constraint::summary)
        .collect::<Vec<_>>()
        .join(", ")
}

/// ===============================
/// Field lookup
/// ===============================
///
/// Supports dotted paths into nested objects (`assignedTeacher.id`). A missing
/// segment resolves to null, which sorts as the earliest possible instant.
pub fn lookup_field<'a>(fields: &'a Fields, path: &str) -> &'a Value {
    let mut current: &Value = &Value::Null;
    let mut map = Some(fields);
    for segment in path.split('.') {
        match map.and_then(|m| m.get(segment)) {
            Some(value) => {
                current = value;
                map = value.as_object();
            }
            None => return &Value::Null,
        }
    }
    current
}

/// ===============================
/// Value ordering
/// ===============================
///
/// Nulls sort earliest; RFC 3339 strings compare by their underlying instant;
/// otherwise numbers, strings and bools compare natively. Mixed kinds fall
/// back to a stable textual comparison.
pub fn compare_values(a: &Value, b: &Value) -> CmpOrdering {
    fn as_instant(v: &Value) -> Option<DateTime<Utc>> {
        v.as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
    }

    match (a, b) {
        (Value::Null, Value::Null) => CmpOrdering::Equal,
        (Value::Null, _) => CmpOrdering::Less,
        (_, Value::Null) => CmpOrdering::Greater,
        _ => {
            if let (Some(x), Some(y)) = (as_instant(a), as_instant(b)) {
                return x.cmp(&y);
            }
            match (a, b) {
                (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
                (Value::Number(x), Value::Number(y)) => x
                    .as_f64()
                    .partial_cmp(&y.as_f64())
                    .unwrap_or(CmpOrdering::Equal),
                (Value::String(x), Value::String(y)) => x.cmp(y),
                _ => a.to_string().cmp(&b.to_string()),
            }
        }
    }
}

/// Whether a document satisfies every filter clause (ordering/limit ignored).
pub fn matches(fields: &Fields, constraints: &[Constraint]) -> bool {
    constraints.iter().all(|constraint| match constraint {
        Constraint::Equality { field, value } => lookup_field(fields, field) == value,
        Constraint::Membership { field, values } => values.contains(lookup_field(fields, field)),
        Constraint::Ordering { .. } | Constraint::Limit(_) => true,
    })
}

/// In-place sort by one field, null-earliest, timestamp-aware. Stable, so
/// equal keys keep their incoming order.
pub fn sort_documents(docs: &mut [Document], field: &str, direction: Direction) {
    docs.sort_by(|a, b| {
        let ord = compare_values(a.field(field), b.field(field));
        match direction {
            Direction::Ascending => ord,
            Direction::Descending => ord.reverse(),
        }
    });
}

/// Full client-side evaluation of a constraint list, in clause order:
/// filters first, then the ordering clause, then the limit.
pub fn apply(mut docs: Vec<Document>, constraints: &[Constraint]) -> Vec<Document> {
    docs.retain(|doc| matches(&doc.fields, constraints));
    if let Some(Constraint::Ordering { field, direction }) = constraints
        .iter()
        .find(|c| matches!(c, Constraint::Ordering { .. }))
    {
        sort_documents(&mut docs, field, *direction);
    }
    if let Some(Constraint::Limit(n)) = constraints
        .iter()
        .find(|c| matches!(c, Constraint::Limit(_)))
    {
        docs.truncate(*n);
    }
    docs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(id: &str, fields: Value) -> Document {
        match fields {
            Value::Object(map) => Document {
                id: id.to_string(),
                fields: map,
            },
            _ => unreachable!(),
        }
    }

    #[test]
    fn timestamps_compare_by_instant_not_text() {
        // Different offsets, same ordering by instant.
        let earlier = json!("2024-01-10T23:00:00+05:00"); // 18:00 UTC
        let later = json!("2024-01-10T19:00:00Z");
        assert_eq!(compare_values(&earlier, &later), CmpOrdering::Less);
    }

    #[test]
    fn nulls_sort_earliest() {
        assert_eq!(
            compare_values(&Value::Null, &json!("2024-01-01T00:00:00Z")),
            CmpOrdering::Less
        );
        assert_eq!(compare_values(&json!(0), &Value::Null), CmpOrdering::Greater);
    }

    #[test]
    fn dotted_path_lookup() {
        let d = doc("u1", json!({"assignedTeacher": {"id": "t-9"}}));
        assert_eq!(d.field("assignedTeacher.id"), &json!("t-9"));
        assert_eq!(d.field("assignedTeacher.name"), &Value::Null);
        assert_eq!(d.field("missing.path"), &Value::Null);
    }

    #[test]
    fn apply_filters_sorts_and_limits() {
        let docs = vec![
            doc("a", json!({"status": "pending", "createdAt": "2024-01-02T00:00:00Z"})),
            doc("b", json!({"status": "approved", "createdAt": "2024-01-03T00:00:00Z"})),
            doc("c", json!({"status": "pending", "createdAt": "2024-01-04T00:00:00Z"})),
            doc("d", json!({"status": "pending"})), // no createdAt: sorts last desc
        ];
        let constraints = vec![
            Constraint::eq("status", "pending"),
            Constraint::order_by("createdAt", Direction::Descending),
            Constraint::limit(2),
        ];
        let out = apply(docs, &constraints);
        let ids: Vec<_> = out.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);
    }

    #[test]
    fn membership_matches_any_listed_value() {
        let constraints = vec![Constraint::any_of(
            "gatemanStatus",
            vec![json!("out"), json!("returned")],
        )];
        let out_doc = doc("a", json!({"gatemanStatus": "out"}));
        let waiting = doc("b", json!({"gatemanStatus": "waiting"}));
        assert!(matches(&out_doc.fields, &constraints));
        assert!(!matches(&waiting.fields, &constraints));
    }
}
