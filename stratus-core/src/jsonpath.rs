//! Path search over decoded API responses
//!
//! Expressions are dotted field names with optional index suffixes:
//! `status`, `instances[0].instance_id`, `entities.sub_jobs[-1].status`.
//! Negative indices count from the end of the array.

/// One step of a parsed expression
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment<'a> {
    Field(&'a str),
    Index(i64),
}

fn parse(expr: &str) -> Option<Vec<Segment<'_>>> {
    let mut segments = Vec::new();

    for part in expr.split('.') {
        let (field, mut rest) = match part.find('[') {
            Some(pos) => (&part[..pos], &part[pos..]),
            None => (part, ""),
        };

        if !field.is_empty() {
            segments.push(Segment::Field(field));
        } else if rest.is_empty() {
            // Empty segment like "a..b" or a trailing dot
            return None;
        }

        while !rest.is_empty() {
            let close = rest.find(']')?;
            if !rest.starts_with('[') {
                return None;
            }
            let index = rest[1..close].trim().parse::<i64>().ok()?;
            segments.push(Segment::Index(index));
            rest = &rest[close + 1..];
        }
    }

    Some(segments)
}

/// Find the value at `expr`. Returns `None` for missing fields, out-of-range
/// indices, type mismatches and malformed expressions.
pub fn path_search<'v>(expr: &str, value: &'v serde_json::Value) -> Option<&'v serde_json::Value> {
    let segments = parse(expr)?;
    let mut current = value;

    for segment in segments {
        current = match segment {
            Segment::Field(name) => current.as_object()?.get(name)?,
            Segment::Index(index) => {
                let arr = current.as_array()?;
                let len = arr.len() as i64;
                let resolved = if index < 0 { len + index } else { index };
                if resolved < 0 {
                    return None;
                }
                arr.get(resolved as usize)?
            }
        };
    }

    if current.is_null() {
        None
    } else {
        Some(current)
    }
}

/// String at `expr`, or `default` when absent or not a string
pub fn path_search_str(expr: &str, value: &serde_json::Value, default: &str) -> String {
    path_search(expr, value)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn job() -> serde_json::Value {
        json!({
            "status": "RUNNING",
            "entities": {
                "image_id": "img-123",
                "sub_jobs": [
                    {"status": "SUCCESS"},
                    {"status": "RUNNING", "progress": 40}
                ]
            },
            "fail_reason": null,
            "matrix": [[1, 2], [3, 4]]
        })
    }

    #[test]
    fn test_top_level_field() {
        assert_eq!(path_search("status", &job()), Some(&json!("RUNNING")));
    }

    #[test]
    fn test_nested_fields_and_indices() {
        let body = job();
        assert_eq!(path_search_str("entities.image_id", &body, ""), "img-123");
        assert_eq!(
            path_search_str("entities.sub_jobs[0].status", &body, ""),
            "SUCCESS"
        );
        assert_eq!(
            path_search("entities.sub_jobs[-1].progress", &body),
            Some(&json!(40))
        );
        assert_eq!(path_search("matrix[1][0]", &body), Some(&json!(3)));
    }

    #[test]
    fn test_missing_returns_default() {
        let body = job();
        assert_eq!(path_search_str("entities.missing", &body, "none"), "none");
        assert_eq!(path_search_str("entities.sub_jobs[5].status", &body, "x"), "x");
        assert_eq!(path_search("matrix[-3][0]", &body), None);
    }

    #[test]
    fn test_null_is_absent() {
        assert_eq!(path_search("fail_reason", &job()), None);
        assert_eq!(path_search_str("fail_reason", &job(), "n/a"), "n/a");
    }

    #[test]
    fn test_type_mismatch_is_absent() {
        let body = job();
        assert_eq!(path_search("status[0]", &body), None);
        assert_eq!(path_search("matrix.key", &body), None);
        assert_eq!(path_search_str("entities.sub_jobs[1].progress", &body, "d"), "d");
    }

    #[test]
    fn test_malformed_expressions() {
        let body = job();
        assert_eq!(path_search("entities..image_id", &body), None);
        assert_eq!(path_search("matrix[x]", &body), None);
        assert_eq!(path_search("matrix[0", &body), None);
        assert_eq!(path_search("status.", &body), None);
    }
}
