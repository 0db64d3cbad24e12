//! Compute tools: pure numeric functions over score records.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{Tool, ToolError, ToolSpec};

pub const TOOL_SUMMARY_STATS: &str = "summary_stats";
pub const TOOL_COMPARE_POPULATIONS: &str = "compare_populations";

/// Extracts a numeric series from the arguments: either `values` (a number
/// array) or `records` + `field` (objects carrying a numeric field).
fn extract_values(args: &Value, tool: &str) -> Result<Vec<f64>, ToolError> {
    if let Some(values) = args.get("values").and_then(Value::as_array) {
        return Ok(values.iter().filter_map(Value::as_f64).collect());
    }
    let field = args.get("field").and_then(Value::as_str).unwrap_or("score");
    if let Some(records) = args.get("records").and_then(Value::as_array) {
        return Ok(records
            .iter()
            .filter_map(|r| r.get(field).and_then(Value::as_f64))
            .collect());
    }
    Err(ToolError::InvalidArgs {
        tool: tool.to_string(),
        message: "expected 'values' or 'records'".into(),
    })
}

fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let rank = p * (sorted.len() - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted[lo]
    } else {
        sorted[lo] + (sorted[hi] - sorted[lo]) * (rank - lo as f64)
    }
}

fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

/// Summary statistics plus a bucketed distribution (0-59, 60-69, .., 90-100).
pub struct SummaryStatsTool;

#[async_trait]
impl Tool for SummaryStatsTool {
    fn name(&self) -> &str {
        TOOL_SUMMARY_STATS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_SUMMARY_STATS.into(),
            description:
                "Summary statistics (mean, median, stddev, min, max, quartiles, distribution) \
                 over 'values' or 'records' with a numeric 'field' (default score)"
                    .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "values": {"type": "array", "items": {"type": "number"}},
                    "records": {"type": "array", "items": {"type": "object"}},
                    "field": {"type": "string", "description": "Numeric field of each record. Default 'score'."}
                }
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let values = extract_values(&args, self.name())?;
        if values.is_empty() {
            return Ok(json!({
                "count": 0,
                "mean": 0.0, "median": 0.0, "stdDev": 0.0,
                "min": 0.0, "max": 0.0,
                "p25": 0.0, "p50": 0.0, "p75": 0.0,
                "distribution": []
            }));
        }

        let count = values.len();
        let mean = values.iter().sum::<f64>() / count as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / count as f64;
        let mut sorted = values.clone();
        sorted.sort_by(|a, b| a.total_cmp(b));

        let buckets = [
            ("0-59", 0.0, 59.0),
            ("60-69", 60.0, 69.0),
            ("70-79", 70.0, 79.0),
            ("80-89", 80.0, 89.0),
            ("90-100", 90.0, f64::MAX),
        ];
        let distribution: Vec<Value> = buckets
            .iter()
            .map(|(label, lo, hi)| {
                let n = values.iter().filter(|v| **v >= *lo && **v <= *hi).count();
                json!({"bucket": label, "count": n})
            })
            .collect();

        Ok(json!({
            "count": count,
            "mean": round2(mean),
            "median": round2(percentile(&sorted, 0.5)),
            "stdDev": round2(variance.sqrt()),
            "min": sorted[0],
            "max": sorted[count - 1],
            "p25": round2(percentile(&sorted, 0.25)),
            "p50": round2(percentile(&sorted, 0.5)),
            "p75": round2(percentile(&sorted, 0.75)),
            "distribution": distribution
        }))
    }
}

/// Two-population comparison: delta of means plus per-student
/// improvement/decline counts (paired by a key field when possible).
pub struct ComparePopulationsTool;

fn keyed_scores(records: &[Value], key: &str, field: &str) -> Map<String, Value> {
    let mut out = Map::new();
    for r in records {
        let Some(k) = r.get(key).and_then(Value::as_str) else {
            continue;
        };
        if let Some(v) = r.get(field).and_then(Value::as_f64) {
            out.insert(k.to_string(), json!(v));
        }
    }
    out
}

#[async_trait]
impl Tool for ComparePopulationsTool {
    fn name(&self) -> &str {
        TOOL_COMPARE_POPULATIONS
    }

    fn spec(&self) -> ToolSpec {
        ToolSpec {
            name: TOOL_COMPARE_POPULATIONS.into(),
            description:
                "Compare two populations ('before' and 'after' record arrays): delta of means \
                 and per-student improved/declined counts, paired by 'key' (default studentId)"
                    .into(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "before": {"type": "array", "items": {"type": "object"}},
                    "after": {"type": "array", "items": {"type": "object"}},
                    "field": {"type": "string", "description": "Numeric field. Default 'score'."},
                    "key": {"type": "string", "description": "Pairing key. Default 'studentId'."}
                },
                "required": ["before", "after"]
            }),
        }
    }

    async fn call(&self, args: Value) -> Result<Value, ToolError> {
        let field = args.get("field").and_then(Value::as_str).unwrap_or("score");
        let key = args.get("key").and_then(Value::as_str).unwrap_or("studentId");
        let before = args
            .get("before")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: self.name().into(),
                message: "missing 'before' array".into(),
            })?;
        let after = args
            .get("after")
            .and_then(Value::as_array)
            .ok_or_else(|| ToolError::InvalidArgs {
                tool: self.name().into(),
                message: "missing 'after' array".into(),
            })?;

        let mean = |records: &[Value]| -> f64 {
            let vals: Vec<f64> = records
                .iter()
                .filter_map(|r| r.get(field).and_then(Value::as_f64))
                .collect();
            if vals.is_empty() {
                0.0
            } else {
                vals.iter().sum::<f64>() / vals.len() as f64
            }
        };
        let before_mean = mean(before);
        let after_mean = mean(after);

        let before_by_key = keyed_scores(before, key, field);
        let after_by_key = keyed_scores(after, key, field);
        let mut improved = 0usize;
        let mut declined = 0usize;
        let mut unchanged = 0usize;
        for (k, b) in &before_by_key {
            let (Some(b), Some(a)) = (b.as_f64(), after_by_key.get(k).and_then(Value::as_f64))
            else {
                continue;
            };
            if a > b {
                improved += 1;
            } else if a < b {
                declined += 1;
            } else {
                unchanged += 1;
            }
        }

        Ok(json!({
            "beforeMean": round2(before_mean),
            "afterMean": round2(after_mean),
            "deltaMean": round2(after_mean - before_mean),
            "improved": improved,
            "declined": declined,
            "unchanged": unchanged
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn summary_stats_over_values() {
        let out = SummaryStatsTool
            .call(json!({"values": [45.0, 58.0, 66.0, 74.0, 82.0, 91.0]}))
            .await
            .unwrap();
        assert_eq!(out["count"], 6);
        assert_eq!(out["mean"], 69.33);
        assert_eq!(out["min"], 45.0);
        assert_eq!(out["max"], 91.0);
        assert_eq!(out["median"], 70.0);
        let dist = out["distribution"].as_array().unwrap();
        assert_eq!(dist.len(), 5);
        assert_eq!(dist[0]["count"], 2); // 45, 58
        assert_eq!(dist[4]["count"], 1); // 91
    }

    #[tokio::test]
    async fn summary_stats_over_records_with_field() {
        let out = SummaryStatsTool
            .call(json!({
                "records": [
                    {"studentId": "a", "score": 80.0},
                    {"studentId": "b", "score": 60.0},
                    {"studentId": "c"}
                ],
                "field": "score"
            }))
            .await
            .unwrap();
        // The record without a score is skipped, not treated as zero.
        assert_eq!(out["count"], 2);
        assert_eq!(out["mean"], 70.0);
    }

    #[tokio::test]
    async fn summary_stats_empty_input_is_zeroed() {
        let out = SummaryStatsTool.call(json!({"values": []})).await.unwrap();
        assert_eq!(out["count"], 0);
        assert_eq!(out["distribution"], json!([]));
    }

    #[tokio::test]
    async fn compare_pairs_by_student() {
        let out = ComparePopulationsTool
            .call(json!({
                "before": [
                    {"studentId": "a", "score": 50.0},
                    {"studentId": "b", "score": 70.0},
                    {"studentId": "c", "score": 60.0}
                ],
                "after": [
                    {"studentId": "a", "score": 65.0},
                    {"studentId": "b", "score": 68.0},
                    {"studentId": "c", "score": 60.0}
                ]
            }))
            .await
            .unwrap();
        assert_eq!(out["improved"], 1);
        assert_eq!(out["declined"], 1);
        assert_eq!(out["unchanged"], 1);
        assert_eq!(out["deltaMean"], 4.33);
    }

    #[tokio::test]
    async fn compare_without_before_is_invalid() {
        let err = ComparePopulationsTool
            .call(json!({"after": []}))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArgs { .. }));
    }
}
