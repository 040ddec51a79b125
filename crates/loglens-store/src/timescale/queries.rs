// Aggregation queries over the metric hypertable
//
// SQL is assembled from an allow-listed vocabulary (group dimensions,
// intervals, metric names), never from raw caller input. Values go in
// as bind parameters.

use crate::timescale::METRIC_EVENTS_TABLE;
use crate::{MetricRepository, StoreError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use loglens_core::query::{
    ApplicationListRequest, ApplicationListResponse, DistributionItem, MetricDistributionRequest,
    MetricDistributionResponse, MetricSummaryRequest, MetricSummaryResponse,
    MetricTimeseriesRequest, MetricTimeseriesResponse, SortSpec, TimeseriesPoint, TimeseriesSeries,
};
use sqlx::postgres::PgPool;
use sqlx::Row;
use tracing::{debug, warn};

const VALID_METRICS: [&str; 2] = ["log_event", "error_event"];
const VALID_INTERVALS: [&str; 6] = [
    "1 minute", "5 minute", "10 minute", "30 minute", "1 hour", "1 day",
];
const GROUP_DIMENSIONS: [&str; 4] = ["level", "component", "error_key", "application"];

pub struct TimescaleMetricRepository {
    pool: PgPool,
}

impl TimescaleMetricRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn check_time_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<(), StoreError> {
    if end < start {
        return Err(StoreError::InvalidRequest(
            "endTime cannot be before startTime".to_string(),
        ));
    }
    Ok(())
}

fn check_metric_name(name: &str) -> Result<(), StoreError> {
    if !VALID_METRICS.contains(&name) {
        return Err(StoreError::InvalidRequest(format!(
            "invalid metricName: {}",
            name
        )));
    }
    Ok(())
}

/// SQL expression a group dimension aggregates over.
fn group_expr(group_by: &str) -> &'static str {
    match group_by {
        "level" => "tags->>'level'",
        "component" => "tags->>'component'",
        "error_key" => "tags->>'error_key'",
        "application" => "application",
        _ => "'total'",
    }
}

/// "$4,$5,$6" for the application IN list.
fn placeholders(from: usize, count: usize) -> String {
    (from..from + count)
        .map(|i| format!("${}", i))
        .collect::<Vec<_>>()
        .join(",")
}

/// ORDER BY for the timeseries query. Defaults to bucket order, a caller
/// sort is mapped onto the output columns with bucket as tie breaker.
fn order_clause(sort: &Option<SortSpec>, group_by: &str) -> String {
    let Some(sort) = sort else {
        return "ORDER BY bucket ASC".to_string();
    };

    let column = match sort.field.as_str() {
        "value" => "value",
        "time" | "@timestamp" => "bucket",
        f if GROUP_DIMENSIONS.contains(&f) && f == group_by => "group_key",
        other => {
            warn!(field = other, "Unknown sort field for timeseries, falling back to bucket");
            "bucket"
        }
    };

    let direction = if sort.order.eq_ignore_ascii_case("desc") {
        "DESC"
    } else {
        "ASC"
    };

    if column == "bucket" {
        format!("ORDER BY bucket {}", direction)
    } else {
        format!("ORDER BY {} {}, bucket ASC", column, direction)
    }
}

/// The timeseries SQL and the 1-based index of the interval parameter.
fn build_timeseries_sql(req: &MetricTimeseriesRequest) -> (String, usize) {
    let mut where_clauses = vec![
        "metric_name = $1".to_string(),
        "time >= $2".to_string(),
        "time < $3".to_string(),
    ];
    let mut next_arg = 4;

    if !req.applications.is_empty() {
        where_clauses.push(format!(
            "application IN ({})",
            placeholders(next_arg, req.applications.len())
        ));
        next_arg += req.applications.len();
    }

    if req.group_by == "component" {
        where_clauses.push("tags->>'component' NOT IN ('UNKNOWN', 'ORPHAN')".to_string());
    }

    let interval_arg = next_arg;
    let group_cols = if req.group_by == "total" {
        "bucket"
    } else {
        "bucket, group_key"
    };

    let sql = format!(
        "SELECT time_bucket(${}::interval, time) AS bucket, {} AS group_key, COUNT(*) AS value \
         FROM {} WHERE {} GROUP BY {} {}{}",
        interval_arg,
        group_expr(&req.group_by),
        METRIC_EVENTS_TABLE,
        where_clauses.join(" AND "),
        group_cols,
        order_clause(&req.sort, &req.group_by),
        req.limit.map(|n| format!(" LIMIT {}", n)).unwrap_or_default(),
    );

    (sql, interval_arg)
}

/// A scanned timeseries row before series assembly.
#[derive(Debug, Clone)]
struct TsRow {
    bucket_ms: i64,
    group_key: Option<String>,
    value: i64,
}

/// Partition rows into one series per group key, preserving row order
/// inside each series. NULL keys of a grouped query become "<dim>_NULL".
fn assemble_series(rows: Vec<TsRow>, group_by: &str) -> Vec<TimeseriesSeries> {
    let mut series: Vec<TimeseriesSeries> = Vec::new();

    for row in rows {
        let name = match row.group_key {
            Some(key) => key,
            None if group_by == "total" => "total".to_string(),
            None => format!("{}_NULL", group_by),
        };

        let point = TimeseriesPoint {
            timestamp: row.bucket_ms,
            value: row.value,
        };

        match series.iter_mut().find(|s| s.name == name) {
            Some(existing) => existing.data.push(point),
            None => series.push(TimeseriesSeries {
                name,
                data: vec![point],
            }),
        }
    }

    series
}

#[async_trait]
impl MetricRepository for TimescaleMetricRepository {
    async fn summary(
        &self,
        req: MetricSummaryRequest,
    ) -> Result<MetricSummaryResponse, StoreError> {
        check_time_window(req.start_time, req.end_time)?;

        let mut where_clauses = vec!["time >= $1".to_string(), "time < $2".to_string()];
        if !req.applications.is_empty() {
            where_clauses.push(format!(
                "application IN ({})",
                placeholders(3, req.applications.len())
            ));
        }
        let where_sql = where_clauses.join(" AND ");

        let count_for = |metric: &'static str| {
            let sql = format!(
                "SELECT COUNT(*) FROM {} WHERE metric_name = '{}' AND {}",
                METRIC_EVENTS_TABLE, metric, where_sql
            );
            let applications = req.applications.clone();
            let pool = self.pool.clone();
            async move {
                let mut query = sqlx::query(&sql).bind(req.start_time).bind(req.end_time);
                for app in &applications {
                    query = query.bind(app);
                }
                query
                    .fetch_one(&pool)
                    .await
                    .map(|row| row.get::<i64, _>(0))
                    .map_err(|e| StoreError::Timeseries(e.to_string()))
            }
        };

        Ok(MetricSummaryResponse {
            total_log_events: count_for("log_event").await?,
            total_error_events: count_for("error_event").await?,
        })
    }

    async fn timeseries(
        &self,
        mut req: MetricTimeseriesRequest,
    ) -> Result<MetricTimeseriesResponse, StoreError> {
        check_time_window(req.start_time, req.end_time)?;
        check_metric_name(&req.metric_name)?;

        if !VALID_INTERVALS.contains(&req.interval.as_str()) {
            return Err(StoreError::InvalidRequest(format!(
                "invalid interval: {}",
                req.interval
            )));
        }

        if req.group_by.is_empty() {
            req.group_by = "total".to_string();
        }
        if req.group_by != "total" && !GROUP_DIMENSIONS.contains(&req.group_by.as_str()) {
            warn!(group_by = %req.group_by, "Invalid groupBy, aggregating total instead");
            req.group_by = "total".to_string();
        }

        let (sql, _) = build_timeseries_sql(&req);
        debug!(sql = %sql, "Executing timeseries query");

        let mut query = sqlx::query(&sql)
            .bind(&req.metric_name)
            .bind(req.start_time)
            .bind(req.end_time);
        for app in &req.applications {
            query = query.bind(app);
        }
        query = query.bind(&req.interval);

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Timeseries(e.to_string()))?;

        let ts_rows = rows
            .into_iter()
            .map(|row| {
                let bucket: DateTime<Utc> = row.get("bucket");
                TsRow {
                    bucket_ms: bucket.timestamp_millis(),
                    group_key: row.get("group_key"),
                    value: row.get("value"),
                }
            })
            .collect();

        Ok(MetricTimeseriesResponse {
            series: assemble_series(ts_rows, &req.group_by),
        })
    }

    async fn distribution(
        &self,
        req: MetricDistributionRequest,
    ) -> Result<MetricDistributionResponse, StoreError> {
        check_time_window(req.start_time, req.end_time)?;
        check_metric_name(&req.metric_name)?;

        if !GROUP_DIMENSIONS.contains(&req.dimension.as_str()) {
            return Err(StoreError::InvalidRequest(format!(
                "invalid dimension for distribution: {}",
                req.dimension
            )));
        }

        let expr = group_expr(&req.dimension);
        let mut where_clauses = vec![
            "metric_name = $1".to_string(),
            "time >= $2".to_string(),
            "time < $3".to_string(),
            format!("{} IS NOT NULL", expr),
        ];
        if !req.applications.is_empty() {
            where_clauses.push(format!(
                "application IN ({})",
                placeholders(4, req.applications.len())
            ));
        }
        if req.dimension == "component" {
            where_clauses.push("tags->>'component' NOT IN ('UNKNOWN', 'ORPHAN')".to_string());
        }

        let sql = format!(
            "SELECT {} AS name, COUNT(*) AS value FROM {} WHERE {} GROUP BY name ORDER BY value DESC",
            expr,
            METRIC_EVENTS_TABLE,
            where_clauses.join(" AND ")
        );

        let mut query = sqlx::query(&sql)
            .bind(&req.metric_name)
            .bind(req.start_time)
            .bind(req.end_time);
        for app in &req.applications {
            query = query.bind(app);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Timeseries(e.to_string()))?;

        let items = rows
            .into_iter()
            .map(|row| DistributionItem {
                name: row.get("name"),
                value: row.get("value"),
            })
            .collect();

        Ok(MetricDistributionResponse { items })
    }

    async fn applications(
        &self,
        req: ApplicationListRequest,
    ) -> Result<ApplicationListResponse, StoreError> {
        check_time_window(req.start_time, req.end_time)?;

        let sql = format!(
            "SELECT DISTINCT application FROM {} WHERE time >= $1 AND time < $2 ORDER BY application",
            METRIC_EVENTS_TABLE
        );

        let rows = sqlx::query(&sql)
            .bind(req.start_time)
            .bind(req.end_time)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| StoreError::Timeseries(e.to_string()))?;

        let applications = rows.into_iter().map(|row| row.get("application")).collect();
        Ok(ApplicationListResponse { applications })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts_req(group_by: &str) -> MetricTimeseriesRequest {
        MetricTimeseriesRequest {
            start_time: Utc.with_ymd_and_hms(2022, 1, 24, 9, 0, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2022, 1, 24, 11, 0, 0).unwrap(),
            applications: vec![],
            metric_name: "log_event".to_string(),
            interval: "5 minute".to_string(),
            group_by: group_by.to_string(),
            sort: None,
            limit: None,
        }
    }

    #[test]
    fn test_group_expr_mapping() {
        assert_eq!(group_expr("level"), "tags->>'level'");
        assert_eq!(group_expr("component"), "tags->>'component'");
        assert_eq!(group_expr("error_key"), "tags->>'error_key'");
        assert_eq!(group_expr("application"), "application");
        assert_eq!(group_expr("total"), "'total'");
        assert_eq!(group_expr(""), "'total'");
    }

    #[test]
    fn test_timeseries_sql_grouped_by_level() {
        let (sql, interval_arg) = build_timeseries_sql(&ts_req("level"));

        assert!(sql.contains("time_bucket($4::interval, time) AS bucket"));
        assert_eq!(interval_arg, 4);
        assert!(sql.contains("tags->>'level' AS group_key"));
        assert!(sql.contains("GROUP BY bucket, group_key"));
        assert!(sql.contains("ORDER BY bucket ASC"));
        assert!(!sql.contains("NOT IN"));
    }

    #[test]
    fn test_timeseries_sql_component_excludes_unknown_orphan() {
        let (sql, _) = build_timeseries_sql(&ts_req("component"));
        assert!(sql.contains("tags->>'component' NOT IN ('UNKNOWN', 'ORPHAN')"));
    }

    #[test]
    fn test_timeseries_sql_total_has_single_group_column() {
        let (sql, _) = build_timeseries_sql(&ts_req("total"));
        assert!(sql.contains("'total' AS group_key"));
        assert!(sql.contains("GROUP BY bucket ORDER BY"));
    }

    #[test]
    fn test_timeseries_sql_application_filter_shifts_interval_arg() {
        let mut req = ts_req("level");
        req.applications = vec!["application_1_1".to_string(), "application_2_2".to_string()];
        let (sql, interval_arg) = build_timeseries_sql(&req);

        assert!(sql.contains("application IN ($4,$5)"));
        assert_eq!(interval_arg, 6);
        assert!(sql.contains("time_bucket($6::interval"));
    }

    #[test]
    fn test_order_clause_mapping() {
        let by_value = Some(SortSpec {
            field: "value".to_string(),
            order: "desc".to_string(),
        });
        assert_eq!(order_clause(&by_value, "level"), "ORDER BY value DESC, bucket ASC");

        let by_time = Some(SortSpec {
            field: "@timestamp".to_string(),
            order: "asc".to_string(),
        });
        assert_eq!(order_clause(&by_time, "level"), "ORDER BY bucket ASC");

        let by_dim = Some(SortSpec {
            field: "level".to_string(),
            order: "asc".to_string(),
        });
        assert_eq!(order_clause(&by_dim, "level"), "ORDER BY group_key ASC, bucket ASC");

        let unknown = Some(SortSpec {
            field: "nonsense".to_string(),
            order: "desc".to_string(),
        });
        assert_eq!(order_clause(&unknown, "level"), "ORDER BY bucket DESC");

        assert_eq!(order_clause(&None, "level"), "ORDER BY bucket ASC");
    }

    #[test]
    fn test_timeseries_sql_limit() {
        let mut req = ts_req("level");
        req.limit = Some(10);
        let (sql, _) = build_timeseries_sql(&req);
        assert!(sql.ends_with("LIMIT 10"));
    }

    #[test]
    fn test_assemble_series_two_levels_over_buckets() {
        // 120 events over 2h in 5 minute buckets, split INFO/ERROR,
        // comes back from the store as one row per (bucket, key)
        let base = Utc.with_ymd_and_hms(2022, 1, 24, 9, 0, 0).unwrap();
        let mut rows = Vec::new();
        for i in 0..24 {
            let bucket_ms = (base + chrono::Duration::minutes(5 * i)).timestamp_millis();
            rows.push(TsRow {
                bucket_ms,
                group_key: Some("INFO".to_string()),
                value: 3,
            });
            rows.push(TsRow {
                bucket_ms,
                group_key: Some("ERROR".to_string()),
                value: 2,
            });
        }

        let series = assemble_series(rows, "level");
        assert_eq!(series.len(), 2);

        let info = series.iter().find(|s| s.name == "INFO").unwrap();
        let error = series.iter().find(|s| s.name == "ERROR").unwrap();
        assert_eq!(info.data.len(), 24);
        assert_eq!(error.data.len(), 24);
        assert_eq!(info.data.iter().map(|p| p.value).sum::<i64>(), 72);
        assert_eq!(error.data.iter().map(|p| p.value).sum::<i64>(), 48);
        // row order preserved inside a series
        assert!(info.data.windows(2).all(|w| w[0].timestamp < w[1].timestamp));
    }

    #[test]
    fn test_assemble_series_total_and_null_naming() {
        let rows = vec![
            TsRow {
                bucket_ms: 1000,
                group_key: Some("total".to_string()),
                value: 5,
            },
            TsRow {
                bucket_ms: 2000,
                group_key: None,
                value: 7,
            },
        ];
        let series = assemble_series(rows.clone(), "total");
        assert_eq!(series.len(), 1);
        assert_eq!(series[0].name, "total");

        let series = assemble_series(rows, "error_key");
        assert_eq!(series.len(), 2);
        assert!(series.iter().any(|s| s.name == "error_key_NULL"));
    }
}
