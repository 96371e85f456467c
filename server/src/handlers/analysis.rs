//! Analysis handlers - aggregate statistics and trends

use axum::{extract::State, Json};
use serde::Serialize;
use sqlx::Row;
use std::collections::HashMap;

use crate::{AppState, AppResult};
use crate::models::Threat;
use crate::middleware::auth::UserContext;

#[derive(Debug, Serialize)]
pub struct Statistics {
    pub total_threats: i64,
    pub open_threats: i64,
    pub resolved_threats: i64,
    pub threats_by_severity: HashMap<String, i64>,
    pub threats_by_behavior: Vec<BehaviorCount>,
}

#[derive(Debug, Serialize)]
pub struct BehaviorCount {
    pub behavior: String,
    pub count: i64,
}

/// Get statistical analysis of threats
pub async fn statistics(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<Statistics>> {
    let row = sqlx::query(
        r#"
        SELECT
            COUNT(*) as total,
            COUNT(*) FILTER (WHERE status = 'OPEN') as open,
            COUNT(*) FILTER (WHERE status = 'RESOLVED') as resolved
        FROM threats
        "#
    )
    .fetch_one(&state.pool)
    .await?;

    let total_threats: i64 = row.get("total");
    let open_threats: i64 = row.get("open");
    let resolved_threats: i64 = row.get("resolved");

    let threats_by_severity = Threat::count_by_severity(&state.pool)
        .await?
        .into_iter()
        .collect();

    let threats_by_behavior = Threat::count_by_behavior(&state.pool)
        .await?
        .into_iter()
        .map(|(behavior, count)| BehaviorCount { behavior, count })
        .collect();

    Ok(Json(Statistics {
        total_threats,
        open_threats,
        resolved_threats,
        threats_by_severity,
        threats_by_behavior,
    }))
}

#[derive(Debug, Serialize)]
pub struct TrendPoint {
    pub day: String,
    pub count: i64,
    pub high_count: i64,
}

#[derive(Debug, Serialize)]
pub struct Trends {
    pub time_series: Vec<TrendPoint>,
    pub risk_forecast: &'static str,
}

/// Trend window in days
const TREND_DAYS: i32 = 14;

/// Get trend analysis of threats over time
pub async fn trends(
    State(state): State<AppState>,
    _user: UserContext,
) -> AppResult<Json<Trends>> {
    let rows = sqlx::query(
        r#"
        SELECT
            TO_CHAR(DATE(analyzed_at), 'YYYY-MM-DD') as day,
            COUNT(*) as count,
            COUNT(*) FILTER (WHERE severity = 'HIGH') as high_count
        FROM threats
        WHERE analyzed_at > NOW() - ($1 || ' days')::interval
        GROUP BY DATE(analyzed_at)
        ORDER BY DATE(analyzed_at)
        "#
    )
    .bind(TREND_DAYS.to_string())
    .fetch_all(&state.pool)
    .await?;

    let time_series: Vec<TrendPoint> = rows.into_iter().map(|r| TrendPoint {
        day: r.get("day"),
        count: r.get("count"),
        high_count: r.get("high_count"),
    }).collect();

    let recent_high: i64 = time_series.iter().map(|p| p.high_count).sum();
    let risk_forecast = forecast_risk(recent_high);

    Ok(Json(Trends { time_series, risk_forecast }))
}

/// Coarse risk level from recent HIGH-severity volume
fn forecast_risk(recent_high: i64) -> &'static str {
    if recent_high >= 50 {
        "HIGH"
    } else if recent_high >= 10 {
        "MEDIUM"
    } else {
        "LOW"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_risk_forecast_levels() {
        assert_eq!(forecast_risk(0), "LOW");
        assert_eq!(forecast_risk(9), "LOW");
        assert_eq!(forecast_risk(10), "MEDIUM");
        assert_eq!(forecast_risk(49), "MEDIUM");
        assert_eq!(forecast_risk(50), "HIGH");
    }
}
