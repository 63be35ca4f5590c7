//! Alert filter vocabulary and its compilation into a query condition.
//!
//! Callers pass an open `key -> values` map (the shape of a URL query
//! string). [`AlertFilter::parse_map`] validates it into a closed set of
//! [`AlertFilter`] variants, and [`compile`] turns those into one conjunctive
//! [`Condition`] evaluated against a fixed `now`.
//!
//! | key                   | effect                                                    |
//! |-----------------------|-----------------------------------------------------------|
//! | `simulated`           | `"false"` excludes simulated alerts, anything else no-op  |
//! | `scope` / `value`     | exact match on the alert source                           |
//! | `scenario`            | exact match on the scenario name                          |
//! | `ip` / `range`        | a decision's bounds lie within the IPv4 host / CIDR       |
//! |                       | (one window; `range` replaces `ip` when both are given)   |
//! | `since` / `until`     | created at or after / at or before `now - duration`       |
//! | `decision_type`       | at least one decision of that type                        |
//! | `include_capi`        | `"false"`: at least one decision not from `CAPI`          |
//! | `has_active_decision` | `true`: an unexpired decision; `false`: no decisions      |

use chrono::{DateTime, Duration, Utc};
use sea_orm::sea_query::{Query, SelectStatement, SimpleExpr};
use sea_orm::{ColumnTrait, Condition};
use std::collections::{BTreeMap, HashMap};
use vigil_common::duration::{parse_duration, DurationError};
use vigil_common::iprange::IpRange;

use crate::entities::alert::Column as AlertCol;
use crate::entities::decision::{Column as DecisionCol, Entity as DecisionEntity};
use crate::error::{Result, StoreError};

/// Wire form of a filter: each key maps to one or more values, of which only
/// the first is used.
pub type FilterMap = HashMap<String, Vec<String>>;

/// Origin tag of decisions received from the upstream shared-intelligence feed.
pub const CAPI_ORIGIN: &str = "CAPI";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlertFilter {
    NotSimulated,
    Scope(String),
    Value(String),
    Scenario(String),
    /// At least one decision whose `[start_ip, end_ip]` lies inside the range.
    IpRange(IpRange),
    /// Created at or after `now - duration`.
    Since(Duration),
    /// Created at or before `now - duration`.
    Until(Duration),
    /// Created at or before an absolute instant. Not reachable from the wire
    /// format; used by retention.
    CreatedBefore(DateTime<Utc>),
    DecisionType(String),
    /// At least one decision whose origin is not `CAPI`. Alerts without
    /// decisions do not match.
    ExcludeCapi,
    /// `true`: at least one decision with `until >= now`. `false`: no decisions.
    ActiveDecision(bool),
}

impl AlertFilter {
    /// Validates a wire filter. Keys are visited in sorted order so that the
    /// reported error does not depend on map iteration order.
    pub fn parse_map(raw: &FilterMap) -> Result<Vec<AlertFilter>> {
        let sorted: BTreeMap<&str, &Vec<String>> =
            raw.iter().map(|(k, v)| (k.as_str(), v)).collect();
        let mut filters = Vec::with_capacity(sorted.len());

        for (key, values) in sorted {
            // simulated 比较特殊：只有显式的 "false" 才会生效
            if key == "simulated" {
                if values.first().map(String::as_str) == Some("false") {
                    filters.push(AlertFilter::NotSimulated);
                }
                continue;
            }
            let Some(value) = values.first() else {
                return Err(StoreError::InvalidFilter {
                    key: key.to_string(),
                    value: String::new(),
                });
            };
            match Self::parse_pair(key, value)? {
                // ip 和 range 共用一个区间，后出现的覆盖前面的
                Some(AlertFilter::IpRange(range)) => {
                    filters.retain(|f| !matches!(f, AlertFilter::IpRange(_)));
                    filters.push(AlertFilter::IpRange(range));
                }
                Some(filter) => filters.push(filter),
                None => {}
            }
        }
        Ok(filters)
    }

    fn parse_pair(key: &str, value: &str) -> Result<Option<AlertFilter>> {
        let filter = match key {
            "scope" => AlertFilter::Scope(value.to_string()),
            "value" => AlertFilter::Value(value.to_string()),
            "scenario" => AlertFilter::Scenario(value.to_string()),
            "ip" => AlertFilter::IpRange(IpRange::host(value).map_err(|source| {
                StoreError::InvalidIpOrRange {
                    field: "ip",
                    value: value.to_string(),
                    source,
                }
            })?),
            "range" => AlertFilter::IpRange(IpRange::parse(value).map_err(|source| {
                StoreError::InvalidIpOrRange {
                    field: "range",
                    value: value.to_string(),
                    source,
                }
            })?),
            "since" => AlertFilter::Since(duration_value("since", value)?),
            "until" => AlertFilter::Until(duration_value("until", value)?),
            "decision_type" => AlertFilter::DecisionType(value.to_string()),
            "include_capi" => match value {
                "false" => AlertFilter::ExcludeCapi,
                "true" => return Ok(None),
                _ => {
                    tracing::error!(value = %value, "Invalid bool for include_capi, ignoring");
                    return Ok(None);
                }
            },
            "has_active_decision" => {
                let active = parse_bool(value).ok_or_else(|| StoreError::ParseType {
                    field: "has_active_decision",
                    value: value.to_string(),
                    expected: "boolean",
                })?;
                AlertFilter::ActiveDecision(active)
            }
            _ => {
                return Err(StoreError::InvalidFilter {
                    key: key.to_string(),
                    value: value.to_string(),
                })
            }
        };
        Ok(Some(filter))
    }
}

/// Combines the filters into one `AND` condition over the alerts table.
pub fn compile(filters: &[AlertFilter], now: DateTime<Utc>) -> Result<Condition> {
    let mut cond = Condition::all();
    for filter in filters {
        let expr: SimpleExpr = match filter {
            AlertFilter::NotSimulated => AlertCol::Simulated.eq(false),
            AlertFilter::Scope(scope) => AlertCol::SourceScope.eq(scope.as_str()),
            AlertFilter::Value(value) => AlertCol::SourceValue.eq(value.as_str()),
            AlertFilter::Scenario(scenario) => AlertCol::Scenario.eq(scenario.as_str()),
            AlertFilter::IpRange(range) if range.is_unbounded() => continue,
            AlertFilter::IpRange(range) => AlertCol::Id.in_subquery(decisions_where(
                DecisionCol::StartIp
                    .gte(range.start)
                    .and(DecisionCol::EndIp.lte(range.end)),
            )),
            AlertFilter::Since(duration) => {
                AlertCol::CreatedAt.gte(ago("since", now, *duration)?.fixed_offset())
            }
            AlertFilter::Until(duration) => {
                AlertCol::CreatedAt.lte(ago("until", now, *duration)?.fixed_offset())
            }
            AlertFilter::CreatedBefore(instant) => AlertCol::CreatedAt.lte(instant.fixed_offset()),
            AlertFilter::DecisionType(kind) => AlertCol::Id.in_subquery(decisions_where(
                DecisionCol::DecisionType.eq(kind.as_str()),
            )),
            AlertFilter::ExcludeCapi => AlertCol::Id.in_subquery(decisions_where(
                DecisionCol::Origin.ne(CAPI_ORIGIN),
            )),
            AlertFilter::ActiveDecision(true) => AlertCol::Id.in_subquery(decisions_where(
                DecisionCol::Until.gte(now.fixed_offset()),
            )),
            AlertFilter::ActiveDecision(false) => {
                AlertCol::Id.not_in_subquery(alert_ids_with_decisions())
            }
        };
        cond = cond.add(expr);
    }
    Ok(cond)
}

fn alert_ids_with_decisions() -> SelectStatement {
    Query::select()
        .column(DecisionCol::AlertId)
        .from(DecisionEntity)
        .to_owned()
}

fn decisions_where(expr: SimpleExpr) -> SelectStatement {
    alert_ids_with_decisions().and_where(expr).to_owned()
}

fn duration_value(field: &'static str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|source| StoreError::ParseDurationFail {
        field,
        value: value.to_string(),
        source,
    })
}

fn ago(field: &'static str, now: DateTime<Utc>, duration: Duration) -> Result<DateTime<Utc>> {
    now.checked_sub_signed(duration)
        .ok_or_else(|| StoreError::ParseDurationFail {
            field,
            value: duration.to_string(),
            source: DurationError::Overflow(duration.to_string()),
        })
}

/// Boolean spellings accepted by `has_active_decision`.
fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn map(pairs: &[(&str, &str)]) -> FilterMap {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), vec![v.to_string()]))
            .collect()
    }

    #[test]
    fn simulated_only_acts_on_false() {
        assert_eq!(
            AlertFilter::parse_map(&map(&[("simulated", "false")])).unwrap(),
            vec![AlertFilter::NotSimulated]
        );
        assert!(AlertFilter::parse_map(&map(&[("simulated", "true")])).unwrap().is_empty());
        assert!(AlertFilter::parse_map(&map(&[("simulated", "nope")])).unwrap().is_empty());

        let mut empty = FilterMap::new();
        empty.insert("simulated".to_string(), vec![]);
        assert!(AlertFilter::parse_map(&empty).unwrap().is_empty());
    }

    #[test]
    fn ip_and_host_range_are_the_same_filter() {
        let ip = AlertFilter::parse_map(&map(&[("ip", "10.0.0.5")])).unwrap();
        let range = AlertFilter::parse_map(&map(&[("range", "10.0.0.5/32")])).unwrap();
        assert_eq!(ip, range);
    }

    #[test]
    fn range_replaces_ip_when_both_given() {
        let filters =
            AlertFilter::parse_map(&map(&[("ip", "10.0.0.5"), ("range", "192.168.0.0/16"), ("scope", "Ip")]))
                .unwrap();
        assert_eq!(
            filters,
            vec![
                AlertFilter::IpRange(IpRange::parse("192.168.0.0/16").unwrap()),
                AlertFilter::Scope("Ip".to_string()),
            ]
        );
    }

    #[test]
    fn ip_rejects_cidr_and_garbage() {
        assert!(matches!(
            AlertFilter::parse_map(&map(&[("ip", "10.0.0.0/24")])),
            Err(StoreError::InvalidIpOrRange { field: "ip", .. })
        ));
        assert!(matches!(
            AlertFilter::parse_map(&map(&[("range", "10.0.0.300/24")])),
            Err(StoreError::InvalidIpOrRange { field: "range", .. })
        ));
    }

    #[test]
    fn include_capi_values() {
        assert_eq!(
            AlertFilter::parse_map(&map(&[("include_capi", "false")])).unwrap(),
            vec![AlertFilter::ExcludeCapi]
        );
        assert!(AlertFilter::parse_map(&map(&[("include_capi", "true")])).unwrap().is_empty());
        assert!(AlertFilter::parse_map(&map(&[("include_capi", "maybe")])).unwrap().is_empty());
    }

    #[test]
    fn has_active_decision_requires_boolean() {
        assert_eq!(
            AlertFilter::parse_map(&map(&[("has_active_decision", "T")])).unwrap(),
            vec![AlertFilter::ActiveDecision(true)]
        );
        assert_eq!(
            AlertFilter::parse_map(&map(&[("has_active_decision", "0")])).unwrap(),
            vec![AlertFilter::ActiveDecision(false)]
        );
        assert!(matches!(
            AlertFilter::parse_map(&map(&[("has_active_decision", "yes")])),
            Err(StoreError::ParseType { field: "has_active_decision", .. })
        ));
    }

    #[test]
    fn durations_are_validated() {
        assert_eq!(
            AlertFilter::parse_map(&map(&[("since", "72h")])).unwrap(),
            vec![AlertFilter::Since(Duration::hours(72))]
        );
        assert!(matches!(
            AlertFilter::parse_map(&map(&[("until", "2024-01-01T00:00:00Z")])),
            Err(StoreError::ParseDurationFail { field: "until", .. })
        ));
    }

    #[test]
    fn unknown_and_empty_keys_are_rejected() {
        assert!(matches!(
            AlertFilter::parse_map(&map(&[("scope", "Ip"), ("severity", "high")])),
            Err(StoreError::InvalidFilter { ref key, .. }) if key == "severity"
        ));

        let mut empty = FilterMap::new();
        empty.insert("scenario".to_string(), vec![]);
        assert!(matches!(
            AlertFilter::parse_map(&empty),
            Err(StoreError::InvalidFilter { ref key, .. }) if key == "scenario"
        ));
    }

    #[test]
    fn compile_reports_overflowing_window() {
        let filters = vec![AlertFilter::Since(Duration::MAX)];
        assert!(matches!(
            compile(&filters, Utc::now()),
            Err(StoreError::ParseDurationFail { field: "since", .. })
        ));
    }
}
