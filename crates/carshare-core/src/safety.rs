//! Real-time safety evaluation of vehicle telemetry.
//!
//! A [`SafetyMonitor`] runs a fixed, ordered list of independent rules
//! against one [`TelemetrySample`]:
//!
//! 1. Theft risk: no fresh sample for longer than the idle window
//! 2. Speeding: speed above a multiple of the posted limit
//! 3. Geofence breach: vehicle outside its active fence
//! 4. Late return: active trip past its end date
//!
//! Each rule yields at most one alert. The resulting list is stably sorted
//! by priority so that ties keep rule order, and the highest priority
//! becomes the report's [`RiskLevel`]. A rule that cannot evaluate its
//! input (missing coordinates, NaN speed) is skipped with a warning; the
//! other rules still run.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::booking::{Booking, BookingStatus};
use crate::config::{EngineConfig, SafetyConfig};
use crate::error::{CarshareError, Result};
use crate::geo::{haversine_km, GeoPoint};

/// A timestamped snapshot of a vehicle's speed and position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetrySample {
    /// Vehicle that reported the sample.
    pub vehicle_id: String,

    /// Trip the vehicle was on, if the tracker knows it.
    pub trip_id: Option<Uuid>,

    /// Speed in km/h.
    pub current_speed: f64,

    /// Reported position; absent when the tracker had no fix.
    pub current_location: Option<GeoPoint>,

    /// When the sample was taken.
    pub sample_time: DateTime<Utc>,
}

/// A circular boundary a vehicle is expected to stay within.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoFence {
    /// Fence id.
    pub id: Uuid,
    /// Vehicle the fence applies to.
    pub vehicle_id: String,
    /// Centre of the fence.
    pub center: GeoPoint,
    /// Radius in kilometres, greater than zero.
    pub radius_km: f64,
    /// Inactive fences are ignored.
    pub active: bool,
}

/// Kind of safety alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertType {
    /// Speed above the allowed multiple of the limit.
    Speeding,
    /// Vehicle outside its geofence.
    GeoFence,
    /// Vehicle silent for too long.
    Theft,
    /// Active trip past its end date.
    LateReturn,
}

impl fmt::Display for AlertType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Speeding => "SPEEDING",
            Self::GeoFence => "GEO_FENCE",
            Self::Theft => "THEFT",
            Self::LateReturn => "LATE_RETURN",
        })
    }
}

/// Alert priority. Declaration order is rank order: `Critical` sorts first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertPriority {
    /// Needs immediate action.
    Critical,
    /// Needs action soon.
    High,
    /// Worth a look.
    Medium,
    /// Informational.
    Low,
}

impl AlertPriority {
    /// Numeric rank, 0 being the most urgent.
    #[must_use]
    pub const fn rank(self) -> u8 {
        match self {
            Self::Critical => 0,
            Self::High => 1,
            Self::Medium => 2,
            Self::Low => 3,
        }
    }
}

impl fmt::Display for AlertPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Critical => "CRITICAL",
            Self::High => "HIGH",
            Self::Medium => "MEDIUM",
            Self::Low => "LOW",
        })
    }
}

/// Aggregate risk of one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// No alert was raised.
    None,
    /// Highest alert was `LOW`.
    Low,
    /// Highest alert was `MEDIUM`.
    Medium,
    /// Highest alert was `HIGH`.
    High,
    /// Highest alert was `CRITICAL`.
    Critical,
}

impl From<Option<AlertPriority>> for RiskLevel {
    fn from(priority: Option<AlertPriority>) -> Self {
        match priority {
            None => Self::None,
            Some(AlertPriority::Low) => Self::Low,
            Some(AlertPriority::Medium) => Self::Medium,
            Some(AlertPriority::High) => Self::High,
            Some(AlertPriority::Critical) => Self::Critical,
        }
    }
}

/// A safety alert produced by one evaluation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    /// Unique alert id.
    pub id: Uuid,
    /// What was detected.
    #[serde(rename = "type")]
    pub alert_type: AlertType,
    /// How urgent it is.
    pub priority: AlertPriority,
    /// Vehicle concerned.
    pub vehicle_id: String,
    /// Trip concerned, if known.
    pub trip_id: Option<Uuid>,
    /// Evaluation time.
    pub timestamp: DateTime<Utc>,
    /// Human-readable description.
    pub message: String,
    /// Last known position.
    pub location: Option<GeoPoint>,
    /// Set by collaborators once a user has seen the alert.
    #[serde(default)]
    pub is_read: bool,
}

impl Alert {
    /// Mark the alert as seen.
    pub fn mark_read(&mut self) {
        self.is_read = true;
    }
}

/// Everything one evaluation looks at.
#[derive(Debug, Clone, Copy)]
pub struct SafetyInput<'a> {
    /// The sample under evaluation.
    pub sample: &'a TelemetrySample,
    /// The vehicle's current trip, if any.
    pub trip: Option<&'a Booking>,
    /// The vehicle's geofence, if configured.
    pub fence: Option<&'a GeoFence>,
    /// Posted speed limit in km/h.
    pub speed_limit: f64,
    /// Evaluation time.
    pub now: DateTime<Utc>,
}

/// Alerts of one evaluation, most urgent first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    /// Alerts sorted by priority; ties keep rule order.
    pub alerts: Vec<Alert>,
    /// Priority of the first alert, or `None`.
    pub risk_level: RiskLevel,
}

impl SafetyReport {
    fn from_alerts(alerts: Vec<Alert>) -> Self {
        let alerts = prioritize(alerts);
        let risk_level = RiskLevel::from(alerts.first().map(|a| a.priority));
        Self { alerts, risk_level }
    }

    /// Returns `true` if any alert is `CRITICAL`.
    #[must_use]
    pub fn has_critical(&self) -> bool {
        self.risk_level == RiskLevel::Critical
    }

    /// Alerts of one type, in report order.
    pub fn alerts_of_type(&self, alert_type: AlertType) -> impl Iterator<Item = &Alert> {
        self.alerts.iter().filter(move |a| a.alert_type == alert_type)
    }
}

/// What a rule found, before it is stamped into an [`Alert`].
#[derive(Debug, Clone, PartialEq)]
struct Finding {
    alert_type: AlertType,
    priority: AlertPriority,
    message: String,
}

type Rule = fn(&SafetyInput<'_>, &SafetyConfig) -> Result<Option<Finding>>;

/// Rules in evaluation order.
const RULES: [(&str, Rule); 4] = [
    ("theft", theft_rule),
    ("speeding", speeding_rule),
    ("geofence", geofence_rule),
    ("late_return", late_return_rule),
];

/// Evaluates telemetry against the safety rules.
#[derive(Debug, Clone, Default)]
pub struct SafetyMonitor {
    config: SafetyConfig,
}

impl SafetyMonitor {
    /// Create a monitor with the given thresholds.
    #[must_use]
    pub const fn new(config: SafetyConfig) -> Self {
        Self { config }
    }

    /// Create a monitor from the `[safety]` table of a configuration file.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the file is missing, unparsable, or
    /// fails validation.
    pub fn from_config_file(path: &Path) -> Result<Self> {
        Ok(Self::new(EngineConfig::load_required(path)?.safety))
    }

    /// Run every rule and collect a prioritized report.
    #[must_use]
    pub fn evaluate(&self, input: &SafetyInput<'_>) -> SafetyReport {
        let sample = input.sample;
        let trip_id = sample.trip_id.or_else(|| input.trip.map(|t| t.id));

        let alerts = RULES
            .iter()
            .filter_map(|(name, rule)| match rule(input, &self.config) {
                Ok(finding) => finding,
                Err(err) => {
                    warn!(rule = *name, vehicle_id = %sample.vehicle_id, error = %err, "Skipping safety rule");
                    None
                }
            })
            .map(|finding| {
                debug!(
                    vehicle_id = %sample.vehicle_id,
                    alert_type = %finding.alert_type,
                    priority = %finding.priority,
                    "Safety rule fired"
                );
                Alert {
                    id: Uuid::new_v4(),
                    alert_type: finding.alert_type,
                    priority: finding.priority,
                    vehicle_id: sample.vehicle_id.clone(),
                    trip_id,
                    timestamp: input.now,
                    message: finding.message,
                    location: sample.current_location,
                    is_read: false,
                }
            })
            .collect();

        SafetyReport::from_alerts(alerts)
    }
}

/// Stable sort by priority rank.
fn prioritize(mut alerts: Vec<Alert>) -> Vec<Alert> {
    alerts.sort_by_key(|a| a.priority.rank());
    alerts
}

fn theft_rule(input: &SafetyInput<'_>, config: &SafetyConfig) -> Result<Option<Finding>> {
    let idle = input.now - input.sample.sample_time;
    if idle <= config.theft_idle_threshold() {
        return Ok(None);
    }
    Ok(Some(Finding {
        alert_type: AlertType::Theft,
        priority: AlertPriority::Critical,
        message: format!(
            "Vehicle {} has not reported for {} minutes",
            input.sample.vehicle_id,
            idle.num_minutes()
        ),
    }))
}

/// Both thresholds are strict. Exactly 1.5x the limit (90 in a 60 zone) is
/// `Medium`, not `High`; an inclusive `>=` boundary would flip it.
fn speeding_rule(input: &SafetyInput<'_>, config: &SafetyConfig) -> Result<Option<Finding>> {
    let speed = input.sample.current_speed;
    let limit = input.speed_limit;
    if !speed.is_finite() || speed < 0.0 {
        return Err(CarshareError::Computation(format!("invalid speed {speed}")));
    }
    if !limit.is_finite() || limit <= 0.0 {
        return Err(CarshareError::Computation(format!("invalid speed limit {limit}")));
    }

    let priority = if speed > config.speeding_high_factor * limit {
        AlertPriority::High
    } else if speed > config.speeding_medium_factor * limit {
        AlertPriority::Medium
    } else {
        return Ok(None);
    };
    Ok(Some(Finding {
        alert_type: AlertType::Speeding,
        priority,
        message: format!(
            "Vehicle {} travelling at {speed:.0} km/h in a {limit:.0} km/h zone",
            input.sample.vehicle_id
        ),
    }))
}

fn geofence_rule(input: &SafetyInput<'_>, _config: &SafetyConfig) -> Result<Option<Finding>> {
    let Some(fence) = input.fence.filter(|f| f.active) else {
        return Ok(None);
    };
    if fence.vehicle_id != input.sample.vehicle_id {
        debug!(fence_id = %fence.id, "Fence belongs to another vehicle");
        return Ok(None);
    }
    if !fence.radius_km.is_finite() || fence.radius_km <= 0.0 {
        return Err(CarshareError::Computation(format!(
            "fence {} has invalid radius {}",
            fence.id, fence.radius_km
        )));
    }
    let location = input
        .sample
        .current_location
        .ok_or_else(|| CarshareError::Computation("sample has no location".into()))?;
    location.validate()?;
    fence.center.validate()?;

    let distance = haversine_km(location, fence.center);
    if distance <= fence.radius_km {
        return Ok(None);
    }
    Ok(Some(Finding {
        alert_type: AlertType::GeoFence,
        priority: AlertPriority::High,
        message: format!(
            "Vehicle {} is {distance:.2} km from its fence centre (limit {:.2} km)",
            input.sample.vehicle_id, fence.radius_km
        ),
    }))
}

fn late_return_rule(input: &SafetyInput<'_>, config: &SafetyConfig) -> Result<Option<Finding>> {
    let Some(trip) = input.trip.filter(|t| t.status == BookingStatus::Active) else {
        return Ok(None);
    };
    if input.now <= trip.end_date {
        return Ok(None);
    }

    let overdue = input.now - trip.end_date;
    let priority = if overdue < config.late_return_escalation() {
        AlertPriority::Medium
    } else {
        AlertPriority::High
    };
    Ok(Some(Finding {
        alert_type: AlertType::LateReturn,
        priority,
        message: format!(
            "Trip {} is {} minutes past its return time",
            trip.id,
            overdue.num_minutes()
        ),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::tests::{at, sample_request};
    use chrono::Duration;

    const FENCE_CENTER: GeoPoint = GeoPoint::new(12.9716, 77.5946);
    const INSIDE: GeoPoint = GeoPoint::new(12.9720, 77.5950);
    const KORAMANGALA: GeoPoint = GeoPoint::new(12.9352, 77.6245);

    fn now() -> DateTime<Utc> {
        at(12, 12)
    }

    fn sample(speed: f64) -> TelemetrySample {
        TelemetrySample {
            vehicle_id: "KA-01-AB-1234".into(),
            trip_id: None,
            current_speed: speed,
            current_location: Some(INSIDE),
            sample_time: now() - Duration::minutes(1),
        }
    }

    fn fence(radius_km: f64, active: bool) -> GeoFence {
        GeoFence {
            id: Uuid::new_v4(),
            vehicle_id: "KA-01-AB-1234".into(),
            center: FENCE_CENTER,
            radius_km,
            active,
        }
    }

    fn active_trip(end: DateTime<Utc>) -> Booking {
        let mut trip = Booking::from_request(sample_request(), Uuid::new_v4(), at(1, 0)).unwrap();
        trip.status = BookingStatus::Active;
        trip.end_date = end;
        trip
    }

    fn input<'a>(
        sample: &'a TelemetrySample,
        trip: Option<&'a Booking>,
        fence: Option<&'a GeoFence>,
    ) -> SafetyInput<'a> {
        SafetyInput {
            sample,
            trip,
            fence,
            speed_limit: 60.0,
            now: now(),
        }
    }

    fn evaluate(input: &SafetyInput<'_>) -> SafetyReport {
        SafetyMonitor::default().evaluate(input)
    }

    fn priorities(report: &SafetyReport) -> Vec<(AlertType, AlertPriority)> {
        report
            .alerts
            .iter()
            .map(|a| (a.alert_type, a.priority))
            .collect()
    }

    #[test]
    fn test_quiet_sample_has_no_risk() {
        let s = sample(50.0);
        let report = evaluate(&input(&s, None, None));
        assert!(report.alerts.is_empty());
        assert_eq!(report.risk_level, RiskLevel::None);
    }

    #[test]
    fn test_speeding_medium_below_one_and_a_half_times() {
        let s = sample(85.0);
        let report = evaluate(&input(&s, None, None));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::Speeding, AlertPriority::Medium)]
        );
        assert_eq!(report.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_speeding_high_above_one_and_a_half_times() {
        let s = sample(95.0);
        let report = evaluate(&input(&s, None, None));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::Speeding, AlertPriority::High)]
        );
    }

    #[test]
    fn test_speeding_at_exactly_one_and_a_half_times_is_medium() {
        let s = sample(70.0);
        assert!(evaluate(&input(&s, None, None)).alerts.is_empty());

        let s = sample(90.0);
        assert_eq!(
            evaluate(&input(&s, None, None)).alerts[0].priority,
            AlertPriority::Medium
        );
    }

    #[test]
    fn test_theft_after_three_idle_hours() {
        let mut s = sample(0.0);
        s.sample_time = now() - Duration::hours(3) - Duration::minutes(1);
        let report = evaluate(&input(&s, None, None));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::Theft, AlertPriority::Critical)]
        );
        assert!(report.has_critical());

        s.sample_time = now() - Duration::hours(3);
        assert!(evaluate(&input(&s, None, None)).alerts.is_empty());
    }

    #[test]
    fn test_geofence_breach_only_when_active() {
        let mut s = sample(30.0);
        s.current_location = Some(KORAMANGALA);

        let tight = fence(2.0, true);
        let report = evaluate(&input(&s, None, Some(&tight)));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::GeoFence, AlertPriority::High)]
        );

        let disabled = fence(2.0, false);
        assert!(evaluate(&input(&s, None, Some(&disabled))).alerts.is_empty());

        let wide = fence(5.5, true);
        assert!(evaluate(&input(&s, None, Some(&wide))).alerts.is_empty());
    }

    #[test]
    fn test_fence_for_other_vehicle_is_ignored() {
        let mut s = sample(30.0);
        s.current_location = Some(KORAMANGALA);
        let mut other = fence(1.0, true);
        other.vehicle_id = "MH-12-ZZ-0001".into();
        assert!(evaluate(&input(&s, None, Some(&other))).alerts.is_empty());
    }

    #[test]
    fn test_missing_location_skips_only_geofence_rule() {
        let mut s = sample(95.0);
        s.current_location = None;
        let f = fence(1.0, true);
        let report = evaluate(&input(&s, None, Some(&f)));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::Speeding, AlertPriority::High)]
        );
    }

    #[test]
    fn test_nan_speed_skips_only_speeding_rule() {
        let mut s = sample(f64::NAN);
        s.sample_time = now() - Duration::hours(5);
        let report = evaluate(&input(&s, None, None));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::Theft, AlertPriority::Critical)]
        );
    }

    #[test]
    fn test_late_return_escalates_after_a_day() {
        let s = sample(0.0);

        let trip = active_trip(now() - Duration::hours(2));
        let report = evaluate(&input(&s, Some(&trip), None));
        assert_eq!(
            priorities(&report),
            vec![(AlertType::LateReturn, AlertPriority::Medium)]
        );
        assert_eq!(report.alerts[0].trip_id, Some(trip.id));

        let trip = active_trip(now() - Duration::hours(24));
        assert_eq!(
            evaluate(&input(&s, Some(&trip), None)).alerts[0].priority,
            AlertPriority::High
        );
    }

    #[test]
    fn test_late_return_ignores_inactive_or_on_time_trips() {
        let s = sample(0.0);
        let mut done = active_trip(now() - Duration::hours(30));
        done.status = BookingStatus::Completed;
        assert!(evaluate(&input(&s, Some(&done), None)).alerts.is_empty());

        let on_time = active_trip(now() + Duration::hours(1));
        assert!(evaluate(&input(&s, Some(&on_time), None)).alerts.is_empty());
    }

    #[test]
    fn test_theft_sorts_before_speeding() {
        let mut s = sample(95.0);
        s.sample_time = now() - Duration::hours(4);
        let report = evaluate(&input(&s, None, None));
        assert_eq!(
            priorities(&report),
            vec![
                (AlertType::Theft, AlertPriority::Critical),
                (AlertType::Speeding, AlertPriority::High),
            ]
        );
        assert_eq!(report.risk_level, RiskLevel::Critical);
    }

    #[test]
    fn test_prioritize_ignores_input_order() {
        let mut s = sample(95.0);
        s.sample_time = now() - Duration::hours(4);
        let mut alerts = evaluate(&input(&s, None, None)).alerts;
        alerts.reverse();
        let sorted = prioritize(alerts);
        assert_eq!(sorted[0].alert_type, AlertType::Theft);
        assert_eq!(sorted[1].alert_type, AlertType::Speeding);
    }

    #[test]
    fn test_ties_keep_rule_order() {
        let mut s = sample(95.0);
        s.current_location = Some(KORAMANGALA);
        let f = fence(1.0, true);
        let trip = active_trip(now() - Duration::hours(48));
        let report = evaluate(&input(&s, Some(&trip), Some(&f)));
        assert_eq!(
            priorities(&report),
            vec![
                (AlertType::Speeding, AlertPriority::High),
                (AlertType::GeoFence, AlertPriority::High),
                (AlertType::LateReturn, AlertPriority::High),
            ]
        );
        assert_eq!(report.alerts_of_type(AlertType::GeoFence).count(), 1);
    }

    #[test]
    fn test_alert_fields_and_mark_read() {
        let mut s = sample(95.0);
        let trip_id = Uuid::new_v4();
        s.trip_id = Some(trip_id);
        let mut alert = evaluate(&input(&s, None, None)).alerts.remove(0);
        assert_eq!(alert.vehicle_id, "KA-01-AB-1234");
        assert_eq!(alert.trip_id, Some(trip_id));
        assert_eq!(alert.timestamp, now());
        assert_eq!(alert.location, Some(INSIDE));
        assert!(alert.message.contains("95 km/h"));
        assert!(!alert.is_read);

        alert.mark_read();
        assert!(alert.is_read);
    }

    #[test]
    fn test_custom_thresholds() {
        let config = SafetyConfig {
            speeding_medium_factor: 1.1,
            ..SafetyConfig::default()
        };
        let s = sample(70.0);
        let report = SafetyMonitor::new(config).evaluate(&input(&s, None, None));
        assert_eq!(report.risk_level, RiskLevel::Medium);
    }

    #[test]
    fn test_priority_rank_matches_ordering() {
        let mut all = [
            AlertPriority::Low,
            AlertPriority::Critical,
            AlertPriority::Medium,
            AlertPriority::High,
        ];
        all.sort();
        let ranks: Vec<u8> = all.iter().map(|p| p.rank()).collect();
        assert_eq!(ranks, vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_alert_serializes_type_field() {
        let s = sample(95.0);
        let alert = &evaluate(&input(&s, None, None)).alerts[0];
        let json = serde_json::to_value(alert).unwrap();
        assert_eq!(json["type"], "SPEEDING");
        assert_eq!(json["priority"], "HIGH");
    }

    #[test]
    fn test_monitor_from_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("engine.toml");
        std::fs::write(
            &path,
            "[safety]\nspeeding_medium_factor = 1.1\nspeeding_high_factor = 1.3\n",
        )
        .unwrap();
        let monitor = SafetyMonitor::from_config_file(&path).unwrap();

        let s = sample(70.0);
        let report = monitor.evaluate(&input(&s, None, None));
        assert_eq!(priorities(&report), vec![(AlertType::Speeding, AlertPriority::Medium)]);

        let s = sample(80.0);
        let report = monitor.evaluate(&input(&s, None, None));
        assert_eq!(priorities(&report), vec![(AlertType::Speeding, AlertPriority::High)]);
    }

    #[test]
    fn test_monitor_from_bad_config_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = SafetyMonitor::from_config_file(&dir.path().join("absent.toml")).unwrap_err();
        assert_eq!(err.error_code(), "CONFIG_NOT_FOUND");

        let path = dir.path().join("engine.toml");
        std::fs::write(&path, "[safety]\nspeeding_high_factor = 1.1\n").unwrap();
        let err = SafetyMonitor::from_config_file(&path).unwrap_err();
        assert!(err.is_config_error());
        assert_eq!(err.error_code(), "CONFIG_VALIDATION_ERROR");
    }
}
