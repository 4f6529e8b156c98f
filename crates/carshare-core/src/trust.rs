//! Renter trust scoring.
//!
//! A trust score is the sum of six capped categories:
//!
//! | Category         | Weight | Input                              |
//! |------------------|--------|------------------------------------|
//! | KYC              | 20     | identity verified                  |
//! | Trip history     | 20     | completed trips (absolute)         |
//! | Punctuality      | 20     | late returns per trip              |
//! | Driving behavior | 20     | rash-driving events per trip       |
//! | Damage history   | 10     | damage reports per trip            |
//! | Ratings          | 10     | average rating out of 5            |
//!
//! Renters with no trips get the maximum of every ratio category.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::debug;

/// What the platform knows about a renter's past.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenterHistoryProfile {
    /// Renter id.
    pub user_id: String,
    /// Identity verification passed.
    pub kyc_verified: bool,
    /// Trips that reached `COMPLETED`.
    pub completed_trips: u32,
    /// Every trip taken, the denominator of all ratios.
    pub total_trips: u32,
    /// Trips returned after their end date.
    pub late_returns: u32,
    /// Rash-driving events reported by telemetry.
    pub rash_driving_events: u32,
    /// Damage reports filed by owners.
    pub damage_reports: u32,
    /// Average owner rating, 0 to 5. Zero means "not rated yet".
    pub average_rating: f64,
}

/// Points per category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustBreakdown {
    /// 0 or 20.
    pub kyc: u8,
    /// 0 to 20.
    pub trip_history: u8,
    /// 0 to 20.
    pub punctuality: u8,
    /// 0 to 20.
    pub driving_behavior: u8,
    /// 0 to 10.
    pub damage_history: u8,
    /// 0 to 10.
    pub ratings: u8,
}

impl TrustBreakdown {
    /// Sum of all categories.
    #[must_use]
    pub const fn total(&self) -> u8 {
        self.kyc
            + self.trip_history
            + self.punctuality
            + self.driving_behavior
            + self.damage_history
            + self.ratings
    }
}

/// Coarse trust band.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrustLevel {
    /// Below 30.
    Poor,
    /// 30 to 49.
    Fair,
    /// 50 to 79.
    Good,
    /// 80 and above.
    Excellent,
}

impl TrustLevel {
    /// Band for a 0–100 score.
    #[must_use]
    pub const fn from_score(score: u8) -> Self {
        match score {
            80..=u8::MAX => Self::Excellent,
            50..=79 => Self::Good,
            30..=49 => Self::Fair,
            0..=29 => Self::Poor,
        }
    }
}

impl fmt::Display for TrustLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        })
    }
}

/// A renter's composite score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrustScore {
    /// 0 to 100; always equal to `breakdown.total()`.
    pub score: u8,
    /// Per-category points.
    pub breakdown: TrustBreakdown,
    /// Band derived from `score`.
    pub level: TrustLevel,
}

impl TrustScore {
    /// Returns `true` if the renter is at least at `min_level`.
    #[must_use]
    pub fn is_eligible_for(&self, min_level: TrustLevel) -> bool {
        self.level >= min_level
    }
}

/// Score a renter profile.
#[must_use]
pub fn compute_trust_score(profile: &RenterHistoryProfile) -> TrustScore {
    let breakdown = TrustBreakdown {
        kyc: if profile.kyc_verified { 20 } else { 0 },
        trip_history: trip_history_points(profile.completed_trips),
        punctuality: punctuality_points(ratio(profile.late_returns, profile.total_trips)),
        driving_behavior: driving_points(ratio(profile.rash_driving_events, profile.total_trips)),
        damage_history: damage_points(ratio(profile.damage_reports, profile.total_trips)),
        ratings: rating_points(profile.average_rating),
    };
    let score = breakdown.total();
    debug!(user_id = %profile.user_id, score, "Computed trust score");
    TrustScore {
        score,
        breakdown,
        level: TrustLevel::from_score(score),
    }
}

/// `numerator / total`, or `None` for a renter with no trips.
fn ratio(numerator: u32, total: u32) -> Option<f64> {
    (total > 0).then(|| f64::from(numerator) / f64::from(total))
}

const fn trip_history_points(completed: u32) -> u8 {
    match completed {
        0 => 0,
        1..=5 => 10,
        6..=15 => 15,
        _ => 20,
    }
}

fn punctuality_points(late_ratio: Option<f64>) -> u8 {
    match late_ratio {
        None => 20,
        Some(r) if r <= 0.0 => 20,
        Some(r) if r < 0.10 => 15,
        Some(r) if r < 0.25 => 10,
        Some(r) if r < 0.50 => 5,
        Some(_) => 0,
    }
}

fn driving_points(events_per_trip: Option<f64>) -> u8 {
    match events_per_trip {
        None => 20,
        Some(r) if r <= 0.0 => 20,
        Some(r) if r < 0.5 => 15,
        Some(r) if r < 1.0 => 10,
        Some(r) if r < 2.0 => 5,
        Some(_) => 0,
    }
}

fn damage_points(damage_ratio: Option<f64>) -> u8 {
    match damage_ratio {
        None => 10,
        Some(r) if r <= 0.0 => 10,
        Some(r) if r < 0.10 => 7,
        Some(r) if r < 0.25 => 5,
        Some(r) if r < 0.50 => 2,
        Some(_) => 0,
    }
}

/// Zero (and anything unusable) is a new renter and gets the full 10.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rating_points(average_rating: f64) -> u8 {
    if !average_rating.is_finite() || average_rating <= 0.0 {
        return 10;
    }
    let clamped = average_rating.min(5.0);
    (clamped / 5.0 * 10.0).round() as u8
}
