//! # carshare-core
//!
//! Core rules engine for the carshare car-sharing client.
//!
//! This crate provides:
//! - The booking lifecycle state machine (payment, trip start/end, extension, cancellation)
//! - A safety monitor that turns vehicle telemetry into prioritized alerts
//! - A renter trust score engine
//! - An owner earnings aggregator
//!
//! It consumes and produces plain data records. Storage and time are
//! injected capabilities; transport is left to the embedding service.
//!
//! ## Architecture
//!
//! The crate is organized into the following modules:
//!
//! - [`booking`] - Booking records and the transition table
//! - [`lifecycle`] - Serialized lifecycle operations over a repository
//! - [`storage`] - Repository capability and in-memory implementation
//! - [`clock`] - Time source capability
//! - [`safety`] - Telemetry rule pipeline and alert prioritization
//! - [`geo`] - Haversine distance
//! - [`trust`] - Renter trust scoring
//! - [`earnings`] - Owner earnings buckets and monthly series
//! - [`config`] - Engine configuration loading, saving, and validation
//! - [`logging`] - Subscriber setup for embedding services
//! - [`error`] - Unified error types for the crate

#![forbid(unsafe_code)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![warn(missing_docs)]

pub mod booking;
pub mod clock;
pub mod config;
pub mod earnings;
pub mod error;
pub mod geo;
pub mod lifecycle;
pub mod logging;
pub mod safety;
pub mod storage;
pub mod trust;

// Re-export primary types for convenience
pub use booking::{Booking, BookingAction, BookingRequest, BookingStatus};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ConfigError, ConfigResult, EarningsConfig, EngineConfig, SafetyConfig};
pub use earnings::{
    aggregate_earnings, aggregate_earnings_in, EarningsAggregator, EarningsSummary,
    MonthlyEarnings, MONTHLY_SERIES_LEN,
};
pub use error::{CarshareError, Result};
pub use geo::{haversine_km, GeoPoint, EARTH_RADIUS_KM};
pub use lifecycle::BookingLifecycle;
pub use safety::{
    Alert, AlertPriority, AlertType, GeoFence, RiskLevel, SafetyInput, SafetyMonitor,
    SafetyReport, TelemetrySample,
};
pub use storage::{BookingRepository, InMemoryBookingRepository};
pub use trust::{compute_trust_score, RenterHistoryProfile, TrustBreakdown, TrustLevel, TrustScore};
