//! Booking records and the lifecycle transition table.
//!
//! A booking moves along `PENDING_PAYMENT → CONFIRMED → ACTIVE → COMPLETED`.
//! Before the trip starts it may instead be cancelled. `COMPLETED` and
//! `CANCELLED` are terminal.
//!
//! This module is pure: it validates requests and applies actions to a
//! [`Booking`] value. Persistence and per-booking serialization live in
//! [`lifecycle`](crate::lifecycle).

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::warn;
use uuid::Uuid;

use crate::error::{CarshareError, Result};

/// Authoritative status of a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingStatus {
    /// Created, waiting for the renter's payment.
    PendingPayment,
    /// Paid; the vehicle is reserved.
    Confirmed,
    /// The renter has the vehicle.
    Active,
    /// The trip ended normally.
    Completed,
    /// Cancelled before the trip started.
    Cancelled,
}

/// A lifecycle operation requested on a booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingAction {
    /// Record a successful payment.
    ConfirmPayment,
    /// Hand the vehicle to the renter.
    StartTrip,
    /// Take the vehicle back.
    EndTrip,
    /// Move the end date of a running trip.
    ExtendTrip,
    /// Cancel before the trip starts.
    Cancel,
}

impl BookingAction {
    /// Every action, in lifecycle order.
    pub const ALL: [Self; 5] = [
        Self::ConfirmPayment,
        Self::StartTrip,
        Self::EndTrip,
        Self::ExtendTrip,
        Self::Cancel,
    ];
}

impl fmt::Display for BookingAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ConfirmPayment => "confirm payment",
            Self::StartTrip => "start trip",
            Self::EndTrip => "end trip",
            Self::ExtendTrip => "extend trip",
            Self::Cancel => "cancel",
        })
    }
}

impl BookingStatus {
    /// Status reached by applying `action`, or `None` if the action is not
    /// allowed from this status.
    #[must_use]
    pub const fn next(self, action: BookingAction) -> Option<Self> {
        use BookingAction as A;

        match self {
            Self::PendingPayment => match action {
                A::ConfirmPayment => Some(Self::Confirmed),
                A::Cancel => Some(Self::Cancelled),
                A::StartTrip | A::EndTrip | A::ExtendTrip => None,
            },
            Self::Confirmed => match action {
                A::StartTrip => Some(Self::Active),
                A::Cancel => Some(Self::Cancelled),
                A::ConfirmPayment | A::EndTrip | A::ExtendTrip => None,
            },
            Self::Active => match action {
                A::EndTrip => Some(Self::Completed),
                A::ExtendTrip => Some(Self::Active),
                A::ConfirmPayment | A::StartTrip | A::Cancel => None,
            },
            Self::Completed | Self::Cancelled => None,
        }
    }

    /// Returns `true` if no action can leave this status.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }

    /// Actions currently allowed, in lifecycle order.
    #[must_use]
    pub fn allowed_actions(self) -> Vec<BookingAction> {
        BookingAction::ALL
            .into_iter()
            .filter(|action| self.next(*action).is_some())
            .collect()
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::PendingPayment => "PENDING_PAYMENT",
            Self::Confirmed => "CONFIRMED",
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Cancelled => "CANCELLED",
        })
    }
}

/// Booking creation payload as received from the client.
///
/// Required fields are optional here so that a missing value can be
/// reported as a validation error instead of a deserialization failure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BookingRequest {
    /// Renter placing the booking.
    pub renter_id: String,

    /// Owner of the vehicle.
    pub owner_id: String,

    /// Vehicle being booked.
    pub vehicle_id: Option<String>,

    /// Planned start of the rental.
    pub start_date: Option<DateTime<Utc>>,

    /// Planned end of the rental.
    pub end_date: Option<DateTime<Utc>>,

    /// Where the renter collects the vehicle.
    #[serde(default)]
    pub pickup_location: String,

    /// Where the renter returns the vehicle.
    #[serde(default)]
    pub dropoff_location: String,

    /// Price quoted for the whole rental.
    pub total_amount: Option<Decimal>,

    /// Payment method chosen by the renter (e.g. `card`, `upi`).
    pub payment_method: Option<String>,
}

/// A booking and, once started, its trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    /// Unique booking id.
    pub id: Uuid,
    /// Renter who placed the booking.
    pub renter_id: String,
    /// Vehicle being rented.
    pub vehicle_id: String,
    /// Owner receiving the earnings.
    pub owner_id: String,
    /// Planned start of the rental.
    pub start_date: DateTime<Utc>,
    /// Planned (possibly extended) end of the rental.
    pub end_date: DateTime<Utc>,
    /// Current lifecycle status.
    pub status: BookingStatus,
    /// Rental price, never negative.
    pub total_amount: Decimal,
    /// Pickup address.
    pub pickup_location: String,
    /// Drop-off address.
    pub dropoff_location: String,
    /// Payment method chosen at creation.
    pub payment_method: Option<String>,
    /// When the booking was created.
    pub created_at: DateTime<Utc>,
    /// When the booking last changed.
    pub updated_at: DateTime<Utc>,
    /// When the trip actually started.
    pub started_at: Option<DateTime<Utc>>,
    /// When the trip actually ended.
    pub ended_at: Option<DateTime<Utc>>,
    /// When the booking was cancelled.
    pub cancelled_at: Option<DateTime<Utc>>,
}

impl Booking {
    /// Validate a request and build a new booking in `PENDING_PAYMENT`.
    ///
    /// # Errors
    ///
    /// Returns [`CarshareError::Validation`] if the vehicle, dates or amount
    /// are missing, ids are blank, the amount is negative, or the end date
    /// is not after the start date.
    pub fn from_request(request: BookingRequest, id: Uuid, now: DateTime<Utc>) -> Result<Self> {
        let vehicle_id = request
            .vehicle_id
            .filter(|v| !v.trim().is_empty())
            .ok_or_else(|| missing("vehicle_id"))?;
        let start_date = request.start_date.ok_or_else(|| missing("start_date"))?;
        let end_date = request.end_date.ok_or_else(|| missing("end_date"))?;
        let total_amount = request.total_amount.ok_or_else(|| missing("total_amount"))?;

        if request.renter_id.trim().is_empty() {
            return Err(missing("renter_id"));
        }
        if request.owner_id.trim().is_empty() {
            return Err(missing("owner_id"));
        }
        if total_amount < Decimal::ZERO {
            return Err(CarshareError::Validation(format!(
                "total_amount must not be negative (got {total_amount})"
            )));
        }
        if end_date <= start_date {
            return Err(CarshareError::Validation(format!(
                "end_date {end_date} must be after start_date {start_date}"
            )));
        }

        Ok(Self {
            id,
            renter_id: request.renter_id,
            vehicle_id,
            owner_id: request.owner_id,
            start_date,
            end_date,
            status: BookingStatus::PendingPayment,
            total_amount,
            pickup_location: request.pickup_location,
            dropoff_location: request.dropoff_location,
            payment_method: request.payment_method,
            created_at: now,
            updated_at: now,
            started_at: None,
            ended_at: None,
            cancelled_at: None,
        })
    }

    /// Apply a status-changing action, stamping the matching timestamp.
    ///
    /// Use [`Booking::extend_to`] for [`BookingAction::ExtendTrip`], which
    /// also needs a new end date.
    ///
    /// # Errors
    ///
    /// Returns [`CarshareError::InvalidTransition`] if the action is not
    /// allowed from the current status.
    pub fn apply(&mut self, action: BookingAction, now: DateTime<Utc>) -> Result<()> {
        let next = self.check(action)?;
        match action {
            BookingAction::StartTrip => self.started_at = Some(now),
            BookingAction::EndTrip => self.ended_at = Some(now),
            BookingAction::Cancel => self.cancelled_at = Some(now),
            BookingAction::ConfirmPayment | BookingAction::ExtendTrip => {}
        }
        self.status = next;
        self.updated_at = now;
        Ok(())
    }

    /// Move the end date of an active trip to a later time.
    ///
    /// # Errors
    ///
    /// Returns [`CarshareError::InvalidTransition`] unless the booking is
    /// `ACTIVE`, and [`CarshareError::Validation`] unless `new_end_date`
    /// is after the current end date.
    pub fn extend_to(&mut self, new_end_date: DateTime<Utc>, now: DateTime<Utc>) -> Result<()> {
        self.check(BookingAction::ExtendTrip)?;
        if new_end_date <= self.end_date {
            return Err(CarshareError::Validation(format!(
                "new end date {new_end_date} must be after current end date {}",
                self.end_date
            )));
        }
        self.end_date = new_end_date;
        self.updated_at = now;
        Ok(())
    }

    /// Returns `true` once no further action is possible.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Planned rental length.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.end_date - self.start_date
    }

    /// Timestamp used to attribute a completed trip to a period.
    ///
    /// The actual end time when known, otherwise the planned end date.
    #[must_use]
    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        match self.status {
            BookingStatus::Completed => Some(self.ended_at.unwrap_or(self.end_date)),
            BookingStatus::PendingPayment
            | BookingStatus::Confirmed
            | BookingStatus::Active
            | BookingStatus::Cancelled => None,
        }
    }

    fn check(&self, action: BookingAction) -> Result<BookingStatus> {
        self.status.next(action).ok_or_else(|| {
            warn!(
                booking_id = %self.id,
                status = %self.status,
                %action,
                "Rejected booking transition"
            );
            CarshareError::InvalidTransition {
                from: self.status,
                action,
            }
        })
    }
}

fn missing(field: &str) -> CarshareError {
    CarshareError::Validation(format!("{field} is required"))
}
