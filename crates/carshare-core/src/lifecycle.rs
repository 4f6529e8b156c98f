//! Booking lifecycle state machine.
//!
//! [`BookingLifecycle`] is the only component in the core that mutates
//! shared state. Each operation loads one booking from the injected
//! [`BookingRepository`], applies a transition, and writes it back while
//! holding a lock scoped to that booking id. Operations on different
//! bookings never wait on each other.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::booking::{Booking, BookingAction, BookingRequest, BookingStatus};
use crate::clock::{Clock, SystemClock};
use crate::error::{CarshareError, Result};
use crate::storage::BookingRepository;

/// Per-booking mutual exclusion.
///
/// Entries are created on demand and dropped once no caller holds or
/// waits on them. The locks guard no data, so poisoning is ignored.
#[derive(Debug, Default)]
struct BookingLocks {
    table: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
}

impl BookingLocks {
    fn with_lock<T>(&self, id: Uuid, f: impl FnOnce() -> Result<T>) -> Result<T> {
        let entry = LockEntry::acquire(self, id);
        let _guard = entry.lock.lock().unwrap_or_else(PoisonError::into_inner);
        f()
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.table.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// A checked-out table entry; releases it on drop, including during unwinding.
struct LockEntry<'a> {
    locks: &'a BookingLocks,
    id: Uuid,
    lock: Arc<Mutex<()>>,
}

impl<'a> LockEntry<'a> {
    fn acquire(locks: &'a BookingLocks, id: Uuid) -> Self {
        let mut table = locks.table.lock().unwrap_or_else(PoisonError::into_inner);
        let lock = Arc::clone(table.entry(id).or_default());
        Self { locks, id, lock }
    }
}

impl Drop for LockEntry<'_> {
    fn drop(&mut self) {
        let mut table = self
            .locks
            .table
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        // One reference in the table, one held here.
        if Arc::strong_count(&self.lock) == 2 {
            table.remove(&self.id);
        }
    }
}

/// Drives bookings through their lifecycle.
pub struct BookingLifecycle<R, C = SystemClock> {
    repository: R,
    clock: C,
    locks: BookingLocks,
}

impl<R: BookingRepository> BookingLifecycle<R> {
    /// Create a lifecycle over `repository` using wall-clock time.
    pub fn new(repository: R) -> Self {
        Self::with_clock(repository, SystemClock)
    }
}

impl<R: BookingRepository, C: Clock> BookingLifecycle<R, C> {
    /// Create a lifecycle with an explicit time source.
    pub fn with_clock(repository: R, clock: C) -> Self {
        Self {
            repository,
            clock,
            locks: BookingLocks::default(),
        }
    }

    /// Access the underlying repository.
    pub const fn repository(&self) -> &R {
        &self.repository
    }

    /// Create a booking awaiting payment.
    ///
    /// # Errors
    ///
    /// Returns [`CarshareError::Validation`] for missing or invalid fields,
    /// or a repository error if the booking cannot be stored.
    #[instrument(skip_all, fields(vehicle_id = ?request.vehicle_id, renter_id = %request.renter_id))]
    pub fn create_booking(&self, request: BookingRequest) -> Result<Booking> {
        let booking = Booking::from_request(request, Uuid::new_v4(), self.clock.now())?;
        self.repository.put(booking.clone())?;
        info!(booking_id = %booking.id, amount = %booking.total_amount, "Booking created");
        Ok(booking)
    }

    /// Mark a pending booking as paid.
    ///
    /// # Errors
    ///
    /// [`CarshareError::BookingNotFound`] for unknown ids and
    /// [`CarshareError::InvalidTransition`] unless the booking is `PENDING_PAYMENT`.
    #[instrument(skip(self))]
    pub fn confirm_payment(&self, id: Uuid) -> Result<Booking> {
        self.transition(id, BookingAction::ConfirmPayment)
    }

    /// Hand over the vehicle; records `started_at`.
    ///
    /// # Errors
    ///
    /// [`CarshareError::InvalidTransition`] unless the booking is `CONFIRMED`.
    #[instrument(skip(self))]
    pub fn start_trip(&self, id: Uuid) -> Result<Booking> {
        self.transition(id, BookingAction::StartTrip)
    }

    /// Close a running trip; records `ended_at`.
    ///
    /// # Errors
    ///
    /// [`CarshareError::InvalidTransition`] unless the booking is `ACTIVE`.
    #[instrument(skip(self))]
    pub fn end_trip(&self, id: Uuid) -> Result<Booking> {
        self.transition(id, BookingAction::EndTrip)
    }

    /// Push back the end date of a running trip.
    ///
    /// # Errors
    ///
    /// [`CarshareError::InvalidTransition`] unless the booking is `ACTIVE`,
    /// [`CarshareError::Validation`] unless the new date is later.
    #[instrument(skip(self))]
    pub fn extend_trip(&self, id: Uuid, new_end_date: DateTime<Utc>) -> Result<Booking> {
        self.locks.with_lock(id, || {
            let mut booking = self.load(id)?;
            let previous = booking.end_date;
            booking.extend_to(new_end_date, self.clock.now())?;
            self.repository.put(booking.clone())?;
            info!(booking_id = %id, %previous, end_date = %booking.end_date, "Trip extended");
            Ok(booking)
        })
    }

    /// Cancel a booking that has not started.
    ///
    /// # Errors
    ///
    /// [`CarshareError::InvalidTransition`] unless the booking is
    /// `PENDING_PAYMENT` or `CONFIRMED`.
    #[instrument(skip(self))]
    pub fn cancel_booking(&self, id: Uuid) -> Result<Booking> {
        self.transition(id, BookingAction::Cancel)
    }

    /// Fetch a booking.
    ///
    /// # Errors
    ///
    /// [`CarshareError::BookingNotFound`] for unknown ids.
    pub fn get_booking(&self, id: Uuid) -> Result<Booking> {
        self.load(id)
    }

    /// All bookings placed by `renter_id`.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store cannot be read.
    pub fn bookings_for_renter(&self, renter_id: &str) -> Result<Vec<Booking>> {
        self.filtered(|b| b.renter_id == renter_id)
    }

    /// All bookings for vehicles owned by `owner_id`.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store cannot be read.
    pub fn bookings_for_owner(&self, owner_id: &str) -> Result<Vec<Booking>> {
        self.filtered(|b| b.owner_id == owner_id)
    }

    /// The running trip for a vehicle, if any.
    ///
    /// # Errors
    ///
    /// Returns a repository error if the store cannot be read.
    pub fn active_booking_for_vehicle(&self, vehicle_id: &str) -> Result<Option<Booking>> {
        Ok(self
            .filtered(|b| b.vehicle_id == vehicle_id && b.status == BookingStatus::Active)?
            .into_iter()
            .next())
    }

    fn transition(&self, id: Uuid, action: BookingAction) -> Result<Booking> {
        self.locks.with_lock(id, || {
            let mut booking = self.load(id)?;
            let from = booking.status;
            booking.apply(action, self.clock.now())?;
            self.repository.put(booking.clone())?;
            info!(booking_id = %id, %from, to = %booking.status, "Booking transitioned");
            Ok(booking)
        })
    }

    fn load(&self, id: Uuid) -> Result<Booking> {
        self.repository.get(id)?.ok_or_else(|| {
            debug!(booking_id = %id, "Booking lookup missed");
            CarshareError::BookingNotFound(id)
        })
    }

    fn filtered(&self, keep: impl Fn(&Booking) -> bool) -> Result<Vec<Booking>> {
        Ok(self.repository.list()?.into_iter().filter(keep).collect())
    }
}
