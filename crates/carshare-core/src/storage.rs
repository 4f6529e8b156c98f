//! Booking repository capability.
//!
//! The lifecycle never touches a global list of bookings. Collaborators
//! inject a [`BookingRepository`] backed by whatever store they own;
//! [`InMemoryBookingRepository`] is provided for tests and embedded use.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use uuid::Uuid;

use crate::booking::Booking;
use crate::error::{CarshareError, Result};

/// Storage backend for bookings.
///
/// Implementations only need to be individually atomic per call; the
/// lifecycle serializes read-modify-write cycles on the same id itself.
pub trait BookingRepository: Send + Sync {
    /// Load a booking by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn get(&self, id: Uuid) -> Result<Option<Booking>>;

    /// Insert or replace a booking.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be written.
    fn put(&self, booking: Booking) -> Result<()>;

    /// List every stored booking.
    ///
    /// # Errors
    ///
    /// Returns an error if the backing store cannot be read.
    fn list(&self) -> Result<Vec<Booking>>;
}

impl<T: BookingRepository + ?Sized> BookingRepository for Arc<T> {
    fn get(&self, id: Uuid) -> Result<Option<Booking>> {
        (**self).get(id)
    }

    fn put(&self, booking: Booking) -> Result<()> {
        (**self).put(booking)
    }

    fn list(&self) -> Result<Vec<Booking>> {
        (**self).list()
    }
}

/// Process-local repository keyed by booking id.
#[derive(Debug, Default)]
pub struct InMemoryBookingRepository {
    bookings: RwLock<HashMap<Uuid, Booking>>,
}

impl InMemoryBookingRepository {
    /// Create an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored bookings.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock was poisoned.
    pub fn len(&self) -> Result<usize> {
        Ok(self.read()?.len())
    }

    /// Returns `true` if nothing has been stored yet.
    ///
    /// # Errors
    ///
    /// Returns an error if the internal lock was poisoned.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.read()?.is_empty())
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, HashMap<Uuid, Booking>>> {
        self.bookings
            .read()
            .map_err(|_| CarshareError::Persistence("booking store lock poisoned".into()))
    }
}

impl BookingRepository for InMemoryBookingRepository {
    fn get(&self, id: Uuid) -> Result<Option<Booking>> {
        Ok(self.read()?.get(&id).cloned())
    }

    fn put(&self, booking: Booking) -> Result<()> {
        self.bookings
            .write()
            .map_err(|_| CarshareError::Persistence("booking store lock poisoned".into()))?
            .insert(booking.id, booking);
        Ok(())
    }

    /// Bookings ordered by creation time, then id.
    fn list(&self) -> Result<Vec<Booking>> {
        let mut all: Vec<Booking> = self.read()?.values().cloned().collect();
        all.sort_by(|a, b| a.created_at.cmp(&b.created_at).then(a.id.cmp(&b.id)));
        Ok(all)
    }
}
