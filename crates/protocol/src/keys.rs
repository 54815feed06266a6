//! Credentials, permissions, and schedules.
//!
//! A lock issues `Key`s: immutable credentials with a permission tier.
//! Owner, admin, and anytime keys act unconditionally; a scheduled key
//! is bounded by a weekday mask, an optional expiration date, and an
//! optional daily time window. A `NewKey` is a pending credential that
//! becomes a `Key` on redemption or is discarded after its expiration.

use chrono::{DateTime, Datelike, Timelike, Utc, Weekday};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{ProtocolError, Result};

/// Minutes in a day; the exclusive upper bound for a time window edge.
pub const MINUTES_PER_DAY: u16 = 24 * 60;

/// An issued credential for operating a lock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Key {
    /// Unique identifier of the key.
    pub id: Uuid,
    /// Display name of the key.
    pub name: String,
    /// When the key was created.
    pub created: DateTime<Utc>,
    /// What the key is allowed to do, and when.
    pub permission: Permission,
}

impl Key {
    /// Creates a new key with a fresh identifier, stamped now.
    pub fn new(name: impl Into<String>, permission: Permission) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created: Utc::now(),
            permission,
        }
    }
}

/// A pending credential awaiting redemption.
///
/// Carries the same fields as a `Key` plus an expiration date. The
/// invitation secret travels separately, inside the out-of-band
/// invitation document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewKey {
    /// Unique identifier the confirmed key will carry.
    pub id: Uuid,
    /// Display name of the pending key.
    pub name: String,
    /// When the invitation was created.
    pub created: DateTime<Utc>,
    /// Permission the confirmed key will carry.
    pub permission: Permission,
    /// After this instant the invitation can no longer be redeemed.
    pub expiration: DateTime<Utc>,
}

impl NewKey {
    /// Creates a pending key with a fresh identifier, stamped now.
    pub fn new(
        name: impl Into<String>,
        permission: Permission,
        expiration: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            created: Utc::now(),
            permission,
            expiration,
        }
    }

    /// Returns true if the invitation can no longer be redeemed.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expiration
    }

    /// Converts this pending key into its confirmed form.
    pub fn confirm(self) -> Key {
        Key {
            id: self.id,
            name: self.name,
            created: self.created,
            permission: self.permission,
        }
    }
}

/// Distinguishes issued keys from pending ones in listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyType {
    /// An issued credential.
    Key,
    /// A pending credential awaiting redemption.
    NewKey,
}

/// Permission tier of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "schedule", rename_all = "lowercase")]
pub enum Permission {
    /// The lock's owner; unrestricted, can manage keys.
    Owner,
    /// Unrestricted access; can manage keys.
    Admin,
    /// Unrestricted access; cannot manage keys.
    Anytime,
    /// Access restricted to the contained schedule.
    Scheduled(Schedule),
}

impl Permission {
    /// Returns true if an action is allowed at the given instant.
    ///
    /// Owner, admin, and anytime permissions allow unconditionally;
    /// scheduled permissions delegate to the schedule.
    pub fn is_allowed(&self, now: DateTime<Utc>) -> bool {
        match self {
            Permission::Owner | Permission::Admin | Permission::Anytime => true,
            Permission::Scheduled(schedule) => schedule.is_valid(now),
        }
    }

    /// Returns true if this permission may create, list, or remove keys.
    pub fn can_administrate(&self) -> bool {
        matches!(self, Permission::Owner | Permission::Admin)
    }
}

/// A time-bounded restriction on when a credential is valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Schedule {
    /// Days of the week on which the credential is valid.
    pub weekdays: Weekdays,
    /// If set, the credential is invalid after this instant.
    #[serde(default)]
    pub expiry: Option<DateTime<Utc>>,
    /// If set, the credential is valid only within this daily window.
    #[serde(default)]
    pub interval: Option<TimeInterval>,
}

impl Schedule {
    /// Evaluates this schedule at the given instant.
    ///
    /// An expired schedule is never valid, regardless of weekday or
    /// time-of-day match.
    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        if let Some(expiry) = self.expiry {
            if now > expiry {
                return false;
            }
        }
        if !self.weekdays.contains(now.weekday()) {
            return false;
        }
        if let Some(interval) = self.interval {
            let minute = (now.hour() * 60 + now.minute()) as u16;
            if !interval.contains(minute) {
                return false;
            }
        }
        true
    }
}

/// The days of the week on which a schedule applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Weekdays {
    pub sunday: bool,
    pub monday: bool,
    pub tuesday: bool,
    pub wednesday: bool,
    pub thursday: bool,
    pub friday: bool,
    pub saturday: bool,
}

impl Weekdays {
    /// Every day of the week.
    pub fn all() -> Self {
        Self {
            sunday: true,
            monday: true,
            tuesday: true,
            wednesday: true,
            thursday: true,
            friday: true,
            saturday: true,
        }
    }

    /// No day of the week.
    pub fn none() -> Self {
        Self {
            sunday: false,
            monday: false,
            tuesday: false,
            wednesday: false,
            thursday: false,
            friday: false,
            saturday: false,
        }
    }

    /// Builds a weekday set from a 7-bit mask, bit 0 = Sunday.
    ///
    /// Fails if any bit above the seventh is set.
    pub fn from_mask(mask: u8) -> Result<Self> {
        if mask & 0b1000_0000 != 0 {
            return Err(ProtocolError::Validation(format!(
                "invalid weekday mask: {:#010b}",
                mask
            )));
        }
        Ok(Self {
            sunday: mask & (1 << 0) != 0,
            monday: mask & (1 << 1) != 0,
            tuesday: mask & (1 << 2) != 0,
            wednesday: mask & (1 << 3) != 0,
            thursday: mask & (1 << 4) != 0,
            friday: mask & (1 << 5) != 0,
            saturday: mask & (1 << 6) != 0,
        })
    }

    /// Returns this weekday set as a 7-bit mask, bit 0 = Sunday.
    pub fn as_mask(&self) -> u8 {
        (self.sunday as u8)
            | (self.monday as u8) << 1
            | (self.tuesday as u8) << 2
            | (self.wednesday as u8) << 3
            | (self.thursday as u8) << 4
            | (self.friday as u8) << 5
            | (self.saturday as u8) << 6
    }

    /// Returns true if the given weekday is in the set.
    pub fn contains(&self, weekday: Weekday) -> bool {
        match weekday {
            Weekday::Sun => self.sunday,
            Weekday::Mon => self.monday,
            Weekday::Tue => self.tuesday,
            Weekday::Wed => self.wednesday,
            Weekday::Thu => self.thursday,
            Weekday::Fri => self.friday,
            Weekday::Sat => self.saturday,
        }
    }

    /// Returns true if no weekday is set.
    pub fn is_empty(&self) -> bool {
        self.as_mask() == 0
    }
}

impl Default for Weekdays {
    fn default() -> Self {
        Self::all()
    }
}

/// An inclusive daily time window, in minutes since midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeInterval {
    start: u16,
    end: u16,
}

impl TimeInterval {
    /// Creates a window from `start` to `end` minutes, inclusive.
    ///
    /// Fails if either edge is past the end of the day or the window is
    /// inverted.
    pub fn new(start: u16, end: u16) -> Result<Self> {
        if start >= MINUTES_PER_DAY || end >= MINUTES_PER_DAY {
            return Err(ProtocolError::Validation(format!(
                "time interval edge out of range: {}..={}",
                start, end
            )));
        }
        if start > end {
            return Err(ProtocolError::Validation(format!(
                "inverted time interval: {}..={}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    /// The whole day.
    pub fn all_day() -> Self {
        Self {
            start: 0,
            end: MINUTES_PER_DAY - 1,
        }
    }

    /// The first minute of the window.
    pub fn start(&self) -> u16 {
        self.start
    }

    /// The last minute of the window.
    pub fn end(&self) -> u16 {
        self.end
    }

    /// Returns true if the given minute of the day falls in the window.
    pub fn contains(&self, minute: u16) -> bool {
        minute >= self.start && minute <= self.end
    }
}
