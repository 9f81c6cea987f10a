//! Standard API Value Types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

// == Status ==
/// Lifecycle state of a cache or cache manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Uninitialised,
    Started,
    Stopped,
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Status::Uninitialised => "UNINITIALISED",
            Status::Started => "STARTED",
            Status::Stopped => "STOPPED",
        };
        f.write_str(label)
    }
}

// == Time Unit ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    /// Duration of `amount` units, saturating on overflow.
    pub fn to_duration(self, amount: u64) -> Duration {
        match self {
            TimeUnit::Nanoseconds => Duration::from_nanos(amount),
            TimeUnit::Microseconds => Duration::from_micros(amount),
            TimeUnit::Milliseconds => Duration::from_millis(amount),
            TimeUnit::Seconds => Duration::from_secs(amount),
            TimeUnit::Minutes => Duration::from_secs(amount.saturating_mul(60)),
            TimeUnit::Hours => Duration::from_secs(amount.saturating_mul(3_600)),
            TimeUnit::Days => Duration::from_secs(amount.saturating_mul(86_400)),
        }
    }
}

// == Expiry ==
/// How long an entry lives along one expiry dimension.
///
/// An amount of zero means the entry never expires along that dimension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Expiry {
    unit: TimeUnit,
    amount: u64,
}

impl Expiry {
    pub const ETERNAL: Expiry = Expiry {
        unit: TimeUnit::Seconds,
        amount: 0,
    };

    pub fn new(unit: TimeUnit, amount: u64) -> Self {
        Self { unit, amount }
    }

    pub fn time_unit(&self) -> TimeUnit {
        self.unit
    }

    pub fn amount(&self) -> u64 {
        self.amount
    }

    pub fn is_eternal(&self) -> bool {
        self.amount == 0
    }

    /// Length of the expiry, `None` when eternal.
    pub fn as_duration(&self) -> Option<Duration> {
        if self.is_eternal() {
            None
        } else {
            Some(self.unit.to_duration(self.amount))
        }
    }
}

impl Default for Expiry {
    fn default() -> Self {
        Expiry::ETERNAL
    }
}

/// Expiry dimensions a cache can be configured with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExpiryType {
    /// Time since the entry was last read or written
    Accessed,
    /// Time since the entry was last written
    Modified,
}

// == Optional Features ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OptionalFeature {
    Transactions,
    Annotations,
    StoreByReference,
}

// == Listener Scope ==
/// Which events a listener wants to hear about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NotificationScope {
    Local,
    Remote,
    All,
}

// == Transactions ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IsolationLevel {
    None,
    ReadCommitted,
    ReadUncommitted,
    RepeatableRead,
    Serializable,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionMode {
    None,
    Local,
    Xa,
}
