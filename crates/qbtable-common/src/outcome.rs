use serde::{Deserialize, Serialize};

/// Result of an operation that soft-fails on transport errors.
///
/// `Unreachable` means the backend could not be contacted at all (DNS,
/// connect, TLS, dropped connection). It is distinct from an empty
/// successful result and from a request the backend rejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Outcome<T> {
    /// The backend answered.
    Data(T),
    /// The backend could not be reached.
    Unreachable,
}

impl<T> Outcome<T> {
    /// Whether the backend answered.
    #[must_use]
    pub const fn is_data(&self) -> bool {
        matches!(self, Self::Data(_))
    }

    /// Whether the backend could not be reached.
    #[must_use]
    pub const fn is_unreachable(&self) -> bool {
        matches!(self, Self::Unreachable)
    }

    /// Maps the payload, leaving `Unreachable` untouched.
    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Outcome<U> {
        match self {
            Self::Data(value) => Outcome::Data(f(value)),
            Self::Unreachable => Outcome::Unreachable,
        }
    }

    /// Maps the payload with a fallible function.
    ///
    /// # Errors
    ///
    /// Returns whatever error `f` returns.
    pub fn try_map<U, E, F: FnOnce(T) -> Result<U, E>>(self, f: F) -> Result<Outcome<U>, E> {
        match self {
            Self::Data(value) => f(value).map(Outcome::Data),
            Self::Unreachable => Ok(Outcome::Unreachable),
        }
    }

    /// Converts into an `Option`, discarding the unreachable marker.
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Data(value) => Some(value),
            Self::Unreachable => None,
        }
    }
}

impl<T: Default> Outcome<T> {
    /// Returns the payload, or `T::default()` when unreachable.
    pub fn unwrap_or_default(self) -> T {
        self.into_option().unwrap_or_default()
    }
}

impl<T> From<T> for Outcome<T> {
    fn from(value: T) -> Self {
        Self::Data(value)
    }
}
