//! Integer-paise money representation.
//!
//! All amounts on the decision surface (eligibility checks, gateway requests,
//! store rows) are `i64` paise (1 rupee = 100 paise). `f64` rupees only exist
//! at the JSON wire boundary:
//!
//! | Direction              | Function              |
//! |------------------------|-----------------------|
//! | internal → JSON        | [`paise_to_rupees`]   |
//! | JSON → internal        | [`rupees_to_paise`]   |

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Scale factor: 1 rupee = 100 paise.
pub const PAISE_PER_RUPEE: i64 = 100;

/// Errors returned by [`rupees_to_paise`] when the input is not representable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MoneyError {
    /// Input was `NaN` or infinite.
    NotFinite,
    /// Input would overflow `i64` after scaling by [`PAISE_PER_RUPEE`].
    OutOfRange,
}

impl std::fmt::Display for MoneyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MoneyError::NotFinite => write!(f, "rupees_to_paise: non-finite input (NaN or Inf)"),
            MoneyError::OutOfRange => {
                write!(f, "rupees_to_paise: amount out of i64 range after scaling")
            }
        }
    }
}

impl std::error::Error for MoneyError {}

/// Convert integer paise to `f64` rupees for JSON serialization.
pub fn paise_to_rupees(paise: i64) -> f64 {
    paise as f64 / PAISE_PER_RUPEE as f64
}

/// Convert `f64` rupees from a JSON payload into integer paise, rounding to
/// the nearest paisa.
pub fn rupees_to_paise(rupees: f64) -> Result<i64, MoneyError> {
    if !rupees.is_finite() {
        return Err(MoneyError::NotFinite);
    }
    let scaled = rupees * PAISE_PER_RUPEE as f64;
    if scaled > i64::MAX as f64 || scaled < i64::MIN as f64 {
        return Err(MoneyError::OutOfRange);
    }
    Ok(scaled.round() as i64)
}

/// An INR amount held as integer paise. Serializes as a rupee number.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Paise(pub i64);

impl Paise {
    pub const ZERO: Paise = Paise(0);

    pub fn from_rupees(rupees: i64) -> Self {
        Paise(rupees.saturating_mul(PAISE_PER_RUPEE))
    }

    pub fn as_i64(self) -> i64 {
        self.0
    }

    pub fn as_rupees(self) -> f64 {
        paise_to_rupees(self.0)
    }

    pub fn is_positive(self) -> bool {
        self.0 > 0
    }
}

impl std::fmt::Display for Paise {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let per = PAISE_PER_RUPEE as u64;
        write!(f, "{sign}₹{}.{:02}", abs / per, abs % per)
    }
}

impl Serialize for Paise {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        // Whole-rupee amounts go out as integers so `500` stays `500`, not `500.0`.
        if self.0 % PAISE_PER_RUPEE == 0 {
            serializer.serialize_i64(self.0 / PAISE_PER_RUPEE)
        } else {
            serializer.serialize_f64(self.as_rupees())
        }
    }
}

impl<'de> Deserialize<'de> for Paise {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let rupees = f64::deserialize(deserializer)?;
        rupees_to_paise(rupees)
            .map(Paise)
            .map_err(serde::de::Error::custom)
    }
}
