//! Insurer/patient cost sharing.
//!
//! [`calculate_coverage`] is a pure function: no I/O, no hidden state, and
//! identical inputs always produce identical output, so any stored coverage
//! snapshot can be recomputed for audit.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::order::Money;

/// Validation failures of coverage terms or the cost they apply to.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoverageError {
    #[error("total cost must be greater than zero, got {0}")]
    NonPositiveTotal(Money),

    #[error("coverage percentage must be within [0, 100], got {0}")]
    PercentageOutOfRange(f64),

    #[error("coverage percentage must have at most two decimal places, got {0}")]
    PercentagePrecision(f64),

    #[error("coverage basis points must be within [0, 10000], got {0}")]
    BasisPointsOutOfRange(u32),

    #[error("fixed copay must not be negative, got {0}")]
    NegativeCopay(Money),

    #[error("coverage percentage and fixed copay are mutually exclusive")]
    ConflictingTerms,
}

/// Insurer share as a percentage, held in basis points (1/100 of a percent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub struct Percentage(u32);

impl Percentage {
    pub const MAX_BASIS_POINTS: u32 = 10_000;

    /// Creates a percentage from basis points (0..=10_000).
    pub fn from_basis_points(basis_points: u32) -> Result<Self, CoverageError> {
        if basis_points > Self::MAX_BASIS_POINTS {
            return Err(CoverageError::BasisPointsOutOfRange(basis_points));
        }
        Ok(Self(basis_points))
    }

    /// Creates a percentage from a percent value with at most two decimals.
    pub fn from_percent(percent: f64) -> Result<Self, CoverageError> {
        if !percent.is_finite() || !(0.0..=100.0).contains(&percent) {
            return Err(CoverageError::PercentageOutOfRange(percent));
        }
        let scaled = percent * 100.0;
        let basis_points = scaled.round();
        // Tolerates binary representation error only (33.33 * 100 is not exact).
        if (scaled - basis_points).abs() > 1e-6 {
            return Err(CoverageError::PercentagePrecision(percent));
        }
        Ok(Self(basis_points as u32))
    }

    /// Creates a percentage, clamping anything above 100%.
    pub const fn clamped(basis_points: u32) -> Self {
        if basis_points > Self::MAX_BASIS_POINTS {
            Self(Self::MAX_BASIS_POINTS)
        } else {
            Self(basis_points)
        }
    }

    pub fn basis_points(&self) -> u32 {
        self.0
    }

    pub fn as_percent(&self) -> f64 {
        f64::from(self.0) / 100.0
    }
}

impl TryFrom<u32> for Percentage {
    type Error = CoverageError;

    fn try_from(basis_points: u32) -> Result<Self, Self::Error> {
        Self::from_basis_points(basis_points)
    }
}

impl From<Percentage> for u32 {
    fn from(p: Percentage) -> Self {
        p.0
    }
}

impl std::fmt::Display for Percentage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{:02}%", self.0 / 100, self.0 % 100)
    }
}

/// The agreed insurer cost-sharing rule for an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", content = "value", rename_all = "snake_case")]
pub enum CoverageTerms {
    /// The insurer pays this share of the total.
    Percentage(Percentage),

    /// The patient pays this flat amount (capped at the total).
    FixedCopay(Money),
}

impl CoverageTerms {
    /// Percentage-mode terms from a percent value.
    pub fn percentage(percent: f64) -> Result<Self, CoverageError> {
        Percentage::from_percent(percent).map(CoverageTerms::Percentage)
    }

    /// Fixed-copay terms.
    pub fn fixed_copay(copay: Money) -> Result<Self, CoverageError> {
        if copay.is_negative() {
            return Err(CoverageError::NegativeCopay(copay));
        }
        Ok(CoverageTerms::FixedCopay(copay))
    }

    /// Builds terms from the two optional request fields.
    ///
    /// Returns `Ok(None)` when neither is given, so the caller can fall back
    /// to its default terms.
    pub fn from_fields(
        percent: Option<f64>,
        fixed_copay: Option<Money>,
    ) -> Result<Option<Self>, CoverageError> {
        match (percent, fixed_copay) {
            (Some(_), Some(_)) => Err(CoverageError::ConflictingTerms),
            (Some(p), None) => Self::percentage(p).map(Some),
            (None, Some(c)) => Self::fixed_copay(c).map(Some),
            (None, None) => Ok(None),
        }
    }
}

/// Immutable insurer/patient split for an order.
///
/// `insurer_amount + patient_amount == total_cost` holds exactly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InsuranceCoverage {
    total_cost: Money,
    terms: CoverageTerms,
    insurer_amount: Money,
    patient_amount: Money,
}

impl InsuranceCoverage {
    pub fn total_cost(&self) -> Money {
        self.total_cost
    }

    pub fn terms(&self) -> CoverageTerms {
        self.terms
    }

    /// The percentage, when percentage mode was used.
    pub fn coverage_percentage(&self) -> Option<Percentage> {
        match self.terms {
            CoverageTerms::Percentage(p) => Some(p),
            CoverageTerms::FixedCopay(_) => None,
        }
    }

    /// The copay, when fixed-copay mode was used.
    pub fn fixed_copay(&self) -> Option<Money> {
        match self.terms {
            CoverageTerms::FixedCopay(c) => Some(c),
            CoverageTerms::Percentage(_) => None,
        }
    }

    pub fn insurer_amount(&self) -> Money {
        self.insurer_amount
    }

    pub fn patient_amount(&self) -> Money {
        self.patient_amount
    }
}

/// Computes the insurer/patient split of `total_cost` under `terms`.
///
/// Percentage mode rounds the insurer share half-up to the cent and gives
/// the patient the exact remainder. Fixed-copay mode charges the patient
/// `min(copay, total)` and the insurer the rest.
pub fn calculate_coverage(
    total_cost: Money,
    terms: &CoverageTerms,
) -> Result<InsuranceCoverage, CoverageError> {
    if !total_cost.is_positive() {
        return Err(CoverageError::NonPositiveTotal(total_cost));
    }

    let (insurer_amount, patient_amount) = match *terms {
        CoverageTerms::Percentage(percentage) => {
            let basis_points = Percentage::from_basis_points(percentage.basis_points())?;
            let scaled = i128::from(total_cost.cents()) * i128::from(basis_points.basis_points());
            let denominator = i128::from(Percentage::MAX_BASIS_POINTS);
            // Both factors are non-negative and the result is at most
            // total_cost, so it fits back into i64.
            let insurer = Money::from_cents(((scaled + denominator / 2) / denominator) as i64);
            (insurer, total_cost - insurer)
        }
        CoverageTerms::FixedCopay(copay) => {
            if copay.is_negative() {
                return Err(CoverageError::NegativeCopay(copay));
            }
            let patient = copay.min(total_cost);
            (total_cost - patient, patient)
        }
    };

    Ok(InsuranceCoverage {
        total_cost,
        terms: *terms,
        insurer_amount,
        patient_amount,
    })
}
