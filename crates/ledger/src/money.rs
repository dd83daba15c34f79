use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::LedgerError;

/// Minor units per major unit. Every supported currency has two decimals.
const MINOR_PER_MAJOR: i64 = 100;

/// A signed amount of money counted in **minor units** (hundredths).
///
/// Shares, balances, expense and settlement amounts all use it, so the
/// ledger never adds floating-point values. A positive balance is money owed
/// to the user, a negative one money the user owes.
///
/// ```rust
/// use ledger::Money;
///
/// let dinner: Money = "90".parse().unwrap();
/// assert_eq!(dinner.minor(), 9000);
/// assert_eq!((-dinner).to_string(), "-90.00");
/// assert!("4.005".parse::<Money>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    /// Largest gap still treated as equal when totals are compared: one
    /// minor unit (0.01).
    pub const TOLERANCE: Money = Money(1);

    #[must_use]
    pub const fn new(minor: i64) -> Self {
        Self(minor)
    }

    #[must_use]
    pub const fn minor(self) -> i64 {
        self.0
    }

    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    #[must_use]
    pub const fn abs(self) -> Self {
        Self(self.0.abs())
    }

    /// `true` when `self` and `other` are at most [`Money::TOLERANCE`] apart.
    #[must_use]
    pub fn within_tolerance(self, other: Money) -> bool {
        self.0.abs_diff(other.0) <= Self::TOLERANCE.0.unsigned_abs()
    }

    #[must_use]
    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    #[must_use]
    pub fn checked_sub(self, rhs: Money) -> Option<Money> {
        self.0.checked_sub(rhs.0).map(Money)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let magnitude = self.0.unsigned_abs();
        let per_major = MINOR_PER_MAJOR.unsigned_abs();
        if self.is_negative() {
            f.write_str("-")?;
        }
        write!(f, "{}.{:02}", magnitude / per_major, magnitude % per_major)
    }
}

impl From<i64> for Money {
    fn from(minor: i64) -> Self {
        Self(minor)
    }
}

impl From<Money> for i64 {
    fn from(money: Money) -> Self {
        money.0
    }
}

macro_rules! money_arithmetic {
    ($op:ident, $method:ident, $assign:ident, $assign_method:ident, $sym:tt) => {
        impl $op for Money {
            type Output = Money;

            fn $method(self, rhs: Money) -> Money {
                Money(self.0 $sym rhs.0)
            }
        }

        impl $assign for Money {
            fn $assign_method(&mut self, rhs: Money) {
                *self = *self $sym rhs;
            }
        }
    };
}

money_arithmetic!(Add, add, AddAssign, add_assign, +);
money_arithmetic!(Sub, sub, SubAssign, sub_assign, -);

impl Neg for Money {
    type Output = Money;

    fn neg(self) -> Money {
        Money(-self.0)
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::ZERO, Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

/// Parses the unsigned part of an amount (`12`, `12.3`, `12,34`).
fn parse_magnitude(digits: &str) -> Result<i64, String> {
    let (major, fraction) = digits.split_once(['.', ',']).unwrap_or((digits, ""));

    let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
    if major.is_empty() || !all_digits(major) || !all_digits(fraction) {
        return Err(format!("invalid amount: {digits}"));
    }

    let fraction = match fraction.len() {
        0 => 0,
        len @ (1 | 2) => {
            let value = fraction
                .parse::<i64>()
                .map_err(|_| format!("invalid amount: {digits}"))?;
            if len == 1 { value * 10 } else { value }
        }
        _ => return Err("too many decimals".to_string()),
    };

    major
        .parse::<i64>()
        .ok()
        .and_then(|major| major.checked_mul(MINOR_PER_MAJOR))
        .and_then(|minor| minor.checked_add(fraction))
        .ok_or_else(|| "amount too large".to_string())
}

impl FromStr for Money {
    type Err = LedgerError;

    /// Reads a decimal amount typed by a person: an optional `+`/`-`, then
    /// at most two decimals after a `.` or `,`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        let (negative, digits) = match input.as_bytes().first() {
            Some(b'-') => (true, input[1..].trim_start()),
            Some(b'+') => (false, input[1..].trim_start()),
            _ => (false, input),
        };
        if digits.is_empty() {
            return Err(LedgerError::Validation("empty amount".to_string()));
        }

        let magnitude = parse_magnitude(digits).map_err(LedgerError::Validation)?;
        Ok(Money(if negative { -magnitude } else { magnitude }))
    }
}
