use std::{
    fmt,
    iter::Sum,
    ops::{Add, AddAssign, Neg, Sub, SubAssign},
    str::FromStr,
};

use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine};

/// Signed money amount represented as **integer cents**.
///
/// Every monetary value handled by the engine (expense amounts, beneficiary
/// shares, balances, settlement amounts) uses this type, so the 2-decimal
/// fixed-point policy holds by construction.
///
/// The value is signed:
/// - positive = the group owes the member (net creditor)
/// - negative = the member owes the group (net debtor)
///
/// # Examples
///
/// ```rust
/// use engine::MoneyCents;
///
/// let amount = MoneyCents::new(12_34);
/// assert_eq!(amount.cents(), 1234);
/// assert_eq!(amount.to_string(), "12.34");
/// ```
///
/// Parsing from user input (accepts `.` or `,` as decimal separator; rejects >
/// 2 decimals):
///
/// ```rust
/// use engine::MoneyCents;
///
/// assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
/// assert_eq!("10,5".parse::<MoneyCents>().unwrap().cents(), 1050);
/// assert!("12.345".parse::<MoneyCents>().is_err());
/// ```
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MoneyCents(i64);

impl MoneyCents {
    pub const ZERO: MoneyCents = MoneyCents(0);

    /// Creates a new amount from integer cents.
    #[must_use]
    pub const fn new(cents: i64) -> Self {
        Self(cents)
    }

    /// Returns the raw value in cents.
    #[must_use]
    pub const fn cents(self) -> i64 {
        self.0
    }

    /// Returns `true` if the amount is 0.
    #[must_use]
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Returns `true` if the amount is positive.
    #[must_use]
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// Returns `true` if the amount is negative.
    #[must_use]
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Checked addition (returns `None` on overflow).
    #[must_use]
    pub fn checked_add(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_add(rhs.0).map(MoneyCents)
    }

    /// Checked subtraction (returns `None` on overflow).
    #[must_use]
    pub fn checked_sub(self, rhs: MoneyCents) -> Option<MoneyCents> {
        self.0.checked_sub(rhs.0).map(MoneyCents)
    }

    /// Checked negation (`None` for the most negative value).
    #[must_use]
    pub fn checked_neg(self) -> Option<MoneyCents> {
        self.0.checked_neg().map(MoneyCents)
    }

    /// Sums the amounts, returning `None` if any partial sum overflows.
    #[must_use]
    pub fn checked_sum<I>(values: I) -> Option<MoneyCents>
    where
        I: IntoIterator<Item = MoneyCents>,
    {
        values
            .into_iter()
            .try_fold(MoneyCents::ZERO, MoneyCents::checked_add)
    }

    /// Splits the amount into `parts` shares.
    ///
    /// Each share is `amount / parts` rounded half away from zero to the cent;
    /// the last share absorbs the remainder, so the shares always sum to the
    /// amount exactly.
    ///
    /// ```rust
    /// use engine::MoneyCents;
    ///
    /// let shares = MoneyCents::new(100_00).split_even(3).unwrap();
    /// assert_eq!(
    ///     shares,
    ///     vec![MoneyCents::new(33_33), MoneyCents::new(33_33), MoneyCents::new(33_34)]
    /// );
    /// ```
    ///
    /// Fails when `parts` is zero, or when the amount is too small for the
    /// remainder rule to keep the last share non-negative (e.g. 0.02 among 4).
    pub fn split_even(self, parts: usize) -> ResultEngine<Vec<MoneyCents>> {
        if parts == 0 {
            return Err(EngineError::InvalidSplit(
                "at least one beneficiary is required".to_string(),
            ));
        }
        let divisor = i64::try_from(parts)
            .map_err(|_| EngineError::InvalidSplit("too many beneficiaries".to_string()))?;

        let share = MoneyCents(div_round_half_away(self.0, divisor));
        let mut shares = vec![share; parts];
        let assigned = share
            .0
            .checked_mul(divisor - 1)
            .ok_or_else(|| EngineError::InvalidAmount("amount too large".to_string()))?;
        let last = MoneyCents(self.0 - assigned);
        if self.0 >= 0 && last.is_negative() {
            return Err(EngineError::InvalidSplit(format!(
                "{self} cannot be split evenly among {parts} beneficiaries"
            )));
        }
        if let Some(slot) = shares.last_mut() {
            *slot = last;
        }
        Ok(shares)
    }
}

/// Integer division rounding half away from zero (`divisor` must be > 0).
fn div_round_half_away(value: i64, divisor: i64) -> i64 {
    let quotient = value / divisor;
    let remainder = value % divisor;
    if remainder.abs() * 2 >= divisor {
        quotient + value.signum()
    } else {
        quotient
    }
}

impl fmt::Display for MoneyCents {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / 100;
        let cents = abs % 100;
        write!(f, "{sign}{units}.{cents:02}")
    }
}

impl From<i64> for MoneyCents {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<MoneyCents> for i64 {
    fn from(value: MoneyCents) -> Self {
        value.0
    }
}

impl Add for MoneyCents {
    type Output = MoneyCents;

    fn add(self, rhs: MoneyCents) -> Self::Output {
        MoneyCents(self.0 + rhs.0)
    }
}

impl AddAssign for MoneyCents {
    fn add_assign(&mut self, rhs: MoneyCents) {
        self.0 += rhs.0;
    }
}

impl Sub for MoneyCents {
    type Output = MoneyCents;

    fn sub(self, rhs: MoneyCents) -> Self::Output {
        MoneyCents(self.0 - rhs.0)
    }
}

impl SubAssign for MoneyCents {
    fn sub_assign(&mut self, rhs: MoneyCents) {
        self.0 -= rhs.0;
    }
}

impl Neg for MoneyCents {
    type Output = MoneyCents;

    fn neg(self) -> Self::Output {
        MoneyCents(-self.0)
    }
}

impl Sum for MoneyCents {
    fn sum<I: Iterator<Item = MoneyCents>>(iter: I) -> Self {
        iter.fold(MoneyCents::ZERO, |acc, value| acc + value)
    }
}

impl<'a> Sum<&'a MoneyCents> for MoneyCents {
    fn sum<I: Iterator<Item = &'a MoneyCents>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

impl FromStr for MoneyCents {
    type Err = EngineError;

    /// Parses a decimal string into cents.
    ///
    /// Accepts `.` or `,` as decimal separator and an optional leading `+`/`-`.
    ///
    /// Validation rules:
    /// - max 2 fractional digits (rejects `12.345`)
    /// - rejects empty/invalid strings
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let empty = || EngineError::InvalidAmount("empty amount".to_string());
        let invalid = || EngineError::InvalidAmount("invalid amount".to_string());
        let overflow = || EngineError::InvalidAmount("amount too large".to_string());

        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(empty());
        }

        let (negative, rest) = if let Some(stripped) = trimmed.strip_prefix('-') {
            (true, stripped)
        } else if let Some(stripped) = trimmed.strip_prefix('+') {
            (false, stripped)
        } else {
            (false, trimmed)
        };

        let rest = rest.trim();
        if rest.is_empty() {
            return Err(empty());
        }

        let rest = rest.replace(',', ".");
        let mut parts = rest.split('.');
        let units_str = parts.next().ok_or_else(invalid)?;
        let cents_str = parts.next();

        if parts.next().is_some() {
            return Err(invalid());
        }

        if units_str.is_empty() || !units_str.chars().all(|c| c.is_ascii_digit()) {
            return Err(invalid());
        }

        let units: i64 = units_str.parse().map_err(|_| overflow())?;

        let cents: i64 = match cents_str {
            None | Some("") => 0,
            Some(frac) => {
                if !frac.chars().all(|c| c.is_ascii_digit()) {
                    return Err(invalid());
                }
                match frac.len() {
                    1 => frac.parse::<i64>().map_err(|_| invalid())? * 10,
                    2 => frac.parse::<i64>().map_err(|_| invalid())?,
                    _ => return Err(EngineError::InvalidAmount("too many decimals".to_string())),
                }
            }
        };

        let total = units
            .checked_mul(100)
            .and_then(|v| v.checked_add(cents))
            .ok_or_else(overflow)?;

        let signed = if negative {
            total.checked_neg().ok_or_else(overflow)?
        } else {
            total
        };

        Ok(MoneyCents(signed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cents(values: &[i64]) -> Vec<MoneyCents> {
        values.iter().copied().map(MoneyCents::new).collect()
    }

    #[test]
    fn display_formats_two_decimals() {
        assert_eq!(MoneyCents::new(0).to_string(), "0.00");
        assert_eq!(MoneyCents::new(1).to_string(), "0.01");
        assert_eq!(MoneyCents::new(10).to_string(), "0.10");
        assert_eq!(MoneyCents::new(1050).to_string(), "10.50");
        assert_eq!(MoneyCents::new(-1050).to_string(), "-10.50");
    }

    #[test]
    fn parse_accepts_dot_or_comma() {
        assert_eq!("10".parse::<MoneyCents>().unwrap().cents(), 1000);
        assert_eq!("10.5".parse::<MoneyCents>().unwrap().cents(), 1050);
        assert_eq!("10,50".parse::<MoneyCents>().unwrap().cents(), 1050);
        assert_eq!("-0.01".parse::<MoneyCents>().unwrap().cents(), -1);
        assert_eq!("+1.00".parse::<MoneyCents>().unwrap().cents(), 100);
        assert_eq!("  2.30 ".parse::<MoneyCents>().unwrap().cents(), 230);
    }

    #[test]
    fn parse_rejects_more_than_two_decimals() {
        assert!("12.345".parse::<MoneyCents>().is_err());
        assert!("0.001".parse::<MoneyCents>().is_err());
        assert!("".parse::<MoneyCents>().is_err());
        assert!("1.2.3".parse::<MoneyCents>().is_err());
    }

    #[test]
    fn checked_helpers_report_overflow() {
        let max = MoneyCents::new(i64::MAX);
        assert_eq!(max.checked_add(MoneyCents::new(1)), None);
        assert_eq!(MoneyCents::new(i64::MIN).checked_neg(), None);
        assert_eq!(
            MoneyCents::checked_sum(cents(&[i64::MAX, i64::MAX, 3])),
            None
        );
        assert_eq!(
            MoneyCents::checked_sum(cents(&[1_00, 2_00, -50])),
            Some(MoneyCents::new(2_50))
        );
        assert_eq!(MoneyCents::checked_sum(Vec::new()), Some(MoneyCents::ZERO));
    }

    #[test]
    fn split_even_puts_remainder_on_last_share() {
        assert_eq!(
            MoneyCents::new(100_00).split_even(3).unwrap(),
            cents(&[33_33, 33_33, 33_34])
        );
        assert_eq!(
            MoneyCents::new(90_00).split_even(3).unwrap(),
            cents(&[30_00, 30_00, 30_00])
        );
        // 2/3 = 0.666.. rounds up, the last share absorbs the negative remainder.
        assert_eq!(
            MoneyCents::new(200).split_even(3).unwrap(),
            cents(&[67, 67, 66])
        );
        assert_eq!(MoneyCents::new(1).split_even(3).unwrap(), cents(&[0, 0, 1]));
    }

    #[test]
    fn split_even_rounds_half_away_from_zero() {
        // 0.05 / 2 = 0.025 -> 0.03, remainder 0.02.
        assert_eq!(MoneyCents::new(5).split_even(2).unwrap(), cents(&[3, 2]));
    }

    #[test]
    fn split_even_sums_to_amount() {
        for amount in [1, 7, 99, 100, 1001, 123_457] {
            for parts in 1..=7 {
                if let Ok(shares) = MoneyCents::new(amount).split_even(parts) {
                    assert_eq!(shares.iter().sum::<MoneyCents>(), MoneyCents::new(amount));
                    assert!(shares.iter().all(|share| !share.is_negative()));
                }
            }
        }
    }

    #[test]
    fn split_even_rejects_degenerate_inputs() {
        assert!(matches!(
            MoneyCents::new(100).split_even(0),
            Err(EngineError::InvalidSplit(_))
        ));
        // 0.02 / 4 = 0.005 -> 0.01 each, which would leave -0.01 for the last one.
        assert!(matches!(
            MoneyCents::new(2).split_even(4),
            Err(EngineError::InvalidSplit(_))
        ));
    }
}
