use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Currency amount with 2 decimal places, stored as minor units (cents).
///
/// Minor units are also what the payment gateway is charged in, so no
/// rounding ever happens between a booking's frozen price and the charge.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Money(i64);

impl Money {
    const SCALE: i64 = 100;

    pub const ZERO: Money = Money(0);

    pub const fn from_minor(minor: i64) -> Self {
        Money(minor)
    }

    pub const fn minor_units(self) -> i64 {
        self.0
    }

    /// Price of `quantity` seats at `self` each. `None` on overflow.
    pub fn times(self, quantity: u32) -> Option<Money> {
        self.0.checked_mul(i64::from(quantity)).map(Money)
    }

    pub fn checked_add(self, rhs: Money) -> Option<Money> {
        self.0.checked_add(rhs.0).map(Money)
    }

    pub fn is_negative(self) -> bool {
        self.0 < 0
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let whole = abs / Self::SCALE as u64;
        let frac = abs % Self::SCALE as u64;
        write!(f, "{sign}{whole}.{frac:02}")
    }
}

impl FromStr for Money {
    type Err = anyhow::Error;

    /// Parses `"10"`, `"10.5"` or `"10.50"`. More than two decimals is rejected.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (negative, digits) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };

        let (whole, frac) = digits.split_once('.').unwrap_or((digits, ""));
        let all_digits = |part: &str| part.bytes().all(|b| b.is_ascii_digit());
        if whole.is_empty() || frac.len() > 2 || !all_digits(whole) || !all_digits(frac) {
            anyhow::bail!("invalid money amount: {s:?}");
        }

        let whole: i64 = whole
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid money amount {s:?}: {e}"))?;
        let frac: i64 = match frac.len() {
            0 => 0,
            1 => frac.parse::<i64>()? * 10,
            _ => frac.parse::<i64>()?,
        };

        let minor = whole
            .checked_mul(Self::SCALE)
            .and_then(|w| w.checked_add(frac))
            .ok_or_else(|| anyhow::anyhow!("money amount out of range: {s:?}"))?;

        Ok(Money(if negative { -minor } else { minor }))
    }
}


#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_pads_cents() {
        assert_eq!(Money::from_minor(2_000).to_string(), "20.00");
        assert_eq!(Money::from_minor(1_050).to_string(), "10.50");
        assert_eq!(Money::from_minor(7).to_string(), "0.07");
        assert_eq!(Money::from_minor(-150).to_string(), "-1.50");
    }

    #[test]
    fn parses_decimal_strings() {
        assert_eq!("10.00".parse::<Money>().unwrap(), Money::from_minor(1_000));
        assert_eq!("10.5".parse::<Money>().unwrap(), Money::from_minor(1_050));
        assert_eq!("12".parse::<Money>().unwrap(), Money::from_minor(1_200));
        assert_eq!("-0.25".parse::<Money>().unwrap(), Money::from_minor(-25));
    }

    #[test]
    fn rejects_garbage() {
        assert!("".parse::<Money>().is_err());
        assert!("1.234".parse::<Money>().is_err());
        assert!("abc".parse::<Money>().is_err());
        assert!(".50".parse::<Money>().is_err());
    }

    #[test]
    fn rejects_repeated_signs() {
        assert!("--5".parse::<Money>().is_err());
        assert!("-+5".parse::<Money>().is_err());
        assert!("+5".parse::<Money>().is_err());
        assert!("-5.-1".parse::<Money>().is_err());
    }

    #[test]
    fn addition_detects_overflow() {
        assert_eq!(
            Money::from_minor(150).checked_add(Money::from_minor(-25)),
            Some(Money::from_minor(125))
        );
        assert_eq!(Money::from_minor(i64::MAX).checked_add(Money::from_minor(1)), None);
    }

    #[test]
    fn two_seats_at_ten_is_twenty() {
        let price: Money = "10.00".parse().unwrap();
        assert_eq!(price.times(2), Some("20.00".parse().unwrap()));
    }

    #[test]
    fn times_detects_overflow() {
        assert_eq!(Money::from_minor(i64::MAX).times(2), None);
    }

    proptest! {
        #[test]
        fn display_then_parse_is_identity(minor in -1_000_000_000i64..1_000_000_000i64) {
            let m = Money::from_minor(minor);
            prop_assert_eq!(m.to_string().parse::<Money>().unwrap(), m);
        }

        #[test]
        fn times_matches_repeated_addition(minor in 0i64..100_000, qty in 1u32..=10) {
            let unit = Money::from_minor(minor);
            let summed = (0..qty).fold(Money::ZERO, |acc, _| acc.checked_add(unit).unwrap());
            prop_assert_eq!(unit.times(qty), Some(summed));
        }
    }
}
