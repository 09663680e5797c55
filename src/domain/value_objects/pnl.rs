use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Realized profit and loss of a closing trade
///
/// Unlike balances, PnL can be negative to represent losses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PnL(Decimal);

impl PnL {
    pub fn new(value: Decimal) -> Self {
        PnL(value)
    }

    /// Get the raw value
    pub fn value(&self) -> Decimal {
        self.0
    }

    /// Check if this represents a profit (positive value)
    pub fn is_profit(&self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    /// Check if this represents a loss (negative value)
    pub fn is_loss(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn zero() -> Self {
        PnL(Decimal::ZERO)
    }
}

impl std::fmt::Display for PnL {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_loss() {
            write!(f, "-{:.2}", self.0.abs())
        } else {
            write!(f, "+{:.2}", self.0)
        }
    }
}

impl std::ops::Add for PnL {
    type Output = Self;

    fn add(self, other: Self) -> Self {
        PnL(self.0 + other.0)
    }
}

impl std::iter::Sum for PnL {
    fn sum<I: Iterator<Item = PnL>>(iter: I) -> Self {
        iter.fold(PnL::zero(), |acc, pnl| acc + pnl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_pnl_profit() {
        let pnl = PnL::new(dec!(1000));
        assert_eq!(pnl.value(), dec!(1000));
        assert!(pnl.is_profit());
        assert!(!pnl.is_loss());
    }

    #[test]
    fn test_pnl_loss() {
        let pnl = PnL::new(dec!(-500));
        assert!(!pnl.is_profit());
        assert!(pnl.is_loss());
    }

    #[test]
    fn test_pnl_zero() {
        let pnl = PnL::zero();
        assert!(!pnl.is_profit());
        assert!(!pnl.is_loss());
    }

    #[test]
    fn test_pnl_sum() {
        let total: PnL = vec![PnL::new(dec!(1000)), PnL::new(dec!(-300))]
            .into_iter()
            .sum();
        assert_eq!(total.value(), dec!(700));
    }

    #[test]
    fn test_pnl_display() {
        assert_eq!(format!("{}", PnL::new(dec!(1234.56))), "+1234.56");
        assert_eq!(format!("{}", PnL::new(dec!(-789.12))), "-789.12");
    }
}
