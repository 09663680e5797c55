use serde::{Deserialize, Serialize};

/// Which account balance a symbol settles against
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// Settles in the account's fiat `balance`
    Fiat,
    /// Settles in the account's `bitcoin` balance
    AltCoin,
}

impl std::fmt::Display for Settlement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Settlement::Fiat => write!(f, "fiat"),
            Settlement::AltCoin => write!(f, "bitcoin"),
        }
    }
}
