//! # Identifiers
//!
//! Typed row identifiers. The store assigns them; the core never invents one.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

macro_rules! row_id {
    ($(#[$meta:meta])* $name:ident, $label:literal) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl $name {
            pub fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl FromStr for $name {
            type Err = crate::error::ShopError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self).map_err(|_| {
                    crate::error::ShopError::InvalidInput(format!("invalid {}: {}", $label, s))
                })
            }
        }
    };
}

row_id!(
    /// Authenticated user, as supplied by the identity provider
    UserId,
    "user id"
);
row_id!(
    /// Catalog product
    ProductId,
    "product id"
);
row_id!(
    /// Order ledger row
    OrderId,
    "order id"
);
row_id!(
    /// Payment record row
    PaymentId,
    "payment id"
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ids() {
        assert_eq!("42".parse::<OrderId>().unwrap(), OrderId(42));
        assert_eq!(" 7 ".parse::<UserId>().unwrap(), UserId(7));
        assert!("abc".parse::<ProductId>().is_err());
    }

    #[test]
    fn test_ids_serialize_as_numbers() {
        let json = serde_json::to_string(&OrderId(12)).unwrap();
        assert_eq!(json, "12");
    }
}
