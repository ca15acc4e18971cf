// src/coin.rs
//! Coin amounts and sorted coin sets.

use crate::math::Dec;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Serialize `u128` amounts as decimal strings so JSON consumers never lose precision.
mod amount_str {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(v: &u128, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_str(&v.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<u128, D::Error> {
        let s = String::deserialize(d)?;
        s.parse::<u128>().map_err(serde::de::Error::custom)
    }
}

/// Check a denomination: 3 to 128 chars, starts with a letter, then
/// alphanumerics or `/:._-`.
pub fn validate_denom(denom: &str) -> Result<(), String> {
    let len = denom.len();
    if !(3..=128).contains(&len) {
        return Err(format!("invalid denom length {}: {}", len, denom));
    }
    let mut chars = denom.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() => {}
        _ => return Err(format!("denom must start with a letter: {}", denom)),
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || "/:._-".contains(c)) {
        return Err(format!("invalid denom characters: {}", denom));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Coin {
    pub denom: String,
    #[serde(with = "amount_str")]
    pub amount: u128,
}

impl Coin {
    pub fn new(denom: impl Into<String>, amount: u128) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn zero(denom: impl Into<String>) -> Self {
        Self::new(denom, 0)
    }

    pub fn is_zero(&self) -> bool {
        self.amount == 0
    }

    pub fn validate(&self) -> Result<(), String> {
        validate_denom(&self.denom)
    }
}

impl fmt::Display for Coin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Set of coins sorted by denom with no zero entries.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Vec<Coin>", into = "Vec<Coin>")]
pub struct Coins(BTreeMap<String, u128>);

impl Coins {
    pub fn new() -> Self {
        Self(BTreeMap::new())
    }

    pub fn from_coin(coin: Coin) -> Self {
        let mut coins = Self::new();
        coins.add_coin(&coin);
        coins
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn amount_of(&self, denom: &str) -> u128 {
        self.0.get(denom).copied().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = Coin> + '_ {
        self.0.iter().map(|(d, a)| Coin::new(d.clone(), *a))
    }

    pub fn denoms(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Zero amounts are ignored. Panics on `u128` overflow.
    pub fn add_coin(&mut self, coin: &Coin) {
        if coin.is_zero() {
            return;
        }
        let entry = self.0.entry(coin.denom.clone()).or_insert(0);
        *entry = entry
            .checked_add(coin.amount)
            .unwrap_or_else(|| panic!("coin amount overflow for {}", coin.denom));
    }

    pub fn add(&self, other: &Coins) -> Coins {
        let mut out = self.clone();
        for coin in other.iter() {
            out.add_coin(&coin);
        }
        out
    }

    /// `None` if any denom would go negative.
    pub fn checked_sub(&self, other: &Coins) -> Option<Coins> {
        let mut out = self.clone();
        for (denom, amount) in other.0.iter() {
            let have = out.amount_of(denom);
            let left = have.checked_sub(*amount)?;
            if left == 0 {
                out.0.remove(denom);
            } else {
                out.0.insert(denom.clone(), left);
            }
        }
        Some(out)
    }

    /// True if every coin in `other` is covered by `self`.
    pub fn is_all_gte(&self, other: &Coins) -> bool {
        other
            .0
            .iter()
            .all(|(denom, amount)| self.amount_of(denom) >= *amount)
    }

    pub fn validate(&self) -> Result<(), String> {
        for denom in self.0.keys() {
            validate_denom(denom)?;
        }
        Ok(())
    }
}

impl From<Vec<Coin>> for Coins {
    fn from(v: Vec<Coin>) -> Self {
        let mut coins = Coins::new();
        for c in v.iter() {
            coins.add_coin(c);
        }
        coins
    }
}

impl From<Coins> for Vec<Coin> {
    fn from(c: Coins) -> Self {
        c.iter().collect()
    }
}

impl FromIterator<Coin> for Coins {
    fn from_iter<I: IntoIterator<Item = Coin>>(iter: I) -> Self {
        let mut coins = Coins::new();
        for c in iter {
            coins.add_coin(&c);
        }
        coins
    }
}

impl fmt::Display for Coins {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.iter().map(|c| c.to_string()).collect();
        write!(f, "{}", parts.join(","))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecCoin {
    pub denom: String,
    pub amount: Dec,
}

impl DecCoin {
    pub fn new(denom: impl Into<String>, amount: Dec) -> Self {
        Self {
            denom: denom.into(),
            amount,
        }
    }

    pub fn is_zero(&self) -> bool {
        self.amount.is_zero()
    }
}

impl fmt::Display for DecCoin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.denom)
    }
}

/// Split each coin by `ratio`: the first set is the truncated ratio share,
/// the second is the remainder. Nothing is lost between the two.
pub fn split_coins(coins: &Coins, ratio: &Dec) -> (Coins, Coins) {
    let mut share = Coins::new();
    let mut rest = Coins::new();
    for coin in coins.iter() {
        let part = ratio
            .mul_u128(coin.amount)
            .truncate_u128()
            .unwrap_or(0)
            .min(coin.amount);
        share.add_coin(&Coin::new(coin.denom.clone(), part));
        rest.add_coin(&Coin::new(coin.denom, coin.amount - part));
    }
    (share, rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coins_sorted_and_zero_free() {
        let coins: Coins = vec![
            Coin::new("uatom", 5),
            Coin::new("stake", 10),
            Coin::new("zero", 0),
            Coin::new("stake", 1),
        ]
        .into();
        assert_eq!(coins.len(), 2);
        assert_eq!(coins.to_string(), "11stake,5uatom");
        assert_eq!(coins.amount_of("zero"), 0);
    }

    #[test]
    fn test_checked_sub() {
        let a: Coins = vec![Coin::new("stake", 10), Coin::new("uatom", 3)].into();
        let b: Coins = vec![Coin::new("stake", 10)].into();
        let left = a.checked_sub(&b).unwrap();
        assert_eq!(left.to_string(), "3uatom");
        assert!(b.checked_sub(&a).is_none());
    }

    #[test]
    fn test_is_all_gte() {
        let paid: Coins = vec![Coin::new("stake", 10), Coin::new("uatom", 3)].into();
        let need: Coins = vec![Coin::new("stake", 10)].into();
        assert!(paid.is_all_gte(&need));
        assert!(!need.is_all_gte(&paid));
        assert!(paid.is_all_gte(&Coins::new()));
    }

    #[test]
    fn test_json_shape() {
        let coins = Coins::from_coin(Coin::new("stake", 42));
        let json = serde_json::to_string(&coins).unwrap();
        assert_eq!(json, r#"[{"denom":"stake","amount":"42"}]"#);
        let back: Coins = serde_json::from_str(&json).unwrap();
        assert_eq!(back, coins);
    }

    #[test]
    fn test_split_coins() {
        let fees: Coins = vec![Coin::new("stake", 101), Coin::new("uatom", 1)].into();
        let (rewards, auth) = split_coins(&fees, &"0.5".parse().unwrap());
        assert_eq!(rewards.amount_of("stake"), 50);
        assert_eq!(auth.amount_of("stake"), 51);
        assert_eq!(rewards.amount_of("uatom"), 0);
        assert_eq!(auth.amount_of("uatom"), 1);
    }

    #[test]
    fn test_validate_denom() {
        assert!(validate_denom("stake").is_ok());
        assert!(validate_denom("ibc/27394FB092D2ECCD").is_ok());
        assert!(validate_denom("1abc").is_err());
        assert!(validate_denom("ab").is_err());
    }
}
