//! Stablecoin amounts with 6-decimal precision
//!
//! All on-chain amounts are fixed-point integers at the token's declared
//! precision. The stablecoin in this domain uses 6 decimals, so one unit of
//! `TokenAmount` is one micro-dollar. Values are unsigned: credit lines,
//! allowances and balances are never negative on the ledgers we talk to.

use crate::{NitroBridgeError, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::ops::{Add, Sub};
use std::str::FromStr;

/// Decimal precision of the bridged stablecoin
pub const USDC_DECIMALS: u8 = 6;

/// Raw units per whole token (10^6)
pub const USDC_MULTIPLIER: u128 = 1_000_000;

/// An amount of stablecoin in smallest units
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TokenAmount(pub u128);

impl TokenAmount {
    /// Zero amount
    pub const ZERO: TokenAmount = TokenAmount(0);

    /// Create from raw smallest units
    pub const fn from_raw(raw: u128) -> Self {
        Self(raw)
    }

    /// Create from a whole number of tokens
    pub fn from_whole(tokens: u64) -> Self {
        Self(tokens as u128 * USDC_MULTIPLIER)
    }

    /// Parse a human-readable decimal string such as `"100"` or `"0.25"`
    ///
    /// More than 6 fractional digits is rejected rather than truncated.
    pub fn from_human(s: &str) -> Result<Self> {
        let s = s.trim();
        if s.is_empty() {
            return Err(NitroBridgeError::invalid_input("amount", "empty amount"));
        }
        let (whole, frac) = match s.split_once('.') {
            Some((w, f)) => (w, f),
            None => (s, ""),
        };
        if frac.len() > USDC_DECIMALS as usize {
            return Err(NitroBridgeError::invalid_input(
                "amount",
                format!("at most {} decimal places allowed", USDC_DECIMALS),
            ));
        }
        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole
                .parse()
                .map_err(|_| NitroBridgeError::invalid_input("amount", format!("invalid amount '{}'", s)))?
        };
        let mut frac_padded = frac.to_string();
        while frac_padded.len() < USDC_DECIMALS as usize {
            frac_padded.push('0');
        }
        let frac: u128 = frac_padded
            .parse()
            .map_err(|_| NitroBridgeError::invalid_input("amount", format!("invalid amount '{}'", s)))?;

        whole
            .checked_mul(USDC_MULTIPLIER)
            .and_then(|w| w.checked_add(frac))
            .map(Self)
            .ok_or(NitroBridgeError::AmountOverflow)
    }

    /// Raw value in smallest units
    pub fn raw(&self) -> u128 {
        self.0
    }

    /// Human-readable decimal string (trailing zeros trimmed)
    pub fn to_human(&self) -> String {
        let whole = self.0 / USDC_MULTIPLIER;
        let frac = self.0 % USDC_MULTIPLIER;
        if frac == 0 {
            return whole.to_string();
        }
        let frac = format!("{:06}", frac);
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }

    /// Approximate floating value, for ratios and log lines only
    pub fn to_f64(&self) -> f64 {
        self.0 as f64 / USDC_MULTIPLIER as f64
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, other: Self) -> Result<Self> {
        self.0
            .checked_add(other.0)
            .map(Self)
            .ok_or(NitroBridgeError::AmountOverflow)
    }

    pub fn checked_sub(self, other: Self) -> Result<Self> {
        self.0
            .checked_sub(other.0)
            .map(Self)
            .ok_or(NitroBridgeError::AmountUnderflow)
    }

    pub fn saturating_sub(self, other: Self) -> Self {
        Self(self.0.saturating_sub(other.0))
    }

    /// `self * numerator / denominator`, rounding down
    pub fn mul_div(self, numerator: u128, denominator: u128) -> Result<Self> {
        if denominator == 0 {
            return Err(NitroBridgeError::DivisionByZero);
        }
        self.0
            .checked_mul(numerator)
            .map(|v| Self(v / denominator))
            .ok_or(NitroBridgeError::AmountOverflow)
    }

    /// `self / other` as a float; `None` when `other` is zero
    pub fn ratio_of(&self, other: TokenAmount) -> Option<f64> {
        if other.0 == 0 {
            None
        } else {
            Some(self.0 as f64 / other.0 as f64)
        }
    }

    /// Big-endian 32-byte encoding (ABI `uint256`)
    pub fn to_be_word(&self) -> [u8; 32] {
        let mut out = [0u8; 32];
        out[16..].copy_from_slice(&self.0.to_be_bytes());
        out
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} USDC", self.to_human())
    }
}

impl FromStr for TokenAmount {
    type Err = NitroBridgeError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_human(s.trim_end_matches("USDC").trim())
    }
}

impl Add for TokenAmount {
    type Output = TokenAmount;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_add(rhs.0))
    }
}

impl Sub for TokenAmount {
    type Output = TokenAmount;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0.saturating_sub(rhs.0))
    }
}

// Raw units are persisted as decimal strings; JSON numbers lose precision past 2^53.
impl Serialize for TokenAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Text(String),
            Number(u64),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => s.parse::<u128>().map(Self).map_err(serde::de::Error::custom),
            Raw::Number(n) => Ok(Self(n as u128)),
        }
    }
}
