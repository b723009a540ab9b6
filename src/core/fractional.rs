//! Fractional index keys for ordered collections
//!
//! Generates lexicographically comparable string keys strictly between two
//! existing keys, or at the open ends of a sequence, without renumbering
//! neighbours. Keys consist of a variable-length integer head and a
//! fractional tail over a configurable ordered character set.
//!
//! The head's first character alone determines the head length: positive
//! heads start at the neutral character and grow upward, negative heads
//! mirror below it. Crossing a head boundary on increment/decrement adjusts
//! both the first character and the digit count, which keeps full-key
//! comparison a plain string comparison.

use crate::core::error::FractionalError;
use rand::Rng;
use std::collections::HashMap;

/// Default ordered character set: base62, neutral at `'a'`
pub const BASE62: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

/// Result alias local to fractional key construction
pub type Result<T> = std::result::Result<T, FractionalError>;

/// A validated, ordered character set with a designated neutral character.
///
/// All charset preconditions are checked at construction time, so key
/// generation itself only fails on malformed inputs or exhausted ranges.
#[derive(Debug, Clone)]
pub struct Charset {
    chars: Vec<char>,
    index: HashMap<char, usize>,
    neutral: usize,
}

/// A key split into its head (first char + head digits) and fractional tail
#[derive(Debug, Clone, PartialEq, Eq)]
struct Key {
    first: usize,
    digits: Vec<usize>,
    frac: Vec<usize>,
}

impl Default for Charset {
    fn default() -> Self {
        Self::base62()
    }
}

impl Charset {
    /// Build a charset from an ordered string of characters and a neutral.
    ///
    /// Preconditions: strictly ascending and unique characters, length at
    /// least 7, and the neutral at least 3 positions from either end.
    pub fn new(chars: &str, neutral: char) -> Result<Self> {
        let chars: Vec<char> = chars.chars().collect();
        if chars.len() < 7 {
            return Err(FractionalError::InvalidCharset(format!(
                "need at least 7 characters, got {}",
                chars.len()
            )));
        }
        for pair in chars.windows(2) {
            if pair[0] >= pair[1] {
                return Err(FractionalError::InvalidCharset(format!(
                    "characters must be strictly ascending: '{}' before '{}'",
                    pair[0], pair[1]
                )));
            }
        }
        let index: HashMap<char, usize> = chars.iter().copied().zip(0..).collect();
        let neutral_idx = *index.get(&neutral).ok_or_else(|| {
            FractionalError::InvalidCharset(format!("neutral '{}' not in charset", neutral))
        })?;
        if neutral_idx < 3 || chars.len() - 1 - neutral_idx < 3 {
            return Err(FractionalError::InvalidCharset(
                "neutral must be at least 3 positions from both ends".to_string(),
            ));
        }
        Ok(Self { chars, index, neutral: neutral_idx })
    }

    /// The default base62 charset with `'a'` as the neutral character
    pub fn base62() -> Self {
        Self::new(BASE62, 'a').expect("default charset is valid")
    }

    /// Number of characters in the set
    pub fn len(&self) -> usize {
        self.chars.len()
    }

    /// True if the charset is empty (never, post-construction)
    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// The first key of a fresh sequence: neutral head, zero digit
    pub fn initial_key(&self) -> String {
        let mut s = String::new();
        s.push(self.chars[self.neutral]);
        s.push(self.chars[0]);
        s
    }

    /// Validate that `key` is well formed under this charset
    pub fn validate_key(&self, key: &str) -> Result<()> {
        self.parse(key).map(|_| ())
    }

    /// Generate a key strictly between `lower` and `upper`.
    ///
    /// `None` means an open end: the result extends past the present range
    /// by incrementing or decrementing the integer head.
    pub fn key_between(&self, lower: Option<&str>, upper: Option<&str>) -> Result<String> {
        if let (Some(a), Some(b)) = (lower, upper) {
            if a >= b {
                return Err(FractionalError::OrderViolation {
                    lower: a.to_string(),
                    upper: b.to_string(),
                });
            }
        }
        match (lower, upper) {
            (None, None) => Ok(self.initial_key()),
            (Some(a), None) => {
                let ka = self.parse(a)?;
                match self.increment_head(ka.first, &ka.digits) {
                    Ok((first, digits)) => Ok(self.render(first, &digits, &[])),
                    Err(FractionalError::RangeExhausted) => {
                        let frac = self.midpoint(&ka.frac, None);
                        Ok(self.render(ka.first, &ka.digits, &frac))
                    }
                    Err(e) => Err(e),
                }
            }
            (None, Some(b)) => {
                let kb = self.parse(b)?;
                if kb.first == 0 && kb.digits.iter().all(|d| *d == 0) {
                    if kb.frac.is_empty() {
                        return Err(FractionalError::RangeExhausted);
                    }
                    let frac = self.midpoint(&[], Some(&kb.frac));
                    return Ok(self.render(kb.first, &kb.digits, &frac));
                }
                if !kb.frac.is_empty() {
                    // The bare integer part sorts below any key with a tail
                    Ok(self.render(kb.first, &kb.digits, &[]))
                } else {
                    let (first, digits) = self.decrement_head(kb.first, &kb.digits)?;
                    Ok(self.render(first, &digits, &[]))
                }
            }
            (Some(a), Some(b)) => {
                let ka = self.parse(a)?;
                let kb = self.parse(b)?;
                if ka.first == kb.first && ka.digits == kb.digits {
                    let frac = self.midpoint(&ka.frac, Some(&kb.frac));
                    return Ok(self.render(ka.first, &ka.digits, &frac));
                }
                match self.increment_head(ka.first, &ka.digits) {
                    Ok((first, digits)) => {
                        let candidate = self.render(first, &digits, &[]);
                        if candidate.as_str() < b {
                            return Ok(candidate);
                        }
                    }
                    Err(FractionalError::RangeExhausted) => {}
                    Err(e) => return Err(e),
                }
                let frac = self.midpoint(&ka.frac, None);
                Ok(self.render(ka.first, &ka.digits, &frac))
            }
        }
    }

    /// Generate `n` keys strictly between `lower` and `upper`, strictly
    /// increasing and mutually distinct, by recursive midpoint splitting.
    pub fn n_keys_between(
        &self,
        lower: Option<&str>,
        upper: Option<&str>,
        n: usize,
    ) -> Result<Vec<String>> {
        if n == 0 {
            return Ok(Vec::new());
        }
        if n == 1 {
            return Ok(vec![self.key_between(lower, upper)?]);
        }
        match (lower, upper) {
            (_, None) => {
                let mut keys = Vec::with_capacity(n);
                let mut prev = self.key_between(lower, None)?;
                keys.push(prev.clone());
                for _ in 1..n {
                    prev = self.key_between(Some(&prev), None)?;
                    keys.push(prev.clone());
                }
                Ok(keys)
            }
            (None, Some(_)) => {
                let mut keys = Vec::with_capacity(n);
                let mut next = self.key_between(None, upper)?;
                keys.push(next.clone());
                for _ in 1..n {
                    next = self.key_between(None, Some(&next))?;
                    keys.push(next.clone());
                }
                keys.reverse();
                Ok(keys)
            }
            (Some(_), Some(_)) => {
                let mid = n / 2;
                let center = self.key_between(lower, upper)?;
                let mut keys = self.n_keys_between(lower, Some(&center), mid)?;
                keys.push(center.clone());
                keys.extend(self.n_keys_between(Some(&center), upper, n - mid - 1)?);
                Ok(keys)
            }
        }
    }

    /// Jittered variant of [`Charset::key_between`]: adds a random offset of
    /// up to `jitter` tail units to the generated key, padding the tail
    /// first when the gap to the upper neighbour is too small.
    pub fn key_between_jittered(
        &self,
        lower: Option<&str>,
        upper: Option<&str>,
        jitter: u64,
    ) -> Result<String> {
        self.key_between_jittered_with(lower, upper, jitter, &mut rand::rng())
    }

    /// Jittered key generation with an explicit random source
    pub fn key_between_jittered_with<R: Rng>(
        &self,
        lower: Option<&str>,
        upper: Option<&str>,
        jitter: u64,
        rng: &mut R,
    ) -> Result<String> {
        let base = self.key_between(lower, upper)?;
        if jitter == 0 {
            return Ok(base);
        }
        let key = self.parse(&base)?;

        // The fractional tail may grow freely unless the upper neighbour
        // shares our integer head; in that case its tail is the ceiling.
        let upper_frac: Option<Vec<usize>> = match upper {
            Some(b) => {
                let kb = self.parse(b)?;
                if kb.first == key.first && kb.digits == key.digits {
                    Some(kb.frac)
                } else {
                    None
                }
            }
            None => None,
        };

        let cap = jitter as u128 + 1;
        let mut depth = key
            .frac
            .len()
            .max(upper_frac.as_ref().map_or(0, |f| f.len()))
            .max(1);
        let mut gap = self.frac_gap(&key.frac, upper_frac.as_deref(), depth, cap);
        while gap <= jitter as u128 {
            depth += 1;
            gap = self.frac_gap(&key.frac, upper_frac.as_deref(), depth, cap);
        }

        let offset = rng.random_range(0..gap.min(cap));
        let mut frac: Vec<usize> = (0..depth)
            .map(|i| key.frac.get(i).copied().unwrap_or(0))
            .collect();
        let base_n = self.chars.len() as u128;
        let mut carry = offset;
        for digit in frac.iter_mut().rev() {
            let t = *digit as u128 + carry % base_n;
            carry /= base_n;
            *digit = (t % base_n) as usize;
            carry += t / base_n;
        }
        debug_assert_eq!(carry, 0, "jitter offset must not overflow the tail");
        while frac.last() == Some(&0) {
            frac.pop();
        }
        Ok(self.render(key.first, &key.digits, &frac))
    }

    // ----- internals -----

    /// Digit count that follows a given first character
    fn head_digit_count(&self, first: usize) -> usize {
        if first >= self.neutral {
            first - self.neutral + 1
        } else {
            self.neutral - first
        }
    }

    fn parse(&self, key: &str) -> Result<Key> {
        let invalid = || FractionalError::InvalidKey(key.to_string());
        let chars: Vec<usize> = key
            .chars()
            .map(|c| self.index.get(&c).copied())
            .collect::<Option<_>>()
            .ok_or_else(invalid)?;
        if chars.is_empty() {
            return Err(invalid());
        }
        let first = chars[0];
        let digit_count = self.head_digit_count(first);
        if chars.len() < 1 + digit_count {
            return Err(invalid());
        }
        let digits = chars[1..1 + digit_count].to_vec();
        let frac = chars[1 + digit_count..].to_vec();
        if frac.last() == Some(&0) {
            return Err(invalid());
        }
        Ok(Key { first, digits, frac })
    }

    fn render(&self, first: usize, digits: &[usize], frac: &[usize]) -> String {
        std::iter::once(first)
            .chain(digits.iter().copied())
            .chain(frac.iter().copied())
            .map(|i| self.chars[i])
            .collect()
    }

    fn increment_head(&self, first: usize, digits: &[usize]) -> Result<(usize, Vec<usize>)> {
        let n = self.chars.len();
        let mut digits = digits.to_vec();
        for i in (0..digits.len()).rev() {
            if digits[i] + 1 == n {
                digits[i] = 0;
            } else {
                digits[i] += 1;
                return Ok((first, digits));
            }
        }
        if first == n - 1 {
            return Err(FractionalError::RangeExhausted);
        }
        let next = first + 1;
        Ok((next, vec![0; self.head_digit_count(next)]))
    }

    fn decrement_head(&self, first: usize, digits: &[usize]) -> Result<(usize, Vec<usize>)> {
        let n = self.chars.len();
        let mut digits = digits.to_vec();
        for i in (0..digits.len()).rev() {
            if digits[i] == 0 {
                digits[i] = n - 1;
            } else {
                digits[i] -= 1;
                return Ok((first, digits));
            }
        }
        if first == 0 {
            return Err(FractionalError::RangeExhausted);
        }
        let prev = first - 1;
        Ok((prev, vec![n - 1; self.head_digit_count(prev)]))
    }

    /// Fractional midpoint of `a` and `b` (`None` meaning 1.0), as canonical
    /// digit indices. Pads to equal length, averages in the charset base;
    /// consecutive values gain one extra tail digit from the remainder.
    fn midpoint(&self, a: &[usize], b: Option<&[usize]>) -> Vec<usize> {
        let n = self.chars.len();
        let len = a.len().max(b.map_or(0, <[usize]>::len));

        // sum = a + b, least significant digit first; 1.0 enters as an
        // all-max tail plus one trailing unit
        let mut sum = vec![0usize; len];
        let mut carry = usize::from(b.is_none());
        for i in (0..len).rev() {
            let da = a.get(i).copied().unwrap_or(0);
            let db = match b {
                Some(b) => b.get(i).copied().unwrap_or(0),
                None => n - 1,
            };
            let t = da + db + carry;
            sum[i] = t % n;
            carry = t / n;
        }

        // divide by two, pushing the final remainder into one extra digit
        let mut rem = carry;
        let mut out = vec![0usize; len];
        for i in 0..len {
            let cur = rem * n + sum[i];
            out[i] = cur / 2;
            rem = cur % 2;
        }
        if rem == 1 {
            out.push(n / 2);
        }
        while out.last() == Some(&0) {
            out.pop();
        }
        out
    }

    /// Difference `upper - lower` between two fractional tails read at
    /// `depth` digits, saturated at `cap`. `None` means an upper bound of
    /// exactly 1.0.
    fn frac_gap(&self, lower: &[usize], upper: Option<&[usize]>, depth: usize, cap: u128) -> u128 {
        let n = self.chars.len() as i128;
        let cap_i = cap as i128;
        let mut acc: i128 = 0;
        for i in 0..depth {
            let da = lower.get(i).copied().unwrap_or(0) as i128;
            let db = match upper {
                Some(b) => b.get(i).copied().unwrap_or(0) as i128,
                None => n - 1,
            };
            acc = acc * n + (db - da);
            if acc > cap_i {
                acc = cap_i;
            }
        }
        if upper.is_none() {
            acc += 1;
        }
        acc.clamp(0, cap_i) as u128
    }
}
