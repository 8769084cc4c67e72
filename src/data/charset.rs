use std::collections::HashMap;
use std::convert::TryFrom;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrainError};

/// Digits, lowercase, uppercase: 62 classes.
pub const DEFAULT_CHARSET: &str = "0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Ordered symbol set mapping characters to class indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Charset {
    symbols: Vec<char>,
    index: HashMap<char, usize>,
}

impl Charset {
    /// Fails on an empty string or a repeated symbol.
    pub fn new(symbols: &str) -> Result<Charset> {
        let symbols: Vec<char> = symbols.chars().collect();
        if symbols.len() < 2 {
            return Err(TrainError::InvalidConfig("charset needs at least two symbols".into()));
        }
        let mut index = HashMap::with_capacity(symbols.len());
        for (i, &ch) in symbols.iter().enumerate() {
            if index.insert(ch, i).is_some() {
                return Err(TrainError::InvalidConfig(format!("charset repeats '{}'", ch)));
            }
        }
        Ok(Charset { symbols, index })
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn index_of(&self, ch: char) -> Option<usize> {
        self.index.get(&ch).copied()
    }

    pub fn symbol(&self, class: usize) -> Option<char> {
        self.symbols.get(class).copied()
    }

    pub fn encode(&self, text: &str) -> Result<Vec<usize>> {
        text.chars()
            .map(|ch| {
                self.index_of(ch)
                    .ok_or_else(|| TrainError::UnknownCharacter { ch, text: text.to_string() })
            })
            .collect()
    }

    /// Out-of-range classes decode as `?`.
    pub fn decode(&self, classes: &[usize]) -> String {
        classes.iter().map(|&c| self.symbol(c).unwrap_or('?')).collect()
    }

    pub fn as_string(&self) -> String {
        self.symbols.iter().collect()
    }
}

impl Default for Charset {
    fn default() -> Self {
        let symbols: Vec<char> = DEFAULT_CHARSET.chars().collect();
        let index = symbols.iter().enumerate().map(|(i, &c)| (c, i)).collect();
        Charset { symbols, index }
    }
}

impl TryFrom<String> for Charset {
    type Error = TrainError;

    fn try_from(value: String) -> Result<Self> {
        Charset::new(&value)
    }
}

impl From<Charset> for String {
    fn from(charset: Charset) -> String {
        charset.as_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_has_62_classes() {
        let cs = Charset::default();
        assert_eq!(cs.len(), 62);
        assert_eq!(cs.index_of('a'), Some(10));
        assert_eq!(cs.index_of('Z'), Some(61));
    }

    #[test]
    fn encode_and_decode() {
        let cs = Charset::default();
        let classes = cs.encode("a1B9").unwrap();
        assert_eq!(classes, vec![10, 1, 37, 9]);
        assert_eq!(cs.decode(&classes), "a1B9");
        assert_eq!(cs.decode(&[0, 99]), "0?");
    }

    #[test]
    fn unknown_character_is_reported() {
        let err = Charset::default().encode("ab-c").unwrap_err();
        assert!(matches!(err, TrainError::UnknownCharacter { ch: '-', .. }));
    }

    #[test]
    fn duplicates_are_rejected() {
        assert!(Charset::new("abca").is_err());
        assert!(Charset::new("a").is_err());
    }

    #[test]
    fn serializes_as_plain_string() {
        let cs = Charset::new("xyz").unwrap();
        let json = serde_json::to_string(&cs).unwrap();
        assert_eq!(json, "\"xyz\"");
        let back: Charset = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cs);
    }
}
