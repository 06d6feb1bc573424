//! Storage options mini-language (spec §4.5): a comma-separated list
//! of `key='value'` pairs, e.g. `"hash-type='memory',contexts='yes'"`.

use std::collections::BTreeMap;
use std::fmt;

use super::StorageError;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StorageOptions(BTreeMap<String, String>);

impl StorageOptions {
    pub fn new() -> Self {
        StorageOptions(BTreeMap::new())
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        match self.get(key) {
            Some("yes") | Some("true") | Some("1") => true,
            Some("no") | Some("false") | Some("0") => false,
            _ => default,
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.0.insert(key.into(), value.into());
        self
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    /// Parse `"key='value',key2='value2'"`. Whitespace around
    /// separators is ignored; values may contain commas as long as
    /// they are inside the surrounding quotes.
    pub fn parse(input: &str) -> Result<Self, StorageError> {
        let mut opts = StorageOptions::new();
        let input = input.trim();
        if input.is_empty() {
            return Ok(opts);
        }

        let mut rest = input;
        while !rest.is_empty() {
            let eq = rest
                .find('=')
                .ok_or_else(|| StorageError::InvalidOptions(format!("missing '=' in {rest:?}")))?;
            let key = rest[..eq].trim().to_string();
            rest = rest[eq + 1..].trim_start();

            let quote = rest
                .chars()
                .next()
                .filter(|c| *c == '\'' || *c == '"')
                .ok_or_else(|| {
                    StorageError::InvalidOptions(format!("expected quoted value after '{key}='"))
                })?;
            let close = rest[1..]
                .find(quote)
                .ok_or_else(|| StorageError::InvalidOptions(format!("unterminated value for {key}")))?;
            let value = rest[1..1 + close].to_string();
            opts.set(key, value);

            rest = rest[1 + close + 1..].trim_start();
            if let Some(stripped) = rest.strip_prefix(',') {
                rest = stripped.trim_start();
            } else if !rest.is_empty() {
                return Err(StorageError::InvalidOptions(format!(
                    "expected ',' or end of input, found {rest:?}"
                )));
            }
        }
        Ok(opts)
    }
}

impl fmt::Display for StorageOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (k, v) in self.iter() {
            if !first {
                write!(f, ",")?;
            }
            write!(f, "{k}='{v}'")?;
            first = false;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_multiple_quoted_pairs() {
        let opts = StorageOptions::parse("hash-type='memory',contexts='yes'").unwrap();
        assert_eq!(opts.get("hash-type"), Some("memory"));
        assert!(opts.get_bool("contexts", false));
    }

    #[test]
    fn empty_input_parses_to_empty_options() {
        assert_eq!(StorageOptions::parse("").unwrap(), StorageOptions::new());
    }

    #[test]
    fn missing_equals_is_an_error() {
        assert!(StorageOptions::parse("hash-type").is_err());
    }

    #[test]
    fn round_trips_through_display_and_parse() {
        let mut opts = StorageOptions::new();
        opts.set("a", "1").set("b", "two");
        let text = opts.to_string();
        assert_eq!(StorageOptions::parse(&text).unwrap(), opts);
    }
}
