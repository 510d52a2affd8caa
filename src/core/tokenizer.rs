//! Splits a command line into an `ArgumentVector`.
//!
//! Tokens are separated by runs of whitespace. Quoting and escaping are not
//! supported: `echo 'a b'` yields the three tokens `echo`, `'a` and `b'`.

use std::fmt;
use std::ops::Index;
use std::slice;

use crate::errors::{Error, Result};

/// Largest number of tokens accepted on one command line by default.
pub const DEFAULT_MAX_ARGUMENTS: usize = 64;

/// Ordered, immutable sequence of command tokens. The first token is the
/// program name.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct ArgumentVector(Vec<String>);

impl ArgumentVector {
    pub fn program(&self) -> Option<&str> {
        self.0.first().map(String::as_str)
    }

    /// All tokens after the program name.
    pub fn args(&self) -> &[String] {
        self.0.get(1..).unwrap_or(&[])
    }

    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> slice::Iter<'_, String> {
        self.0.iter()
    }
}

impl Index<usize> for ArgumentVector {
    type Output = str;

    fn index(&self, index: usize) -> &str {
        &self.0[index]
    }
}

impl<'a> IntoIterator for &'a ArgumentVector {
    type Item = &'a String;
    type IntoIter = slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ArgumentVector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.join(" "))
    }
}

#[derive(Clone, Copy, Debug)]
pub struct Tokenizer {
    max_arguments: usize,
}

impl Tokenizer {
    pub fn with_max_arguments(max_arguments: usize) -> Self {
        Self { max_arguments }
    }

    pub fn max_arguments(&self) -> usize {
        self.max_arguments
    }

    /// Splits `line` on whitespace.
    ///
    /// Fails with `TooManyArguments` instead of truncating when the line
    /// holds more than `max_arguments` tokens.
    pub fn tokenize(&self, line: &str) -> Result<ArgumentVector> {
        let mut tokens = Vec::new();
        for (i, token) in line.split_whitespace().enumerate() {
            if i == self.max_arguments {
                let found = i + line.split_whitespace().skip(i).count();
                return Err(Error::too_many_arguments(self.max_arguments, found));
            }
            tokens.push(token.to_string());
        }

        Ok(ArgumentVector(tokens))
    }
}

impl Default for Tokenizer {
    fn default() -> Self {
        Self::with_max_arguments(DEFAULT_MAX_ARGUMENTS)
    }
}

/// Tokenizes `line` with the default argument limit.
pub fn tokenize(line: &str) -> Result<ArgumentVector> {
    Tokenizer::default().tokenize(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ErrorKind;

    fn words(argv: &ArgumentVector) -> Vec<&str> {
        argv.iter().map(String::as_str).collect()
    }

    #[test]
    fn test_simple_command() {
        let argv = tokenize("ls -l ..").unwrap();
        assert_eq!(words(&argv), vec!["ls", "-l", ".."]);
        assert_eq!(argv.program(), Some("ls"));
        assert_eq!(argv.args(), &["-l".to_string(), "..".to_string()]);
    }

    #[test]
    fn test_empty_line() {
        let argv = tokenize("").unwrap();
        assert!(argv.is_empty());
        assert_eq!(argv.program(), None);
        assert!(argv.args().is_empty());

        assert!(tokenize(" \t \n").unwrap().is_empty());
    }

    #[test]
    fn test_whitespace_collapses() {
        let argv = tokenize("  a   b ").unwrap();
        assert_eq!(words(&argv), vec!["a", "b"]);

        let argv = tokenize("a\t\tb\nc").unwrap();
        assert_eq!(words(&argv), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_quotes_are_not_special() {
        let argv = tokenize("echo 'a b'").unwrap();
        assert_eq!(words(&argv), vec!["echo", "'a", "b'"]);
    }

    #[test]
    fn test_too_many_arguments() {
        let tokenizer = Tokenizer::with_max_arguments(2);
        assert_eq!(tokenizer.tokenize("a b").unwrap().len(), 2);

        let err = tokenizer.tokenize("a b c d").unwrap_err();
        assert_eq!(
            *err.kind(),
            ErrorKind::TooManyArguments { limit: 2, found: 4 }
        );
    }

    #[test]
    fn test_default_limit() {
        let line = vec!["x"; DEFAULT_MAX_ARGUMENTS].join(" ");
        assert_eq!(tokenize(&line).unwrap().len(), DEFAULT_MAX_ARGUMENTS);

        let line = format!("{} y", line);
        assert!(tokenize(&line).is_err());
    }

    #[test]
    fn test_display() {
        let argv = tokenize(" echo   hello  world ").unwrap();
        assert_eq!(argv.to_string(), "echo hello world");
        assert_eq!(&argv[1], "hello");
    }
}
