/*!
 * Resource names of simulated instruments.
 *
 * Simulated instruments live on the `MOCK` interface and are addressed as
 * `MOCK[board]::name::INSTR`, e.g. `MOCK0::mock1::INSTR`.
 */
use std::fmt;
use std::str::FromStr;

use regex::RegexBuilder;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VisaError};

/// Interface type reported for `MOCK` resources
pub const MOCK_INTERFACE: u16 = 1000;

/// Interface keyword
pub const MOCK_KEYWORD: &str = "MOCK";

/// The only resource class simulated
pub const INSTR_CLASS: &str = "INSTR";

/// Default query of `list_resources`
pub const DEFAULT_QUERY: &str = "?*::INSTR";

/// A parsed `MOCK[board]::name::INSTR` name
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceName {
    board: u32,
    name: String,
}

impl ResourceName {
    /// Name on board `board`
    pub fn new<S: Into<String>>(board: u32, name: S) -> Self {
        Self {
            board,
            name: name.into(),
        }
    }

    /// Board number
    pub fn board(&self) -> u32 {
        self.board
    }

    /// Instrument name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Resource class, always `INSTR`
    pub fn resource_class(&self) -> &'static str {
        INSTR_CLASS
    }

    /// Interface type constant
    pub fn interface_type(&self) -> u16 {
        MOCK_INTERFACE
    }

    /// Whether this name satisfies a VISA resource expression
    pub fn matches_query(&self, query: &str) -> Result<bool> {
        matches_query(&self.to_string(), query)
    }
}

impl fmt::Display for ResourceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}::{}::{}", MOCK_KEYWORD, self.board, self.name, INSTR_CLASS)
    }
}

impl FromStr for ResourceName {
    type Err = VisaError;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || VisaError::invalid_resource_name(s);

        let parts: Vec<&str> = s.split("::").collect();
        let [interface, name, class] = parts.as_slice() else {
            return Err(invalid());
        };

        let keyword = interface.get(..MOCK_KEYWORD.len()).ok_or_else(invalid)?;
        if !keyword.eq_ignore_ascii_case(MOCK_KEYWORD) {
            return Err(invalid());
        }
        let board = match &interface[MOCK_KEYWORD.len()..] {
            "" => 0,
            digits => digits.parse().map_err(|_| invalid())?,
        };

        if name.is_empty() || !class.eq_ignore_ascii_case(INSTR_CLASS) {
            return Err(invalid());
        }

        Ok(Self::new(board, *name))
    }
}

/// Whether `name` satisfies a VISA resource expression.
///
/// `?` matches any single character and `*` repeats the previous token;
/// bracketed character lists pass through. Matching is case-insensitive and
/// covers the whole name.
pub fn matches_query(name: &str, query: &str) -> Result<bool> {
    let mut pattern = String::with_capacity(query.len() * 2);
    let mut in_class = false;
    for c in query.chars() {
        match c {
            '[' if !in_class => {
                in_class = true;
                pattern.push(c);
            }
            ']' if in_class => {
                in_class = false;
                pattern.push(c);
            }
            _ if in_class => pattern.push(c),
            '?' => pattern.push('.'),
            '*' => pattern.push('*'),
            other => pattern.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }

    let regex = RegexBuilder::new(&format!("^(?:{})$", pattern))
        .case_insensitive(true)
        .build()
        .map_err(|e| VisaError::invalid_resource_name(format!("{} ({})", query, e)))?;
    Ok(regex.is_match(name))
}
