/*!
 * Command pattern compiler.
 *
 * Instrument manuals write SCPI keywords in mixed case: the capital letters
 * are the mandatory short form and the trailing lowercase letters an optional
 * long-form suffix, e.g. `VOLTage` accepts `VOLT` and `VOLTAGE`. A template
 * written this way is compiled into an anchored, case-insensitive regular
 * expression.
 *
 * ```
 * use mockvisa_core::pattern::CommandPattern;
 *
 * let pattern = CommandPattern::scpi("VOLTage:CHANnel(.*) (.*)").unwrap();
 * assert_eq!(pattern.captures("voltage:chan1 2.3").unwrap(), vec!["1", "2.3"]);
 * assert_eq!(pattern.captures("VOLT:CHANNEL1 2.3").unwrap(), vec!["1", "2.3"]);
 * assert!(pattern.captures("VOLTA:CHAN1 2.3").is_none());
 * ```
 */
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::error::SchemaError;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<[A-Za-z_][A-Za-z0-9_]*>").expect("Invalid placeholder regex")
});

static ABBREVIATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<short>[A-Z])(?P<long>[a-z]+)").expect("Invalid abbreviation regex")
});

/// An immutable compiled command matcher
#[derive(Clone)]
pub struct CommandPattern {
    template: String,
    source: String,
    raw: bool,
    regex: Regex,
}

impl CommandPattern {
    /// Compile a template.
    ///
    /// With `raw` set the template is taken verbatim as the match pattern;
    /// otherwise `<name>` placeholders become capture groups and every
    /// capital-plus-lowercase run becomes a mandatory capital with an
    /// optional lowercase suffix.
    pub fn compile(template: &str, raw: bool) -> Result<Self, SchemaError> {
        let source = if raw {
            template.to_string()
        } else {
            expand_template(template)
        };
        Self::from_parts(template.to_string(), source, raw)
    }

    /// Compile an abbreviation-expanded SCPI template
    pub fn scpi(template: &str) -> Result<Self, SchemaError> {
        Self::compile(template, false)
    }

    /// Use a regular expression verbatim
    pub fn raw(pattern: &str) -> Result<Self, SchemaError> {
        Self::compile(pattern, true)
    }

    fn from_parts(template: String, source: String, raw: bool) -> Result<Self, SchemaError> {
        let regex = RegexBuilder::new(&format!("^(?:{})$", source))
            .case_insensitive(true)
            .build()
            .map_err(|e| SchemaError::InvalidPattern {
                template: template.clone(),
                reason: e.to_string(),
            })?;

        Ok(Self {
            template,
            source,
            raw,
            regex,
        })
    }

    /// Pattern matching `self` followed by `other`
    pub fn concat(&self, other: &CommandPattern) -> Result<Self, SchemaError> {
        Self::from_parts(
            format!("{}{}", self.template, other.template),
            format!("{}{}", self.source, other.source),
            self.raw || other.raw,
        )
    }

    /// The template this pattern was declared with
    pub fn template(&self) -> &str {
        &self.template
    }

    /// The compiled, unanchored regular expression source
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Anchored form used for matching
    pub fn anchored(&self) -> &str {
        self.regex.as_str()
    }

    /// Whether the template was taken verbatim
    pub fn is_raw(&self) -> bool {
        self.raw
    }

    /// Number of capture groups, i.e. arguments handed to the handler
    pub fn capture_count(&self) -> usize {
        self.regex.captures_len() - 1
    }

    /// Whether the whole command matches
    pub fn is_match(&self, command: &str) -> bool {
        self.regex.is_match(command)
    }

    /// Captured argument strings, `None` if the command does not match.
    ///
    /// Optional groups that did not participate come back empty.
    pub fn captures(&self, command: &str) -> Option<Vec<String>> {
        let caps = self.regex.captures(command)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|group| group.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

fn expand_template(template: &str) -> String {
    let with_groups = PLACEHOLDER.replace_all(template, "(.*)");
    ABBREVIATION
        .replace_all(&with_groups, "${short}(?:${long})?")
        .into_owned()
}

impl PartialEq for CommandPattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for CommandPattern {}

impl Hash for CommandPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.source.hash(state);
    }
}

impl fmt::Debug for CommandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandPattern")
            .field("template", &self.template)
            .field("source", &self.source)
            .field("raw", &self.raw)
            .finish()
    }
}

impl fmt::Display for CommandPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.template)
    }
}
