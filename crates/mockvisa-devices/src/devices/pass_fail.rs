/*!
 * Instrument exercising raw patterns next to SCPI templates.
 *
 * `:PASSfail` and the raw `:pass(?-i:FAIL)` overlap on `:passFAIL`, which is
 * therefore ambiguous. The raw case-sensitive groups show that a raw
 * pattern can opt out of the case-insensitive default.
 */
use std::fmt;

use mockvisa_core::dispatch::{CommandSet, Commands};
use mockvisa_core::error::Result as CoreResult;

use crate::instrument::{Instrument, InstrumentCore};

/// Which binding answered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// `:PASSfail`
    Pass,
    /// `:pass` followed by upper-case `FAIL`
    Fail,
    /// Upper-case `:CASETEST` and anything after it
    Upper,
    /// Exactly lower-case `:casetest`
    Lower,
    /// `okay->` and anything after it
    Okay,
    /// Exactly `<-not okay->`
    NotOkay,
}

impl Verdict {
    /// Reply text
    pub fn as_str(&self) -> &'static str {
        match self {
            Verdict::Pass => "PASS",
            Verdict::Fail => "FAIL",
            Verdict::Upper => "UPPER",
            Verdict::Lower => "LOWER",
            Verdict::Okay => "OKAY",
            Verdict::NotOkay => "NOT_OKAY",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pattern-matching probe
#[derive(Debug, Default)]
pub struct PassFail {
    core: InstrumentCore,
}

impl PassFail {
    /// New probe
    pub fn new() -> Self {
        Self::default()
    }
}

fn answer(verdict: Verdict) -> impl Fn(&PassFail) -> &'static str + Send + Sync + 'static {
    move |_| verdict.as_str()
}

impl Commands for PassFail {
    fn commands(set: &mut CommandSet<Self>) -> CoreResult<()> {
        set.scpi(":PASSfail", answer(Verdict::Pass))?
            .raw(":pass(?-i:FAIL)", answer(Verdict::Fail))?
            .raw("(?-i::CASETEST).*", answer(Verdict::Upper))?
            .raw("(?-i::casetest)", answer(Verdict::Lower))?
            .raw("okay->.*", answer(Verdict::Okay))?
            .raw("<-not okay->", answer(Verdict::NotOkay))?;
        Ok(())
    }
}

impl Instrument for PassFail {
    fn core(&self) -> &InstrumentCore {
        &self.core
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::VisaError;
    use crate::instrument::Device;
    use mockvisa_core::error::Error as CoreError;
    use mockvisa_core::types::Value;

    fn reply(probe: &PassFail, command: &str) -> std::result::Result<String, VisaError> {
        probe.send(command).map(|value| value.to_string())
    }

    #[test]
    fn test_abbreviations_answer_pass() {
        let probe = PassFail::new();
        for command in [":PASSfail", ":PASS", ":pass", ":passfail"] {
            assert_eq!(reply(&probe, command).unwrap(), "PASS", "{}", command);
        }
    }

    #[test]
    fn test_overlap_is_ambiguous() {
        let probe = PassFail::new();
        let err = probe.send(":passFAIL").unwrap_err();
        match err.as_command() {
            Some(CoreError::AmbiguousCommand { patterns, .. }) => {
                assert_eq!(patterns.len(), 2);
                assert!(patterns.contains(&":PASSfail".to_string()));
            }
            other => panic!("expected ambiguity, got {:?}", other),
        }
    }

    #[test]
    fn test_case_sensitive_groups() {
        let probe = PassFail::new();
        assert_eq!(reply(&probe, ":CASETESTjunk").unwrap(), "UPPER");
        assert_eq!(reply(&probe, ":casetest").unwrap(), "LOWER");
        assert!(matches!(
            probe.send(":CaSeTeSt").unwrap_err().as_command(),
            Some(CoreError::UnknownCommand(_))
        ));
    }

    #[test]
    fn test_raw_patterns_match_whole_command() {
        let probe = PassFail::new();
        assert_eq!(probe.send("okay->").unwrap(), Value::from("OKAY"));
        assert_eq!(reply(&probe, "okay->a").unwrap(), "OKAY");
        assert_eq!(reply(&probe, "<-not okay->").unwrap(), "NOT_OKAY");
        for command in ["aokay->", "a<-not okay->", "<-not okay->a"] {
            assert!(probe.send(command).is_err(), "{}", command);
        }
    }
}
