use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Engine verdict for one submitted frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultState {
    /// Nothing recognizable in the frame.
    Empty,
    /// Something was found but the result is not yet trustworthy.
    Uncertain,
    /// One stage of a multi-stage scan completed (e.g. the front side).
    StageValid,
    /// Recognition finished; results are ready.
    Valid,
}

impl ResultState {
    pub fn as_str(self) -> &'static str {
        match self {
            ResultState::Empty => "empty",
            ResultState::Uncertain => "uncertain",
            ResultState::StageValid => "stage_valid",
            ResultState::Valid => "valid",
        }
    }

}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown result state '{0}'")]
pub struct UnknownResultState(pub String);

impl FromStr for ResultState {
    type Err = UnknownResultState;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "empty" => Ok(ResultState::Empty),
            "uncertain" => Ok(ResultState::Uncertain),
            "stage_valid" | "stagevalid" | "stage-valid" => Ok(ResultState::StageValid),
            "valid" => Ok(ResultState::Valid),
            _ => Err(UnknownResultState(s.to_owned())),
        }
    }
}

impl fmt::Display for ResultState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("empty", Some(ResultState::Empty))]
    #[case(" Uncertain ", Some(ResultState::Uncertain))]
    #[case("stage-valid", Some(ResultState::StageValid))]
    #[case("StageValid", Some(ResultState::StageValid))]
    #[case("valid", Some(ResultState::Valid))]
    #[case("done", None)]
    fn test_parse(#[case] input: &str, #[case] expected: Option<ResultState>) {
        assert_eq!(input.parse::<ResultState>().ok(), expected);
    }

    #[test]
    fn test_display_matches_parse() {
        for s in [
            ResultState::Empty,
            ResultState::Uncertain,
            ResultState::StageValid,
            ResultState::Valid,
        ] {
            assert_eq!(s.to_string().parse::<ResultState>(), Ok(s));
        }
    }

    #[test]
    fn test_unknown_state_names_the_input() {
        let err = "done".parse::<ResultState>().unwrap_err();
        assert_eq!(err.to_string(), "unknown result state 'done'");
    }

    #[test]
    fn test_serde_uses_display_names() {
        let json = serde_json::to_string(&ResultState::StageValid).unwrap();
        assert_eq!(json, r#""stage_valid""#);
        let back: ResultState = serde_json::from_str(r#""uncertain""#).unwrap();
        assert_eq!(back, ResultState::Uncertain);
    }
}
