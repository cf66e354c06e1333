//! Subject and speaker vocabulary.

use serde::{Deserialize, Serialize};

/// A tutoring subject, the routed-to destination of a session.
///
/// The orchestrator is the classifier that greets the student and routes
/// questions; the other three are specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Subject {
    /// The routing classifier. Greets the student and hands off.
    Orchestrator,
    /// Mathematics specialist (pipeline path).
    Math,
    /// History specialist (pipeline path).
    History,
    /// English specialist (audio-native realtime path).
    English,
}

impl Subject {
    /// Returns the canonical lowercase label for this subject.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Orchestrator => "orchestrator",
            Self::Math => "math",
            Self::History => "history",
            Self::English => "english",
        }
    }
}

impl std::fmt::Display for Subject {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Subject {
    type Err = ParseSubjectError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "orchestrator" => Ok(Self::Orchestrator),
            "math" => Ok(Self::Math),
            "history" => Ok(Self::History),
            "english" => Ok(Self::English),
            _ => Err(ParseSubjectError(s.to_string())),
        }
    }
}

/// Error returned when parsing an unknown subject label.
#[derive(Debug, Clone)]
pub struct ParseSubjectError(pub String);

impl std::fmt::Display for ParseSubjectError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown subject: {}", self.0)
    }
}

impl std::error::Error for ParseSubjectError {}

/// Who produced a transcript item.
///
/// Derived from the session's `speaking_agent` for assistant items and fixed
/// to `Student` for user items.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Speaker {
    Student,
    Orchestrator,
    Math,
    History,
    English,
    Teacher,
}

impl Speaker {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Orchestrator => "orchestrator",
            Self::Math => "math",
            Self::History => "history",
            Self::English => "english",
            Self::Teacher => "teacher",
        }
    }
}

impl From<Subject> for Speaker {
    fn from(subject: Subject) -> Self {
        match subject {
            Subject::Orchestrator => Self::Orchestrator,
            Subject::Math => Self::Math,
            Subject::History => Self::History,
            Subject::English => Self::English,
        }
    }
}

impl std::fmt::Display for Speaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Role of a committed conversation item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConversationRole {
    User,
    Assistant,
}

impl ConversationRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}
