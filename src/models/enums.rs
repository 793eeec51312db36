use crate::db::DatabaseError;
use serde::{Deserialize, Serialize};

/// Macro to generate enum with as_str + std::str::FromStr pattern
macro_rules! str_enum {
    ($name:ident { $($variant:ident => $s:literal),+ $(,)? }) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $s),+
                }
            }
        }

        impl std::str::FromStr for $name {
            type Err = DatabaseError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($s => Ok(Self::$variant)),+,
                    _ => Err(DatabaseError::InvalidEnum {
                        field: stringify!($name).into(),
                        value: s.into(),
                    }),
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

// Declaration order is the canonical plan order; derived `Ord` relies on it.
str_enum!(SectionName {
    Medications => "Medications",
    WarningSigns => "Warning Signs",
    Mobility => "Mobility",
    Diet => "Diet",
    FollowUps => "Follow-Ups",
    TeachBack => "Teach-Back",
});

impl SectionName {
    pub const ALL: [SectionName; 6] = [
        SectionName::Medications,
        SectionName::WarningSigns,
        SectionName::Mobility,
        SectionName::Diet,
        SectionName::FollowUps,
        SectionName::TeachBack,
    ];

    /// Literal delimiter the generative service must emit, e.g. `===WARNING SIGNS===`.
    pub fn marker(&self) -> String {
        format!("==={}===", self.as_str().to_uppercase())
    }

    /// Case- and whitespace-insensitive match against the canonical names.
    /// Used for model-authored `target_section` values.
    pub fn from_lenient(raw: &str) -> Option<SectionName> {
        let wanted = raw.trim();
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(wanted))
    }
}

// Ordered GREEN < YELLOW < RED so `max()` yields the most critical tier.
str_enum!(Severity {
    Green => "GREEN",
    Yellow => "YELLOW",
    Red => "RED",
});

impl Severity {
    /// Case-insensitive parse of a model-authored severity label.
    pub fn from_lenient(raw: &str) -> Option<Severity> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "RED" => Some(Severity::Red),
            "YELLOW" => Some(Severity::Yellow),
            "GREEN" => Some(Severity::Green),
            _ => None,
        }
    }

    /// RED and YELLOW block QC clearance.
    pub fn blocks_clearance(&self) -> bool {
        matches!(self, Severity::Red | Severity::Yellow)
    }
}

str_enum!(Language {
    En => "EN",
    Es => "ES",
    Zh => "ZH",
});

impl Language {
    /// Human-readable target language embedded in prompts.
    pub fn display_name(&self) -> &'static str {
        match self {
            Language::En => "English",
            Language::Es => "Spanish (Español)",
            Language::Zh => "Chinese (中文)",
        }
    }
}

impl Default for Language {
    fn default() -> Self {
        Language::En
    }
}

str_enum!(ReadingLevel {
    Standard => "Standard",
    Simplified => "Simplified",
});

impl ReadingLevel {
    pub fn instruction(&self) -> &'static str {
        match self {
            ReadingLevel::Standard => {
                "Use clear medical terminology with explanations. Target 8th-10th grade reading level."
            }
            ReadingLevel::Simplified => {
                "Use very simple words and short sentences. Avoid medical jargon. Target 5th-6th grade reading level."
            }
        }
    }
}

impl Default for ReadingLevel {
    fn default() -> Self {
        ReadingLevel::Simplified
    }
}

str_enum!(WorkflowStatus {
    Draft => "Draft",
    Finalized => "Finalized",
});
