//! Lead data model: wizard steps, answer accumulation, the persisted record,
//! and phone validation.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FunnelError;

/// Status a freshly persisted lead is created with. Never mutated afterwards.
pub const LEAD_STATUS_NEW: &str = "new";

/// Quiz option lists, verbatim from the product copy. Only these strings are
/// ever offered, so free-text answers are impossible by construction.
pub const GRADE_OPTIONS: [&str; 4] = ["大三/大四", "已毕业工作", "大一/大二", "考研二战"];
pub const GPA_OPTIONS: [&str; 4] = [
    "GPA 3.5+ / 85分+",
    "GPA 3.0-3.5 / 80-85",
    "GPA 3.0以下",
    "暂不清楚",
];
pub const COUNTRY_OPTIONS: [&str; 5] =
    ["美国 US", "英国 UK", "中国香港 HK", "新加坡 SG", "澳洲 AU"];

/// The three quiz questions, in the order they are asked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WizardStep {
    Grade,
    Gpa,
    Country,
}

impl WizardStep {
    /// First question of the wizard.
    pub fn first() -> Self {
        Self::Grade
    }

    /// The step that follows this one, or `None` after the last question.
    pub fn next(&self) -> Option<Self> {
        match self {
            Self::Grade => Some(Self::Gpa),
            Self::Gpa => Some(Self::Country),
            Self::Country => None,
        }
    }

    /// The enumerated options offered at this step.
    pub fn options(&self) -> &'static [&'static str] {
        match self {
            Self::Grade => &GRADE_OPTIONS,
            Self::Gpa => &GPA_OPTIONS,
            Self::Country => &COUNTRY_OPTIONS,
        }
    }

    /// Question shown above the options.
    pub fn prompt(&self) -> &'static str {
        match self {
            Self::Grade => "目前所在年级？",
            Self::Gpa => "当前平均分/GPA？",
            Self::Country => "目标国家/地区？",
        }
    }
}

impl std::fmt::Display for WizardStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Grade => "grade",
            Self::Gpa => "gpa",
            Self::Country => "country",
        };
        write!(f, "{s}")
    }
}

/// Answers accumulated during the wizard. Each field is set exactly once per
/// funnel run, in step order; a restart clears all three.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LeadAnswers {
    pub grade: Option<String>,
    pub gpa: Option<String>,
    pub country: Option<String>,
}

impl LeadAnswers {
    /// Record an answer for a step. The option must be one of the strings
    /// offered at that step.
    pub fn record(&mut self, step: WizardStep, option: &str) -> Result<(), FunnelError> {
        if !step.options().contains(&option) {
            return Err(FunnelError::UnknownOption {
                step: step.to_string(),
                option: option.to_string(),
            });
        }
        match step {
            WizardStep::Grade => self.grade = Some(option.to_string()),
            WizardStep::Gpa => self.gpa = Some(option.to_string()),
            WizardStep::Country => self.country = Some(option.to_string()),
        }
        Ok(())
    }

    /// All three answers are present.
    pub fn is_complete(&self) -> bool {
        self.grade.is_some() && self.gpa.is_some() && self.country.is_some()
    }

    /// Clear all answers (restart).
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}

/// The persisted lead row. Append-only; created once at successful submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LeadRecord {
    pub phone: String,
    pub target_country: String,
    pub gpa: String,
    pub status: String,
}

impl LeadRecord {
    /// Build the record from a validated phone number and complete answers.
    pub fn new(phone: &str, answers: &LeadAnswers) -> Option<Self> {
        Some(Self {
            phone: phone.to_string(),
            target_country: answers.country.clone()?,
            gpa: answers.gpa.clone()?,
            status: LEAD_STATUS_NEW.to_string(),
        })
    }
}

static PHONE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^1[3-9]\d{9}$").expect("phone regex"));

/// CN mobile number check: exactly 11 digits, leading 1, second digit 3-9.
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE_RE.is_match(phone)
}
