//! Pattern-based redaction of content leaving the project.
//!
//! This is substitution, not a privacy guarantee.

use std::str::FromStr;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How much to redact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrivacyLevel {
    /// Nothing is redacted.
    None,
    /// Project names are replaced.
    #[default]
    ProjectNames,
    /// Project names, home and absolute paths, emails and IPv4 addresses.
    Full,
}

impl FromStr for PrivacyLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "none" => Ok(Self::None),
            "project_names" => Ok(Self::ProjectNames),
            "full" => Ok(Self::Full),
            other => Err(format!("unknown privacy level `{other}`")),
        }
    }
}

const PROJECT: &str = "<project>";
const EMAIL: &str = "<email>";
const IP: &str = "<ip>";
const PATH: &str = "<path>";

/// Compiled redaction patterns for one project.
#[derive(Debug, Clone)]
pub struct Anonymizer {
    level: PrivacyLevel,
    project_names: Vec<Regex>,
    email: Regex,
    ipv4: Regex,
    home: Regex,
    absolute: Regex,
}

impl Anonymizer {
    /// Build an anonymizer redacting the given project names.
    ///
    /// # Errors
    /// Returns an error if a pattern fails to compile.
    pub fn new<S: AsRef<str>>(level: PrivacyLevel, project_names: &[S]) -> Result<Self, regex::Error> {
        let project_names = project_names
            .iter()
            .map(AsRef::as_ref)
            .filter(|n| !n.trim().is_empty())
            .map(|n| {
                RegexBuilder::new(&format!(r"\b{}\b", regex::escape(n)))
                    .case_insensitive(true)
                    .build()
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            level,
            project_names,
            email: Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}")?,
            ipv4: Regex::new(
                r"\b(?:(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\.){3}(?:25[0-5]|2[0-4]\d|[01]?\d\d?)\b",
            )?,
            home: Regex::new(r#"(?:/home|/Users|[A-Za-z]:\\+Users)[/\\]+[^/\\\s"']+"#)?,
            absolute: Regex::new(r#"(?P<pre>^|[\s"'(=,\[])/(?:[\w.\-]+/)*[\w.\-]+"#)?,
        })
    }

    /// Same patterns at another level.
    #[must_use]
    pub fn at_level(&self, level: PrivacyLevel) -> Self {
        Self {
            level,
            ..self.clone()
        }
    }

    #[must_use]
    pub const fn level(&self) -> PrivacyLevel {
        self.level
    }

    /// Redact `text` according to the level.
    #[must_use]
    pub fn anonymize(&self, text: &str) -> String {
        if self.level == PrivacyLevel::None {
            return text.to_string();
        }

        let mut out = text.to_string();
        if self.level == PrivacyLevel::Full {
            out = self.email.replace_all(&out, EMAIL).into_owned();
            out = self.ipv4.replace_all(&out, IP).into_owned();
            out = self.home.replace_all(&out, "~").into_owned();
            out = self.absolute.replace_all(&out, format!("${{pre}}{PATH}")).into_owned();
        }
        for name in &self.project_names {
            out = name.replace_all(&out, PROJECT).into_owned();
        }
        out
    }

    /// Origin label for records leaving the project.
    #[must_use]
    pub fn origin(&self, project_name: &str) -> String {
        match self.level {
            PrivacyLevel::None => project_name.to_string(),
            PrivacyLevel::ProjectNames | PrivacyLevel::Full => "anonymous".to_string(),
        }
    }
}
