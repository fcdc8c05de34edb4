use regex::RegexSet;

use crate::error::Result;

/// Keys matching any of these are dropped from the stacked meta data.
pub const DEFAULT_KEY_EXCLUDE: &[&str] = &[
    "Patient",
    "Physician",
    "Operator",
    "Date",
    "Birth",
    "Address",
    "Institution",
    "Station",
    "SiteName",
    "Age",
    "Comment",
    "Phone",
    "Telephone",
    "Insurance",
    "Religious",
    "Language",
    "Military",
    "MedicalRecord",
    "Ethnic",
    "Occupation",
    "Unknown",
    "PrivateTagData",
    "UID",
    "StudyDescription",
    "DeviceSerialNumber",
    "ReferencedImageSequence",
    "RequestedProcedureDescription",
    "PerformedProcedureStepDescription",
    "PerformedProcedureStepID",
];

/// Keys matching any of these are kept even if an exclude pattern matches.
pub const DEFAULT_KEY_INCLUDE: &[&str] = &["ImageOrientationPatient", "ImagePositionPatient"];

/// Regex based meta data key filter.
#[derive(Debug, Clone)]
pub struct KeyFilter {
    exclude: RegexSet,
    include: RegexSet,
}

impl KeyFilter {
    pub fn new<E, I>(exclude: E, include: I) -> Result<Self>
    where
        E: IntoIterator,
        E::Item: AsRef<str>,
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        Ok(Self {
            exclude: RegexSet::new(exclude)?,
            include: RegexSet::new(include)?,
        })
    }

    /// The default lists extended with user supplied patterns.
    pub fn with_defaults(extra_exclude: &[String], extra_include: &[String]) -> Result<Self> {
        let exclude = DEFAULT_KEY_EXCLUDE
            .iter()
            .map(|re| re.to_string())
            .chain(extra_exclude.iter().cloned());
        let include = DEFAULT_KEY_INCLUDE
            .iter()
            .map(|re| re.to_string())
            .chain(extra_include.iter().cloned());
        Self::new(exclude, include)
    }

    /// Patterns match anywhere in the key.
    pub fn is_excluded(&self, key: &str) -> bool {
        self.exclude.is_match(key) && !self.include.is_match(key)
    }
}

impl Default for KeyFilter {
    fn default() -> Self {
        // The default patterns are plain words, they always compile.
        Self {
            exclude: RegexSet::new(DEFAULT_KEY_EXCLUDE).unwrap_or_else(|_| RegexSet::empty()),
            include: RegexSet::new(DEFAULT_KEY_INCLUDE).unwrap_or_else(|_| RegexSet::empty()),
        }
    }
}
