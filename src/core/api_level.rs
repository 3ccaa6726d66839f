//! API levels - the ordering key for stub versions.
//!
//! An API level is spelled by users as a decimal number (`29`), a release
//! codename (`Tiramisu`, or an in-development codename), or `current`,
//! which names the future level that has not been released yet.

use std::cmp::Ordering;
use std::fmt;

use serde::{Serialize, Serializer};
use thiserror::Error;

use crate::util::config::PlatformConfig;

/// Numeric value of the future API level.
pub const FUTURE_API_LEVEL_INT: i32 = 10_000;

/// Spelling of the future API level.
pub const FUTURE_API_LEVEL_NAME: &str = "current";

/// First numeric value handed out to in-development codenames.
pub const PREVIEW_API_LEVEL_BASE: i32 = 9_000;

/// Errors from parsing or ordering API levels.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ApiLevelError {
    #[error("API level must not be empty")]
    Empty,

    #[error("unrecognized API level `{0}`")]
    Unrecognized(String),

    #[error("API level `{0}` must be positive")]
    NotPositive(String),

    #[error("not sorted: [{}]", .0.join(", "))]
    NotSorted(Vec<String>),
}

/// A resolved API level.
#[derive(Debug, Clone, Eq)]
pub struct ApiLevel {
    /// Canonical spelling (`"29"`, a preview codename, or `"current"`)
    value: String,
    /// Comparable numeric value
    number: i32,
    /// Whether the level is not yet finalized
    preview: bool,
}

impl ApiLevel {
    /// The future API level.
    pub fn future() -> Self {
        ApiLevel {
            value: FUTURE_API_LEVEL_NAME.to_string(),
            number: FUTURE_API_LEVEL_INT,
            preview: true,
        }
    }

    /// A finalized API level.
    pub fn final_level(number: i32) -> Self {
        ApiLevel {
            value: number.to_string(),
            number,
            preview: false,
        }
    }

    /// Parse an API level as written in a module declaration.
    ///
    /// Accepts `current`, decimal numbers, finalized codenames from
    /// `platform.final_codenames`, and in-development codenames from
    /// `platform.active_codenames`.
    pub fn from_user(raw: &str, platform: &PlatformConfig) -> Result<Self, ApiLevelError> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Err(ApiLevelError::Empty);
        }

        if raw == FUTURE_API_LEVEL_NAME {
            return Ok(Self::future());
        }

        if let Some(&number) = platform.final_codenames.get(raw) {
            return Ok(Self::final_level(number));
        }

        if let Some(index) = platform.active_codenames.iter().position(|c| c == raw) {
            return Ok(ApiLevel {
                value: raw.to_string(),
                number: PREVIEW_API_LEVEL_BASE + index as i32,
                preview: true,
            });
        }

        match raw.parse::<i32>() {
            Ok(n) if n <= 0 => Err(ApiLevelError::NotPositive(raw.to_string())),
            Ok(FUTURE_API_LEVEL_INT) => Ok(Self::future()),
            Ok(n) => Ok(Self::final_level(n)),
            Err(_) => Err(ApiLevelError::Unrecognized(raw.to_string())),
        }
    }

    /// Comparable numeric value (previews map into the 9000 range).
    pub fn number(&self) -> i32 {
        self.number
    }

    /// Whether this level is a preview or the future level.
    pub fn is_preview(&self) -> bool {
        self.preview
    }

    /// Whether this is the future level.
    pub fn is_future(&self) -> bool {
        self.number == FUTURE_API_LEVEL_INT
    }

    /// Canonical spelling of this level.
    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl PartialEq for ApiLevel {
    fn eq(&self, other: &Self) -> bool {
        self.number == other.number
    }
}

impl PartialOrd for ApiLevel {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ApiLevel {
    fn cmp(&self, other: &Self) -> Ordering {
        self.number.cmp(&other.number)
    }
}

impl fmt::Display for ApiLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

impl Serialize for ApiLevel {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.value)
    }
}

/// Append the future level unless it is already listed.
///
/// Both spellings of the future level count, since some declarations
/// write the raw number instead of `current`.
pub fn add_current_version_if_not_present(mut versions: Vec<String>) -> Vec<String> {
    let raw_future = FUTURE_API_LEVEL_INT.to_string();
    if versions
        .iter()
        .any(|v| v == FUTURE_API_LEVEL_NAME || *v == raw_future)
    {
        return versions;
    }
    versions.push(FUTURE_API_LEVEL_NAME.to_string());
    versions
}

/// Parse every version and require strictly increasing order.
pub fn normalize_versions(
    versions: &[String],
    platform: &PlatformConfig,
) -> Result<Vec<ApiLevel>, ApiLevelError> {
    let mut levels: Vec<ApiLevel> = Vec::with_capacity(versions.len());
    for raw in versions {
        let level = ApiLevel::from_user(raw, platform)?;
        if let Some(previous) = levels.last() {
            if level <= *previous {
                return Err(ApiLevelError::NotSorted(versions.to_vec()));
            }
        }
        levels.push(level);
    }
    Ok(levels)
}
