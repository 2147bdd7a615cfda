/* -------------------------------------------------------------------------- *\
 *                |   █████╗ ██╗   ██╗██████╗  █████╗ ███████╗ |              *
 *                |  ██╔══██╗██║   ██║██╔══██╗██╔══██╗██╔════╝ |              *
 *                |  ███████║██║   ██║██████╔╝███████║█████╗   |              *
 *                |  ██╔══██║██║   ██║██╔══██╗██╔══██║██╔══╝   |              *
 *                |  ██║  ██║╚██████╔╝██║  ██║██║  ██║███████╗ |              *
 *                |  ╚═╝  ╚═╝ ╚═════╝ ╚═╝  ╚═╝╚═╝  ╚═╝╚══════╝ |              *
 *                +--------------------------------------------+              *
 *                                                                            *
 *                         Distributed Systems Runtime                        *
 * -------------------------------------------------------------------------- *
 * Copyright 2022 - 2024, the aurae contributors                              *
 * SPDX-License-Identifier: Apache-2.0                                        *
\* -------------------------------------------------------------------------- */

//! App container names and identifiers.

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use validation::{ValidatedField, ValidationError, AC_IDENTIFIER_REGEX, AC_NAME_REGEX};

/// Container names double as the UTS hostname, which Linux caps at 64 bytes.
pub const AC_NAME_MAX_LENGTH: usize = 64;

/// A name in the runtime naming grammar: lower case alphanumerics separated
/// by single dashes. Used for app names inside a pod manifest and for volumes.
#[derive(
    Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct AcName(String);

impl AcName {
    /// Derives a name from an image identifier by keeping its last path
    /// segment and folding anything outside the grammar into single dashes.
    ///
    /// `example.com/app` becomes `app`, `example.com/My_App` becomes `my-app`.
    pub fn from_identifier(
        identifier: &AcIdentifier,
    ) -> Result<Self, ValidationError> {
        let leaf = identifier
            .as_str()
            .rsplit('/')
            .next()
            .unwrap_or_else(|| identifier.as_str());
        Self::sanitize(leaf)
    }

    /// Lower cases `input` and replaces every run of characters outside
    /// `[a-z0-9]` with a single dash, trimming dashes from both ends and
    /// cutting the result to [AC_NAME_MAX_LENGTH].
    pub fn sanitize(input: &str) -> Result<Self, ValidationError> {
        let mut sanitized = String::with_capacity(input.len());
        for c in input.chars().flat_map(char::to_lowercase) {
            if c.is_ascii_lowercase() || c.is_ascii_digit() {
                sanitized.push(c);
            } else if !sanitized.is_empty() && !sanitized.ends_with('-') {
                sanitized.push('-');
            }
        }
        // Only ASCII is pushed above.
        sanitized.truncate(AC_NAME_MAX_LENGTH);
        let sanitized = sanitized.trim_end_matches('-').to_string();

        Self::validate(Some(sanitized), "name", None)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl ValidatedField<String> for AcName {
    fn validate(
        input: Option<String>,
        field_name: &str,
        parent_name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let input =
            validation::required_not_empty(input, field_name, parent_name)?;

        validation::maximum_length(
            &input,
            AC_NAME_MAX_LENGTH,
            validation::UNIT_CHARACTERS,
            field_name,
            parent_name,
        )?;

        validation::allow_regex(
            &input,
            &AC_NAME_REGEX,
            field_name,
            parent_name,
        )?;

        Ok(Self(input))
    }
}

impl TryFrom<String> for AcName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(Some(value), "name", None)
    }
}

impl From<AcName> for String {
    fn from(x: AcName) -> Self {
        x.0
    }
}

impl Display for AcName {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// A DNS-like image identifier such as `example.com/app`.
#[derive(
    Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct AcIdentifier(String);

impl AcIdentifier {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValidatedField<String> for AcIdentifier {
    fn validate(
        input: Option<String>,
        field_name: &str,
        parent_name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let input =
            validation::required_not_empty(input, field_name, parent_name)?;

        validation::allow_regex(
            &input,
            &AC_IDENTIFIER_REGEX,
            field_name,
            parent_name,
        )?;

        Ok(Self(input))
    }
}

impl TryFrom<String> for AcIdentifier {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(Some(value), "name", None)
    }
}

impl From<AcIdentifier> for String {
    fn from(x: AcIdentifier) -> Self {
        x.0
    }
}

impl Display for AcIdentifier {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
