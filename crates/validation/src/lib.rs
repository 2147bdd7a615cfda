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
#![warn(future_incompatible, nonstandard_style, unused)]
#![warn(clippy::unwrap_used)]

//! Field level validation shared by the corral daemon.
//!
//! Names and references that reach the container manager are validated into
//! newtypes through [ValidatedField], so that anything holding one of those
//! newtypes can rely on the grammar below.

pub use self::allow_regex::allow_regex;
pub use self::maximum_length::maximum_length;
pub use self::required_not_empty::required_not_empty;
use fancy_regex::Regex;
use lazy_static::lazy_static;

mod allow_regex;
mod maximum_length;
mod required_not_empty;

pub const UNIT_CHARACTERS: &str = "characters";

lazy_static! {
    /// App container names: lower case alphanumerics separated by single dashes.
    pub static ref AC_NAME_REGEX: Regex =
        Regex::new(r"^[a-z0-9]+(-[a-z0-9]+)*$")
            .expect("failed to parse 'AC_NAME_REGEX'");
    /// App container identifiers, e.g. `example.com/app`.
    pub static ref AC_IDENTIFIER_REGEX: Regex =
        Regex::new(r"^[a-z0-9]+([-._~/][a-z0-9]+)*$")
            .expect("failed to parse 'AC_IDENTIFIER_REGEX'");
    /// Content hashes in `<algorithm>-<hex digest>` form.
    pub static ref IMAGE_HASH_REGEX: Regex =
        Regex::new(r"^sha512-[a-f0-9]{1,128}$")
            .expect("failed to parse 'IMAGE_HASH_REGEX'");
}

pub trait ValidatedField<T>
where
    Self: Sized,
{
    fn validate(
        input: Option<T>,
        field_name: &str,
        parent_name: Option<&str>,
    ) -> Result<Self, ValidationError>;
}

pub fn field_name(field_name: &str, parent_name: Option<&str>) -> String {
    match parent_name {
        None => field_name.to_string(),
        Some(parent_name) => format!("{parent_name}.{field_name}"),
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Field = {field}; Required")]
    Required { field: String },
    #[error("Field = {field}; Maximum = {maximum} {units}")]
    Maximum { field: String, maximum: String, units: String },
    #[error("Field = {field}; Regex = {pattern}")]
    AllowRegexViolation { field: String, pattern: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_name_nests_under_parent() {
        assert_eq!(field_name("name", None), "name");
        assert_eq!(field_name("name", Some("app")), "app.name");
    }

    #[test]
    fn test_ac_name_regex() {
        assert!(AC_NAME_REGEX.is_match("app").unwrap());
        assert!(AC_NAME_REGEX.is_match("my-app-2").unwrap());
        assert!(!AC_NAME_REGEX.is_match("My-App").unwrap());
        assert!(!AC_NAME_REGEX.is_match("-app").unwrap());
        assert!(!AC_NAME_REGEX.is_match("app--2").unwrap());
        assert!(!AC_NAME_REGEX.is_match("example.com/app").unwrap());
    }

    #[test]
    fn test_ac_identifier_regex() {
        assert!(AC_IDENTIFIER_REGEX.is_match("example.com/app").unwrap());
        assert!(AC_IDENTIFIER_REGEX.is_match("app").unwrap());
        assert!(!AC_IDENTIFIER_REGEX.is_match("example.com//app").unwrap());
        assert!(!AC_IDENTIFIER_REGEX.is_match("/app").unwrap());
    }

    #[test]
    fn test_image_hash_regex() {
        assert!(IMAGE_HASH_REGEX.is_match("sha512-abc123").unwrap());
        assert!(!IMAGE_HASH_REGEX.is_match("sha256-abc123").unwrap());
        assert!(!IMAGE_HASH_REGEX.is_match("sha512-").unwrap());
        assert!(!IMAGE_HASH_REGEX.is_match("sha512-xyz").unwrap());
    }
}
