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

use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use validation::{ValidatedField, ValidationError, IMAGE_HASH_REGEX};

/// Content hash of an image in `<algorithm>-<hex digest>` form, e.g.
/// `sha512-9b8f...`. Only `sha512` is accepted; the digest may be truncated.
#[derive(
    Debug, Clone, Ord, PartialOrd, Eq, PartialEq, Hash, Serialize, Deserialize,
)]
#[serde(try_from = "String", into = "String")]
pub struct ImageHash(String);

impl ImageHash {
    pub fn algorithm(&self) -> &str {
        self.0.split_once('-').map_or("", |(algorithm, _)| algorithm)
    }

    pub fn digest(&self) -> &str {
        self.0.split_once('-').map_or("", |(_, digest)| digest)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ValidatedField<String> for ImageHash {
    fn validate(
        input: Option<String>,
        field_name: &str,
        parent_name: Option<&str>,
    ) -> Result<Self, ValidationError> {
        let input =
            validation::required_not_empty(input, field_name, parent_name)?;

        validation::allow_regex(
            &input,
            &IMAGE_HASH_REGEX,
            field_name,
            parent_name,
        )?;

        Ok(Self(input))
    }
}

impl TryFrom<String> for ImageHash {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::validate(Some(value), "id", None)
    }
}

impl From<ImageHash> for String {
    fn from(x: ImageHash) -> Self {
        x.0
    }
}

impl Display for ImageHash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}
