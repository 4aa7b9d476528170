// Copyright (c) The nextest Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

use serde::de::IntoDeserializer;
use std::{fmt, time::Duration};

/// Deserializes the `fetch-timeout` key: either an empty string (no timeout)
/// or a humantime duration such as `"30s"`.
pub(super) fn deserialize_fetch_timeout<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    struct V;

    impl serde::de::Visitor<'_> for V {
        type Value = Option<Duration>;

        fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
            write!(
                formatter,
                "a duration (\"30s\") or an empty string to disable the timeout"
            )
        }

        fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
        where
            E: serde::de::Error,
        {
            if v.is_empty() {
                return Ok(None);
            }
            let timeout: Duration = humantime_serde::deserialize(v.into_deserializer())?;
            if timeout.is_zero() {
                return Err(E::invalid_value(
                    serde::de::Unexpected::Str(v),
                    &"a non-zero duration",
                ));
            }
            Ok(Some(timeout))
        }
    }

    deserializer.deserialize_any(V)
}
