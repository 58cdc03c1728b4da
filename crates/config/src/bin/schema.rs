// Copyright 2025 New Vector Ltd.
//
// SPDX-License-Identifier: AGPL-3.0-only OR LicenseRef-Element-Commercial
// Please see LICENSE files in the repository root for full details.

//! Print the JSON schema of the configuration file

use schemars::r#gen::SchemaSettings;

fn main() -> Result<(), serde_json::Error> {
    let generator = SchemaSettings::draft07().into_generator();
    let schema = generator.into_root_schema_for::<traceware_config::RootConfig>();

    serde_json::to_writer_pretty(std::io::stdout(), &schema)
}
