//! YAML description of the GUID tools available to the editor.
//!
//! ```yaml
//! tools:
//!   - guid: EE4E5898-3914-4259-9D6E-DC7BD79403CF
//!     name: LZMA
//!     builtin: lzma
//!   - guid: A31280AD-481E-41B6-95E8-127F4C984779
//!     name: TIANO
//!     command: TianoCompress
//!     args: ["--uefi"]
//! ```
//!
//! Each entry names exactly one of a `builtin` tool (`crc32` or `lzma`, when the matching feature is enabled) or an
//! external `command` run as described for [`ExternalGuidTool`].
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use core::{fmt, str::FromStr};
use patina_ffs_editor::{GuidTool, GuidToolRegistry};
use r_efi::efi;
use serde::Deserialize;
use std::io::Read;

use crate::ExternalGuidTool;

/// Errors raised while loading a GUID tool table.
#[derive(Debug)]
pub enum ConfigError {
    /// The document is not valid YAML for a tool table.
    Yaml(serde_yaml::Error),
    /// An entry's `guid` is not a GUID string.
    InvalidGuid(String),
    /// An entry names a built-in tool that does not exist or is not enabled.
    UnknownTool(String),
    /// An entry names both or neither of `builtin` and `command`.
    InvalidEntry(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::Yaml(err) => write!(f, "invalid GUID tool table: {err}"),
            ConfigError::InvalidGuid(guid) => write!(f, "invalid GUID {guid:?}"),
            ConfigError::UnknownTool(tool) => write!(f, "unknown built-in GUID tool {tool:?}"),
            ConfigError::InvalidEntry(guid) => {
                write!(f, "GUID tool entry {guid} must name exactly one of builtin or command")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Yaml(err) => Some(err),
            _ => None,
        }
    }
}

impl From<serde_yaml::Error> for ConfigError {
    fn from(err: serde_yaml::Error) -> Self {
        ConfigError::Yaml(err)
    }
}

/// One GUID to tool assignment.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuidToolEntry {
    /// Section definition GUID in registry format.
    pub guid: String,
    /// Display name, used only in logs.
    #[serde(default)]
    pub name: Option<String>,
    /// Built-in tool name.
    #[serde(default)]
    pub builtin: Option<String>,
    /// External program.
    #[serde(default)]
    pub command: Option<String>,
    /// Arguments placed before the direction and file arguments of `command`.
    #[serde(default)]
    pub args: Vec<String>,
}

impl GuidToolEntry {
    /// Parsed section definition GUID.
    pub fn section_guid(&self) -> Result<efi::Guid, ConfigError> {
        let uuid = uuid::Uuid::from_str(self.guid.trim()).map_err(|_| ConfigError::InvalidGuid(self.guid.clone()))?;
        Ok(efi::Guid::from_bytes(&uuid.to_bytes_le()))
    }

    fn tool(&self) -> Result<Box<dyn GuidTool>, ConfigError> {
        match (self.builtin.as_deref(), self.command.as_deref()) {
            (Some(builtin), None) => builtin_tool(builtin),
            (None, Some(command)) => Ok(Box::new(ExternalGuidTool::new(command, self.args.iter().cloned()))),
            _ => Err(ConfigError::InvalidEntry(self.guid.clone())),
        }
    }
}

fn builtin_tool(name: &str) -> Result<Box<dyn GuidTool>, ConfigError> {
    match name.to_ascii_lowercase().as_str() {
        #[cfg(feature = "crc32")]
        "crc32" => Ok(Box::new(crate::Crc32GuidTool)),
        #[cfg(feature = "lzma")]
        "lzma" => Ok(Box::new(crate::LzmaGuidTool)),
        _ => Err(ConfigError::UnknownTool(name.to_string())),
    }
}

/// Table of GUID tool assignments.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuidToolConfig {
    /// Entries in registration order.
    #[serde(default)]
    pub tools: Vec<GuidToolEntry>,
}

impl GuidToolConfig {
    /// Parse a tool table from a YAML document.
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Parse a tool table from a reader yielding a YAML document.
    pub fn from_reader(reader: impl Read) -> Result<Self, ConfigError> {
        Ok(serde_yaml::from_reader(reader)?)
    }

    /// Registry holding one tool per entry. Later entries replace earlier ones for the same GUID.
    pub fn build_registry(&self) -> Result<GuidToolRegistry, ConfigError> {
        let mut registry = GuidToolRegistry::new();
        for entry in &self.tools {
            let guid = entry.section_guid()?;
            if registry.register(guid, entry.tool()?).is_some() {
                log::warn!("GUID tool {} replaces an earlier entry", entry.name.as_deref().unwrap_or(&entry.guid));
            }
        }
        log::info!("loaded {} GUID tools", registry.len());
        Ok(registry)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use patina_pi::fw_fs::guid::{CRC32_SECTION, LZMA_SECTION};
    use std::error::Error;

    const TABLE: &str = r#"
tools:
  - guid: EE4E5898-3914-4259-9D6E-DC7BD79403CF
    name: LZMA
    builtin: lzma
  - guid: fc1bcdb0-7d31-49aa-936a-a4600d9dd083
    name: CRC32
    builtin: CRC32
  - guid: A31280AD-481E-41B6-95E8-127F4C984779
    name: TIANO
    command: TianoCompress
    args: ["--uefi", "-q"]
"#;

    #[test]
    fn table_should_build_registry() -> Result<(), Box<dyn Error>> {
        let config = GuidToolConfig::from_yaml(TABLE)?;
        assert_eq!(config.tools.len(), 3);
        assert_eq!(config.tools[2].command.as_deref(), Some("TianoCompress"));
        assert_eq!(config.tools[2].args, ["--uefi", "-q"]);

        let registry = config.build_registry()?;
        assert_eq!(registry.len(), 3);
        assert!(registry.contains(&LZMA_SECTION));
        assert!(registry.contains(&CRC32_SECTION));
        assert!(registry.contains(&efi::Guid::from_fields(
            0xA31280AD,
            0x481E,
            0x41B6,
            0x95,
            0xE8,
            &[0x12, 0x7F, 0x4C, 0x98, 0x47, 0x79]
        )));

        let packed = registry.get(&CRC32_SECTION)?.pack(&[9; 8])?;
        assert_eq!(registry.get(&CRC32_SECTION)?.unpack(&packed)?, [9; 8]);
        Ok(())
    }

    #[test]
    fn reader_should_match_str() -> Result<(), Box<dyn Error>> {
        assert_eq!(GuidToolConfig::from_reader(TABLE.as_bytes())?, GuidToolConfig::from_yaml(TABLE)?);
        assert!(GuidToolConfig::from_yaml("{}")?.build_registry()?.is_empty());
        Ok(())
    }

    #[test]
    fn bad_entries_should_be_rejected() -> Result<(), Box<dyn Error>> {
        let bad_guid = GuidToolConfig::from_yaml("tools: [{guid: not-a-guid, builtin: lzma}]")?;
        assert!(matches!(bad_guid.build_registry(), Err(ConfigError::InvalidGuid(guid)) if guid == "not-a-guid"));

        let unknown = GuidToolConfig::from_yaml("tools: [{guid: EE4E5898-3914-4259-9D6E-DC7BD79403CF, builtin: zip}]")?;
        assert!(matches!(unknown.build_registry(), Err(ConfigError::UnknownTool(tool)) if tool == "zip"));

        let both = GuidToolConfig::from_yaml(
            "tools: [{guid: EE4E5898-3914-4259-9D6E-DC7BD79403CF, builtin: lzma, command: LzmaCompress}]",
        )?;
        assert!(matches!(both.build_registry(), Err(ConfigError::InvalidEntry(_))));

        let neither = GuidToolConfig::from_yaml("tools: [{guid: EE4E5898-3914-4259-9D6E-DC7BD79403CF}]")?;
        assert!(matches!(neither.build_registry(), Err(ConfigError::InvalidEntry(_))));
        Ok(())
    }

    #[test]
    fn malformed_yaml_should_surface_source() {
        let err = GuidToolConfig::from_yaml("tools: [{guid: 1, unexpected: true}]").err();
        assert!(matches!(&err, Some(ConfigError::Yaml(_))));
        assert!(err.as_ref().and_then(|err| err.source()).is_some());
    }
}
