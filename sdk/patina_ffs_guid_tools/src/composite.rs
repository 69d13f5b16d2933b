//! Registry of the built-in GUID tools.
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
use patina_ffs_editor::GuidToolRegistry;

/// Register every built-in tool enabled by features under its section definition GUID.
pub fn register_builtins(registry: &mut GuidToolRegistry) {
    #[cfg(feature = "crc32")]
    registry.register(patina_pi::fw_fs::guid::CRC32_SECTION, alloc::boxed::Box::new(crate::Crc32GuidTool));
    #[cfg(feature = "lzma")]
    registry.register(patina_pi::fw_fs::guid::LZMA_SECTION, alloc::boxed::Box::new(crate::LzmaGuidTool));
    log::debug!("{} built-in GUID tools available", registry.len());
}

/// Registry holding the built-in tools.
pub fn default_registry() -> GuidToolRegistry {
    let mut registry = GuidToolRegistry::new();
    register_builtins(&mut registry);
    registry
}

#[cfg(test)]
mod test {
    use super::*;
    use alloc::vec::Vec;
    use patina_ffs_editor::{FvEditError, GuidTool};

    struct Identity;

    impl GuidTool for Identity {
        fn pack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
            Ok(data.to_vec())
        }

        fn unpack(&self, data: &[u8]) -> Result<Vec<u8>, FvEditError> {
            Ok(data.to_vec())
        }
    }

    #[test]
    #[cfg(all(feature = "crc32", feature = "lzma"))]
    fn default_registry_should_hold_builtins() -> Result<(), FvEditError> {
        use patina_pi::fw_fs::guid::{CRC32_SECTION, LZMA_SECTION};

        let registry = default_registry();
        assert_eq!(registry.len(), 2);
        let packed = registry.get(&CRC32_SECTION)?.pack(&[1, 2, 3])?;
        assert_eq!(packed.len(), 7);
        let packed = registry.get(&LZMA_SECTION)?.pack(&[0; 0x40])?;
        assert_eq!(registry.get(&LZMA_SECTION)?.unpack(&packed)?, [0; 0x40]);
        Ok(())
    }

    #[test]
    fn builtins_should_not_displace_other_tools() {
        let mut registry = GuidToolRegistry::new();
        let other = r_efi::efi::Guid::from_bytes(&[0x55; 16]);
        registry.register(other, alloc::boxed::Box::new(Identity));
        register_builtins(&mut registry);
        assert!(registry.contains(&other));
    }
}
