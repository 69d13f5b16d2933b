//! [`GuidTool`](patina_ffs_editor::GuidTool) implementations for the GUID-defined sections found in firmware images.
//!
//! Built-in encoders are enabled by feature: `crc32` for CRC32 guided sections and `lzma` for LZMA compressed
//! sections. With `std`, [`ExternalGuidTool`] delegates to an external program, and the `config` feature adds a
//! YAML description of GUID to tool assignments that builds a
//! [`GuidToolRegistry`](patina_ffs_editor::GuidToolRegistry).
//!
//! ## License
//!
//! Copyright (C) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
#![cfg_attr(not(feature = "std"), no_std)]

extern crate alloc;

mod composite;
#[cfg(feature = "config")]
mod config;
#[cfg(feature = "crc32")]
mod crc32;
#[cfg(feature = "std")]
mod external;
#[cfg(feature = "lzma")]
mod lzma;

pub use composite::{default_registry, register_builtins};
#[cfg(feature = "config")]
pub use config::{ConfigError, GuidToolConfig, GuidToolEntry};
#[cfg(feature = "crc32")]
pub use crc32::Crc32GuidTool;
#[cfg(feature = "std")]
pub use external::ExternalGuidTool;
#[cfg(feature = "lzma")]
pub use lzma::LzmaGuidTool;
