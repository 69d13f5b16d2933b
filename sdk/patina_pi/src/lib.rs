//! Platform Initialization (PI) Specification definitions.
//!
//! This crate carries the firmware storage layouts from the UEFI Platform Initialization Specification V1.8A
//! Volume 3 that are needed to edit firmware volume images: firmware volume headers, block maps, extended
//! headers, FFS file headers and section headers.
//!
//! ## License
//!
//! Copyright (c) Microsoft Corporation.
//!
//! SPDX-License-Identifier: Apache-2.0
//!
#![cfg_attr(not(test), no_std)]

pub mod fw_fs;
