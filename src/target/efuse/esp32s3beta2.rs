//! eFuse definitions for the esp32s3 beta2 engineering samples
//!
//! The field map is the same as the esp32s3, only the controller lives at a
//! different address.

use super::{blocks_v2, controller_v2, esp32s3, CodingRule, EfuseBlock, EfuseLayout, MEM_SIZE_V2};
use crate::target::Chip;

pub(crate) const DR_REG_EFUSE_BASE: u32 = 0x6001_a000;

pub(crate) const BLOCKS: &[EfuseBlock] = &blocks_v2(DR_REG_EFUSE_BASE);

pub(crate) static LAYOUT: EfuseLayout = EfuseLayout {
    chip: Chip::Esp32s3beta2,
    blocks: BLOCKS,
    fields: esp32s3::FIELDS,
    controller: controller_v2(DR_REG_EFUSE_BASE),
    coding: CodingRule::ReedSolomon,
    mem_base: DR_REG_EFUSE_BASE,
    mem_size: MEM_SIZE_V2,
    flash_voltage: Some(esp32s3::FLASH_VOLTAGE),
};
