//! eFuse block and field definitions for all target devices.
//!
//! A [EfuseLayout] describes everything needed to read and program the eFuses
//! of one chip: the blocks and their register addresses, the named fields
//! within those blocks, and the registers of the eFuse controller.

use bitflags::bitflags;
use strum::Display;

use super::Chip;

pub mod esp32;
pub mod esp32c3;
pub mod esp32h2;
pub mod esp32s2;
pub mod esp32s3;
pub mod esp32s3beta2;

/// A block of eFuses
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfuseBlock {
    /// Index of the block.
    pub index: u8,
    /// Primary name of the block, e.g. `BLOCK_KEY0`.
    pub name: &'static str,
    /// Alternative names accepted on the command line.
    pub aliases: &'static [&'static str],
    /// Number of registers that this block contains.
    ///
    /// Each register is a single 4-byte word.
    pub length: u8,
    /// Read address for this eFuse block.
    pub read_address: u32,
    /// Address of the first programming register for this eFuse block.
    pub write_address: u32,
    /// Bit in `WR_DIS` which write protects the whole block.
    pub write_disable: Option<u8>,
    /// Bit in `RD_DIS` which read protects the whole block.
    pub read_disable: Option<u8>,
}

impl EfuseBlock {
    /// Whether `name` refers to this block, ignoring case
    pub fn is_named(&self, name: &str) -> bool {
        self.name.eq_ignore_ascii_case(name)
            || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }

    /// Size of the block in bytes
    pub fn size(&self) -> usize {
        self.length as usize * 4
    }
}

/// How the value of a field is presented and parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum FieldKind {
    /// A single bit flag
    #[strum(serialize = "bool")]
    Bool,
    /// An unsigned integer of up to 64 bits
    #[strum(serialize = "uint")]
    Uint,
    /// A raw byte sequence, e.g. a key or a digest
    #[strum(serialize = "bytes")]
    Bytes,
    /// A 6-byte MAC address
    #[strum(serialize = "mac")]
    Mac,
}

/// Group a field is listed under in the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
pub enum Category {
    #[strum(serialize = "Efuse fuses")]
    Efuse,
    #[strum(serialize = "Identity fuses")]
    Identity,
    #[strum(serialize = "Config fuses")]
    Config,
    #[strum(serialize = "Flash voltage (VDD_SDIO) fuses")]
    FlashVoltage,
    #[strum(serialize = "Security fuses")]
    Security,
    #[strum(serialize = "Calibration fuses")]
    Calibration,
    #[strum(serialize = "User fuses")]
    User,
}

/// A named eFuse field which can be read from and burned to a target device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EfuseField {
    /// Name of the field, e.g. `DIS_USB_JTAG`.
    pub name: &'static str,
    /// The block in which the field is located.
    pub block: u32,
    /// The word offset of the field.
    pub word: u32,
    /// The bit offset of the start of the field, counted from the start of
    /// the block.
    pub bit_start: u32,
    /// The bit width of the field.
    pub bit_count: u32,
    pub kind: FieldKind,
    pub category: Category,
    /// Bit in `WR_DIS` which write protects this field.
    pub write_disable: Option<u8>,
    /// Bit in `RD_DIS` which read protects this field.
    pub read_disable: Option<u8>,
}

impl EfuseField {
    /// Creates a new eFuse field definition.
    ///
    /// Single bit fields are flags, fields of up to 64 bits are integers, and
    /// anything wider is a byte sequence.
    pub const fn new(
        name: &'static str,
        block: u32,
        word: u32,
        bit_start: u32,
        bit_count: u32,
    ) -> Self {
        let kind = if bit_count == 1 {
            FieldKind::Bool
        } else if bit_count <= 64 {
            FieldKind::Uint
        } else {
            FieldKind::Bytes
        };

        Self {
            name,
            block,
            word,
            bit_start,
            bit_count,
            kind,
            category: Category::Config,
            write_disable: None,
            read_disable: None,
        }
    }

    pub const fn kind(self, kind: FieldKind) -> Self {
        Self { kind, ..self }
    }

    pub const fn category(self, category: Category) -> Self {
        Self { category, ..self }
    }

    pub const fn wr_dis(self, bit: u8) -> Self {
        Self {
            write_disable: Some(bit),
            ..self
        }
    }

    pub const fn rd_dis(self, bit: u8) -> Self {
        Self {
            read_disable: Some(bit),
            ..self
        }
    }

    /// Number of bytes needed to hold the value of the field
    pub fn byte_len(&self) -> usize {
        self.bit_count.div_ceil(8) as usize
    }
}

bitflags! {
    /// Commands understood by the eFuse controller command register
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ControllerCommand: u32 {
        /// Reload the eFuse values into the read registers
        const READ = 0x1;
        /// Program the values held in the write registers
        const PGM = 0x2;
    }
}

/// The eFuse controller of a chip
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controller {
    pub conf_reg: u32,
    pub status_reg: u32,
    pub cmd_reg: u32,
    pub write_op_code: u32,
    pub read_op_code: u32,
    /// Registers holding Reed-Solomon check values, if blocks use them
    pub check_value_reg: Option<u32>,
    /// Whether the program command selects the block to burn
    pub block_select: bool,
}

impl Controller {
    /// Value to write to the command register to program `block`
    pub fn program_command(&self, block: u8) -> u32 {
        if self.block_select {
            ControllerCommand::PGM.bits() | ((block as u32) << 2)
        } else {
            ControllerCommand::PGM.bits()
        }
    }

    /// Value to write to the command register to reload the read registers
    pub fn read_command(&self) -> u32 {
        ControllerCommand::READ.bits()
    }
}

/// How the coding scheme of a block is determined
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodingRule {
    /// The `CODING_SCHEME` field of block 0 selects the scheme of blocks 1-3
    Configurable,
    /// All blocks but block 0 are protected by Reed-Solomon check values
    ReedSolomon,
}

/// Encoding applied to the data of a block when it is programmed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CodingScheme {
    #[strum(serialize = "None")]
    None,
    #[strum(serialize = "3/4")]
    ThreeQuarters,
    #[strum(serialize = "Repeat")]
    Repeat,
    #[strum(serialize = "RS")]
    ReedSolomon,
}

impl CodingScheme {
    /// Decode the value of the ESP32 `CODING_SCHEME` field
    pub fn from_field(value: u64) -> Self {
        match value {
            0 | 3 => CodingScheme::None,
            1 => CodingScheme::ThreeQuarters,
            _ => CodingScheme::Repeat,
        }
    }

    /// Whether data can only be burned into an empty block
    pub fn is_coded(&self) -> bool {
        !matches!(self, CodingScheme::None)
    }
}

/// Fields burned by `set-flash-voltage`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlashVoltageFields {
    /// Overrides the voltage selected by the strapping pin
    pub force: &'static str,
    /// Enables the internal regulator
    pub regulator: &'static str,
    /// Selects 3.3V instead of 1.8V
    pub tieh: &'static str,
}

/// The complete eFuse register map of a chip
#[derive(Debug)]
pub struct EfuseLayout {
    pub chip: Chip,
    pub blocks: &'static [EfuseBlock],
    pub fields: &'static [EfuseField],
    pub controller: Controller,
    pub coding: CodingRule,
    /// Start of the eFuse register window
    pub mem_base: u32,
    /// Size of the eFuse register window in bytes
    pub mem_size: u32,
    pub flash_voltage: Option<FlashVoltageFields>,
}

impl EfuseLayout {
    pub fn block(&self, index: u8) -> Option<&'static EfuseBlock> {
        self.blocks.iter().find(|b| b.index == index)
    }

    /// Look up a block by name, alias or index
    pub fn find_block(&self, name: &str) -> Option<&'static EfuseBlock> {
        match name.parse::<u8>() {
            Ok(index) => self.block(index),
            Err(_) => self.blocks.iter().find(|b| b.is_named(name)),
        }
    }

    /// Look up a field by name, ignoring case
    pub fn field(&self, name: &str) -> Option<&'static EfuseField> {
        self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name))
    }

    pub fn field_names(&self) -> impl Iterator<Item = &'static str> {
        self.fields.iter().map(|f| f.name)
    }

    /// Bit of `WR_DIS` protecting `field`, falling back to its block
    pub fn write_disable_bit(&self, field: &EfuseField) -> Option<u8> {
        field
            .write_disable
            .or_else(|| self.block(field.block as u8).and_then(|b| b.write_disable))
    }

    /// Bit of `RD_DIS` protecting `field`, falling back to its block
    pub fn read_disable_bit(&self, field: &EfuseField) -> Option<u8> {
        field
            .read_disable
            .or_else(|| self.block(field.block as u8).and_then(|b| b.read_disable))
    }

    /// Whether `address` lies inside the eFuse register window
    pub fn contains(&self, address: u32) -> bool {
        address >= self.mem_base && address < self.mem_base + self.mem_size
    }
}

/// Block table shared by all chips with the second generation controller.
///
/// Every block is programmed through the same `PGM_DATA` registers starting
/// at `base`.
pub(crate) const fn blocks_v2(base: u32) -> [EfuseBlock; 11] {
    #[allow(clippy::too_many_arguments)]
    const fn block(
        index: u8,
        name: &'static str,
        aliases: &'static [&'static str],
        length: u8,
        read_offset: u32,
        base: u32,
        write_disable: Option<u8>,
        read_disable: Option<u8>,
    ) -> EfuseBlock {
        EfuseBlock {
            index,
            name,
            aliases,
            length,
            read_address: base + read_offset,
            write_address: base,
            write_disable,
            read_disable,
        }
    }

    [
        block(0, "BLOCK0", &[], 6, 0x2c, base, None, None),
        block(1, "MAC_SPI_8M_0", &["BLOCK1"], 6, 0x44, base, Some(20), None),
        block(2, "BLOCK_SYS_DATA", &["BLOCK2"], 8, 0x5c, base, Some(21), None),
        block(3, "BLOCK_USR_DATA", &["BLOCK3"], 8, 0x7c, base, Some(22), None),
        block(4, "BLOCK_KEY0", &["BLOCK4"], 8, 0x9c, base, Some(23), Some(0)),
        block(5, "BLOCK_KEY1", &["BLOCK5"], 8, 0xbc, base, Some(24), Some(1)),
        block(6, "BLOCK_KEY2", &["BLOCK6"], 8, 0xdc, base, Some(25), Some(2)),
        block(7, "BLOCK_KEY3", &["BLOCK7"], 8, 0xfc, base, Some(26), Some(3)),
        block(8, "BLOCK_KEY4", &["BLOCK8"], 8, 0x11c, base, Some(27), Some(4)),
        block(9, "BLOCK_KEY5", &["BLOCK9"], 8, 0x13c, base, Some(28), Some(5)),
        block(10, "BLOCK_SYS_DATA2", &["BLOCK10"], 8, 0x15c, base, Some(29), Some(6)),
    ]
}

/// Controller registers shared by all chips with the second generation
/// controller.
pub(crate) const fn controller_v2(base: u32) -> Controller {
    Controller {
        conf_reg: base + 0x1cc,
        status_reg: base + 0x1d0,
        cmd_reg: base + 0x1d4,
        write_op_code: 0x5a5a,
        read_op_code: 0x5aa5,
        check_value_reg: Some(base + 0x20),
        block_select: true,
    }
}

/// Size of the register window of the second generation controller
pub(crate) const MEM_SIZE_V2: u32 = 0x200;

/// Builds the field table of a second generation chip: the given block 0
/// fields followed by the fields of blocks 1-10, which all of these chips
/// share.
///
/// The key blocks are listed as whole-block fields so that they can be read,
/// burned and protected by name.
macro_rules! v2_fields {
    ($($field:expr),* $(,)?) => {
        &[
            $($field,)*
            $crate::target::efuse::EfuseField::new("MAC", 1, 0, 0, 48)
                .kind($crate::target::efuse::FieldKind::Mac)
                .category($crate::target::efuse::Category::Identity)
                .wr_dis(20),
            $crate::target::efuse::EfuseField::new("OPTIONAL_UNIQUE_ID", 2, 0, 0, 128)
                .category($crate::target::efuse::Category::Identity)
                .wr_dis(21),
            $crate::target::efuse::EfuseField::new("BLOCK_USR_DATA", 3, 0, 0, 256)
                .category($crate::target::efuse::Category::User)
                .wr_dis(22),
            $crate::target::efuse::EfuseField::new("BLOCK_KEY0", 4, 0, 0, 256)
                .category($crate::target::efuse::Category::Security)
                .wr_dis(23)
                .rd_dis(0),
            $crate::target::efuse::EfuseField::new("BLOCK_KEY1", 5, 0, 0, 256)
                .category($crate::target::efuse::Category::Security)
                .wr_dis(24)
                .rd_dis(1),
            $crate::target::efuse::EfuseField::new("BLOCK_KEY2", 6, 0, 0, 256)
                .category($crate::target::efuse::Category::Security)
                .wr_dis(25)
                .rd_dis(2),
            $crate::target::efuse::EfuseField::new("BLOCK_KEY3", 7, 0, 0, 256)
                .category($crate::target::efuse::Category::Security)
                .wr_dis(26)
                .rd_dis(3),
            $crate::target::efuse::EfuseField::new("BLOCK_KEY4", 8, 0, 0, 256)
                .category($crate::target::efuse::Category::Security)
                .wr_dis(27)
                .rd_dis(4),
            $crate::target::efuse::EfuseField::new("BLOCK_KEY5", 9, 0, 0, 256)
                .category($crate::target::efuse::Category::Security)
                .wr_dis(28)
                .rd_dis(5),
            $crate::target::efuse::EfuseField::new("BLOCK_SYS_DATA2", 10, 0, 0, 256)
                .category($crate::target::efuse::Category::User)
                .wr_dis(29)
                .rd_dis(6),
        ]
    };
}

pub(crate) use v2_fields;
