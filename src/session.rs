//! A typed view of the eFuses of one chip
//!
//! [EfuseSession] binds a backend to the [EfuseLayout] of its chip. It caches
//! the content of every block, reads and decodes fields, and collects the
//! bits to burn so that all of them are validated before the first register
//! is written.

use std::{collections::BTreeMap, fmt, thread::sleep, time::Duration};

use log::{debug, info, warn};

use crate::{
    backend::EfuseBackend,
    coding::{encode_three_quarters, rs_check_values, RS_DATA_LEN, THREE_QUARTERS_DATA_LEN},
    error::Error,
    operations::OperationRegistry,
    target::{
        efuse::{CodingRule, CodingScheme, EfuseBlock, EfuseField, EfuseLayout, FieldKind},
        Chip,
    },
};

const MAX_COMMAND_POLLS: usize = 1000;
const COMMAND_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// The decoded value of an eFuse field
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Uint(u64),
    /// Raw bytes, least significant byte first
    Bytes(Vec<u8>),
}

impl FieldValue {
    /// Encode the value into the bytes stored for `field`
    pub fn to_bytes(&self, field: &EfuseField) -> Result<Vec<u8>, Error> {
        let len = field.byte_len();
        let invalid = |reason: String| Error::InvalidValue {
            name: field.name.to_owned(),
            value: self.to_string(),
            reason,
        };

        match self {
            FieldValue::Bool(value) => Ok(vec![*value as u8]),
            FieldValue::Uint(value) => {
                if field.bit_count < 64 && *value >> field.bit_count != 0 {
                    return Err(invalid(format!(
                        "the field is only {} bits wide",
                        field.bit_count
                    )));
                }

                Ok(value.to_le_bytes()[..len.min(8)].to_vec())
            }
            FieldValue::Bytes(bytes) => {
                if bytes.len() != len {
                    return Err(invalid(format!("expected {len} bytes, got {}", bytes.len())));
                }

                Ok(bytes.clone())
            }
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Bool(value) => write!(f, "{}", if *value { "True" } else { "False" }),
            FieldValue::Uint(value) => write!(f, "{value} ({value:#x})"),
            FieldValue::Bytes(bytes) => {
                for byte in bytes.iter().rev() {
                    write!(f, "{byte:02x}")?;
                }
                Ok(())
            }
        }
    }
}

/// Typed access to the eFuses of a chip
pub struct EfuseSession<'a> {
    backend: &'a mut dyn EfuseBackend,
    layout: &'static EfuseLayout,
    connected: bool,
    debug: bool,
    do_not_confirm: bool,
    /// Read registers of every block, in the order of the block table
    blocks: Vec<Vec<u32>>,
    /// Bits waiting to be burned, per block index
    pending: BTreeMap<u8, Vec<u32>>,
}

impl<'a> EfuseSession<'a> {
    /// Bind `backend` to `layout`.
    ///
    /// # Panics
    ///
    /// Panics if `layout` does not describe the chip of `backend`.
    pub fn new(
        backend: &'a mut dyn EfuseBackend,
        layout: &'static EfuseLayout,
        skip_connect: bool,
        debug: bool,
        do_not_confirm: bool,
    ) -> Result<Self, Error> {
        assert_eq!(
            backend.chip_name(),
            layout.chip.name(),
            "eFuse layout bound to the wrong chip"
        );

        let mut session = Self {
            backend,
            layout,
            connected: !skip_connect,
            debug,
            do_not_confirm,
            blocks: layout
                .blocks
                .iter()
                .map(|b| vec![0; b.length as usize])
                .collect(),
            pending: BTreeMap::new(),
        };

        if session.connected {
            session.reload()?;
        }

        Ok(session)
    }

    pub fn layout(&self) -> &'static EfuseLayout {
        self.layout
    }

    pub fn chip(&self) -> Chip {
        self.layout.chip
    }

    /// Whether the eFuse values were read from a device
    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Whether burning proceeds without asking for confirmation
    pub fn do_not_confirm(&self) -> bool {
        self.do_not_confirm
    }

    fn read_reg(&mut self, address: u32) -> Result<u32, Error> {
        let value = self.backend.read_reg(address)?;
        if self.debug {
            debug!("read_reg({address:#010x}) -> {value:#010x}");
        }

        Ok(value)
    }

    fn write_reg(&mut self, address: u32, value: u32) -> Result<(), Error> {
        if self.debug {
            debug!("write_reg({address:#010x}, {value:#010x})");
        }

        self.backend.write_reg(address, value)
    }

    /// Read the content of every block from the device
    pub fn reload(&mut self) -> Result<(), Error> {
        if !self.connected {
            return Err(Error::NotConnected);
        }

        for (i, block) in self.layout.blocks.iter().enumerate() {
            let mut words = Vec::with_capacity(block.length as usize);
            for word in 0..block.length as u32 {
                words.push(self.read_reg(block.read_address + word * 4)?);
            }

            self.blocks[i] = words;
        }

        Ok(())
    }

    /// Look up a block by name, alias or index
    pub fn block(&self, name: &str) -> Result<&'static EfuseBlock, Error> {
        self.layout
            .find_block(name)
            .ok_or_else(|| Error::UnknownBlock(name.to_owned()))
    }

    /// Look up a field by name
    pub fn field(&self, name: &str) -> Result<&'static EfuseField, Error> {
        self.layout.field(name).ok_or_else(|| Error::UnknownField {
            chip: self.chip(),
            name: name.to_owned(),
        })
    }

    fn block_position(&self, index: u8) -> Result<usize, Error> {
        self.layout
            .blocks
            .iter()
            .position(|b| b.index == index)
            .ok_or(Error::InvalidEfuseBlock(index as u32))
    }

    /// The cached read registers of a block
    pub fn block_words(&self, index: u8) -> Result<&[u32], Error> {
        let position = self.block_position(index)?;
        Ok(&self.blocks[position])
    }

    fn field_bytes(&self, field: &EfuseField) -> Result<Vec<u8>, Error> {
        let words = self.block_words(field.block as u8)?;
        Ok(read_bits(words, field.bit_start, field.bit_count))
    }

    /// Read and decode a field
    pub fn read_field(&self, field: &EfuseField) -> Result<FieldValue, Error> {
        let bytes = self.field_bytes(field)?;

        Ok(match field.kind {
            FieldKind::Bool => FieldValue::Bool(bytes[0] & 1 != 0),
            FieldKind::Uint => FieldValue::Uint(
                bytes
                    .iter()
                    .rev()
                    .fold(0u64, |acc, byte| (acc << 8) | *byte as u64),
            ),
            FieldKind::Bytes | FieldKind::Mac => FieldValue::Bytes(bytes),
        })
    }

    /// Read a field by name
    pub fn read(&self, name: &str) -> Result<FieldValue, Error> {
        self.read_field(self.field(name)?)
    }

    /// Whether protection bit `bit` of the block 0 field `name` is burned
    fn protection_bit(&self, name: &str, bit: Option<u8>) -> Result<bool, Error> {
        let Some(bit) = bit else {
            return Ok(false);
        };

        let field = self.field(name)?;
        let absolute = field.bit_start + bit as u32;
        let words = self.block_words(0)?;

        Ok(words
            .get((absolute / 32) as usize)
            .is_some_and(|word| word & (1 << (absolute % 32)) != 0))
    }

    pub fn write_disable_bit(&self, field: &EfuseField) -> Option<u8> {
        self.layout.write_disable_bit(field)
    }

    pub fn read_disable_bit(&self, field: &EfuseField) -> Option<u8> {
        self.layout.read_disable_bit(field)
    }

    pub fn is_write_protected(&self, field: &EfuseField) -> Result<bool, Error> {
        self.protection_bit("WR_DIS", self.write_disable_bit(field))
    }

    pub fn is_read_protected(&self, field: &EfuseField) -> Result<bool, Error> {
        self.protection_bit("RD_DIS", self.read_disable_bit(field))
    }

    fn is_block_write_protected(&self, block: &EfuseBlock) -> Result<bool, Error> {
        self.protection_bit("WR_DIS", block.write_disable)
    }

    fn is_block_read_protected(&self, block: &EfuseBlock) -> Result<bool, Error> {
        self.protection_bit("RD_DIS", block.read_disable)
    }

    /// Coding scheme applied to the data of `block`
    pub fn coding_scheme(&self, block: &EfuseBlock) -> Result<CodingScheme, Error> {
        Ok(match (self.layout.coding, block.index) {
            (_, 0) => CodingScheme::None,
            (CodingRule::ReedSolomon, _) => CodingScheme::ReedSolomon,
            (CodingRule::Configurable, _) => match self.read("CODING_SCHEME")? {
                FieldValue::Uint(value) => CodingScheme::from_field(value),
                _ => CodingScheme::None,
            },
        })
    }

    /// Number of bytes that can be burned into `block`
    pub fn block_capacity(&self, block: &EfuseBlock) -> Result<usize, Error> {
        Ok(match self.coding_scheme(block)? {
            CodingScheme::ThreeQuarters => THREE_QUARTERS_DATA_LEN,
            _ => block.size(),
        })
    }

    /// Whether any bits are waiting to be burned
    pub fn has_pending(&self) -> bool {
        self.pending.values().any(|mask| mask.iter().any(|w| *w != 0))
    }

    fn pending_mask(&mut self, block: &EfuseBlock) -> &mut Vec<u32> {
        self.pending
            .entry(block.index)
            .or_insert_with(|| vec![0; block.length as usize])
    }

    /// Stage `requested` bytes at `bit_start` of `block`.
    ///
    /// Bits which are already burned are left alone, bits which would have to
    /// be cleared are an error.
    fn stage_region(
        &mut self,
        name: &str,
        block: &'static EfuseBlock,
        bit_start: u32,
        bit_count: u32,
        requested: &[u8],
    ) -> Result<bool, Error> {
        let position = self.block_position(block.index)?;
        let burned = read_bits(&self.blocks[position], bit_start, bit_count);

        if burned == requested {
            warn!("{name} already has the requested value, skipping");
            return Ok(false);
        }

        if burned.iter().zip(requested).any(|(b, r)| b & !r != 0) {
            return Err(Error::CannotClearBits {
                name: name.to_owned(),
                burned: low_u128(&burned),
                requested: low_u128(requested),
            });
        }

        let new_bits = burned
            .iter()
            .zip(requested)
            .map(|(b, r)| r & !b)
            .collect::<Vec<_>>();
        write_bits(self.pending_mask(block), bit_start, bit_count, &new_bits);

        Ok(true)
    }

    /// Stage a new value for `field`
    pub fn stage_field(&mut self, field: &EfuseField, value: &FieldValue) -> Result<bool, Error> {
        let requested = value.to_bytes(field)?;
        let block = self
            .layout
            .block(field.block as u8)
            .ok_or(Error::InvalidEfuseBlock(field.block))?;

        if self.is_write_protected(field)? {
            return Err(Error::WriteProtected(field.name.to_owned()));
        }

        let staged =
            self.stage_region(field.name, block, field.bit_start, field.bit_count, &requested)?;
        if staged {
            info!("Burning {} = {}", field.name, value);
        }

        Ok(staged)
    }

    /// Stage individual bits of a block
    pub fn stage_bits(&mut self, block: &'static EfuseBlock, bits: &[u32]) -> Result<(), Error> {
        if self.is_block_write_protected(block)? {
            return Err(Error::WriteProtected(block.name.to_owned()));
        }

        let size = block.length as u32 * 32;
        let position = self.block_position(block.index)?;

        for &bit in bits {
            if bit >= size {
                return Err(Error::InvalidValue {
                    name: block.name.to_owned(),
                    value: bit.to_string(),
                    reason: format!("the block has only {size} bits"),
                });
            }

            let word = (bit / 32) as usize;
            let mask = 1 << (bit % 32);

            if self.blocks[position][word] & mask != 0 {
                warn!("Bit {bit} of {} is already burned", block.name);
            } else {
                self.pending_mask(block)[word] |= mask;
            }
        }

        Ok(())
    }

    /// Stage raw data for a block, starting at byte `offset`
    pub fn stage_block_data(
        &mut self,
        block: &'static EfuseBlock,
        offset: usize,
        data: &[u8],
    ) -> Result<(), Error> {
        let capacity = self.block_capacity(block)?;
        if offset + data.len() > capacity {
            return Err(Error::DataTooLarge {
                block: block.name.to_owned(),
                len: offset + data.len(),
                max: capacity,
            });
        }

        if self.is_block_write_protected(block)? {
            return Err(Error::WriteProtected(block.name.to_owned()));
        }

        info!("Burning {} bytes into {} at offset {offset}", data.len(), block.name);
        self.stage_region(
            block.name,
            block,
            offset as u32 * 8,
            data.len() as u32 * 8,
            data,
        )?;

        Ok(())
    }

    /// Stage the protection bit `bit` of the block 0 field `name`
    fn stage_protection(&mut self, name: &str, bit: u8) -> Result<(), Error> {
        let field = self.field(name)?;
        let block = self.layout.block(0).ok_or(Error::InvalidEfuseBlock(0))?;

        self.stage_bits(block, &[field.bit_start + bit as u32])
    }

    /// Stage the `WR_DIS` bit of `field`
    pub fn stage_write_protect(&mut self, field: &EfuseField) -> Result<(), Error> {
        let bit = self
            .write_disable_bit(field)
            .ok_or_else(|| Error::NotProtectable(field.name.to_owned()))?;

        if self.is_write_protected(field)? {
            warn!("{} is already write protected", field.name);
            return Ok(());
        }

        info!("Write protecting {}", field.name);
        self.stage_protection("WR_DIS", bit)
    }

    /// Stage the `RD_DIS` bit of `field`
    pub fn stage_read_protect(&mut self, field: &EfuseField) -> Result<(), Error> {
        let bit = self
            .read_disable_bit(field)
            .ok_or_else(|| Error::NotProtectable(field.name.to_owned()))?;

        if self.is_read_protected(field)? {
            warn!("{} is already read protected", field.name);
            return Ok(());
        }

        // The RD_DIS bits themselves must remain writable
        if let Ok(rd_dis) = self.field("RD_DIS") {
            if self.is_write_protected(rd_dis)? {
                return Err(Error::WriteProtected(rd_dis.name.to_owned()));
            }
        }

        info!("Read protecting {}", field.name);
        self.stage_protection("RD_DIS", bit)
    }

    /// Drop all staged bits
    pub fn discard(&mut self) {
        self.pending.clear();
    }

    /// Burn every staged bit and verify the result
    pub fn burn_all(&mut self) -> Result<(), Error> {
        if !self.has_pending() {
            info!("Nothing to burn");
            self.pending.clear();
            return Ok(());
        }

        if !self.connected {
            return Err(Error::NotConnected);
        }

        let pending = std::mem::take(&mut self.pending);
        let mut writes = Vec::with_capacity(pending.len());

        // Validate everything before the first register is written
        for (&index, mask) in pending.iter().filter(|(_, m)| m.iter().any(|w| *w != 0)) {
            let block = self
                .layout
                .block(index)
                .ok_or(Error::InvalidEfuseBlock(index as u32))?;
            let scheme = self.coding_scheme(block)?;

            if scheme == CodingScheme::Repeat {
                return Err(Error::UnsupportedCodingScheme {
                    block: block.name.to_owned(),
                    scheme: scheme.to_string(),
                });
            }

            if scheme.is_coded() && self.block_words(index)?.iter().any(|w| *w != 0) {
                return Err(Error::BlockAlreadyWritten(block.name.to_owned()));
            }

            writes.push((block, encode(block, scheme, mask)?));
        }

        // Protection bits live in block 0, which is burned after the data
        writes.sort_by_key(|(block, _)| (block.index == 0, block.index));

        let controller = self.layout.controller;
        if controller.block_select {
            for (block, words) in &writes {
                debug!("Programming {}", block.name);
                self.load_write_registers(block, words)?;
                self.program(controller.program_command(block.index))?;
            }
        } else {
            for (block, words) in &writes {
                self.load_write_registers(block, words)?;
            }
            self.program(controller.program_command(0))?;
        }

        self.reload()?;
        self.verify(&pending)?;

        info!("Burned {} block(s) successfully", writes.len());
        Ok(())
    }

    fn load_write_registers(&mut self, block: &EfuseBlock, words: &[u32]) -> Result<(), Error> {
        let (data, check) = words.split_at(words.len().min(8));

        for (i, word) in data.iter().enumerate() {
            self.write_reg(block.write_address + i as u32 * 4, *word)?;
        }

        if let Some(check_reg) = self.layout.controller.check_value_reg {
            for (i, word) in check.iter().enumerate() {
                self.write_reg(check_reg + i as u32 * 4, *word)?;
            }
        }

        Ok(())
    }

    /// Run a program command followed by a reload of the read registers
    fn program(&mut self, command: u32) -> Result<(), Error> {
        let controller = self.layout.controller;

        self.write_reg(controller.conf_reg, controller.write_op_code)?;
        self.write_reg(controller.cmd_reg, command)?;
        self.wait_for_idle()?;

        self.write_reg(controller.conf_reg, controller.read_op_code)?;
        self.write_reg(controller.cmd_reg, controller.read_command())?;
        self.wait_for_idle()
    }

    fn wait_for_idle(&mut self) -> Result<(), Error> {
        let cmd_reg = self.layout.controller.cmd_reg;

        for _ in 0..MAX_COMMAND_POLLS {
            if self.read_reg(cmd_reg)? == 0 {
                return Ok(());
            }
            sleep(COMMAND_POLL_INTERVAL);
        }

        Err(Error::ControllerTimeout)
    }

    fn verify(&self, burned: &BTreeMap<u8, Vec<u32>>) -> Result<(), Error> {
        for (&index, mask) in burned {
            let block = self
                .layout
                .block(index)
                .ok_or(Error::InvalidEfuseBlock(index as u32))?;

            if self.is_block_read_protected(block)? {
                debug!("{} is read protected, skipping verification", block.name);
                continue;
            }

            let words = self.block_words(index)?;
            if mask.iter().zip(words).any(|(m, w)| w & m != *m) {
                return Err(Error::BurnVerifyFailed(block.name.to_owned()));
            }
        }

        Ok(())
    }
}

/// Words to load into the write registers of `block`, followed by the check
/// values of coded blocks
fn encode(block: &EfuseBlock, scheme: CodingScheme, mask: &[u32]) -> Result<Vec<u32>, Error> {
    let bytes = mask.iter().flat_map(|w| w.to_le_bytes()).collect::<Vec<_>>();

    Ok(match scheme {
        CodingScheme::ReedSolomon => {
            let mut data = [0u8; RS_DATA_LEN];
            let len = bytes.len().min(RS_DATA_LEN);
            data[..len].copy_from_slice(&bytes[..len]);

            let mut words = to_words(&data);
            words.truncate(block.length as usize);
            words.resize(8, 0);
            words.extend(to_words(&rs_check_values(&data)));
            words
        }
        CodingScheme::ThreeQuarters => {
            if bytes[THREE_QUARTERS_DATA_LEN..].iter().any(|b| *b != 0) {
                return Err(Error::DataTooLarge {
                    block: block.name.to_owned(),
                    len: bytes.len(),
                    max: THREE_QUARTERS_DATA_LEN,
                });
            }

            to_words(&encode_three_quarters(&bytes[..THREE_QUARTERS_DATA_LEN])?)
        }
        CodingScheme::None | CodingScheme::Repeat => mask.to_vec(),
    })
}

fn to_words(bytes: &[u8]) -> Vec<u32> {
    bytes
        .chunks(4)
        .map(|b| {
            let mut word = [0u8; 4];
            word[..b.len()].copy_from_slice(b);
            u32::from_le_bytes(word)
        })
        .collect()
}

/// Extract `count` bits starting at bit `start` of `words`
fn read_bits(words: &[u32], start: u32, count: u32) -> Vec<u8> {
    let mut out = vec![0u8; count.div_ceil(8) as usize];

    for i in 0..count {
        let bit = start + i;
        let word = words.get((bit / 32) as usize).copied().unwrap_or_default();
        if (word >> (bit % 32)) & 1 != 0 {
            out[(i / 8) as usize] |= 1 << (i % 8);
        }
    }

    out
}

/// Set the bits of `bytes` at bit `start` of `words`
fn write_bits(words: &mut [u32], start: u32, count: u32, bytes: &[u8]) {
    for i in 0..count {
        let set = bytes
            .get((i / 8) as usize)
            .is_some_and(|byte| (byte >> (i % 8)) & 1 != 0);

        let bit = start + i;
        if let Some(word) = words.get_mut((bit / 32) as usize) {
            if set {
                *word |= 1 << (bit % 32);
            }
        }
    }
}

fn low_u128(bytes: &[u8]) -> u128 {
    bytes
        .iter()
        .take(16)
        .rev()
        .fold(0u128, |acc, byte| (acc << 8) | *byte as u128)
}

/// Bind a backend to the eFuse layout and operations of its chip.
///
/// Unless `skip_connect` is set every block is read once up front.
pub fn bind(
    backend: &mut dyn EfuseBackend,
    skip_connect: bool,
    debug: bool,
    do_not_confirm: bool,
) -> Result<(EfuseSession<'_>, OperationRegistry), Error> {
    let chip = Chip::from_name(backend.chip_name())?;
    debug!("Binding eFuse view of {}", chip.name());

    let session = EfuseSession::new(
        backend,
        chip.efuse_layout(),
        skip_connect,
        debug,
        do_not_confirm,
    )?;

    Ok((session, OperationRegistry::for_chip(chip)))
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::backend::EmulatedBackend;

    #[test]
    fn bit_helpers_are_inverse() {
        let mut words = [0u32; 2];
        write_bits(&mut words, 30, 6, &[0b10_1101]);

        assert_eq!(words, [0b01 << 30, 0b1011]);
        assert_eq!(read_bits(&words, 30, 6), vec![0b10_1101]);
    }

    #[test]
    fn burns_and_reads_back_fields() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let field = session.field("SPI_BOOT_CRYPT_CNT").unwrap();
        assert_eq!(session.read_field(field).unwrap(), FieldValue::Uint(0));

        session.stage_field(field, &FieldValue::Uint(0b001)).unwrap();
        session.burn_all().unwrap();
        assert_eq!(session.read_field(field).unwrap(), FieldValue::Uint(1));

        session.stage_field(field, &FieldValue::Uint(0b011)).unwrap();
        session.burn_all().unwrap();
        assert_eq!(session.read_field(field).unwrap(), FieldValue::Uint(3));
    }

    #[test]
    fn burned_bits_can_not_be_cleared() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32s2);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let field = session.field("WDT_DELAY_SEL").unwrap();
        session.stage_field(field, &FieldValue::Uint(2)).unwrap();
        session.burn_all().unwrap();

        assert!(matches!(
            session.stage_field(field, &FieldValue::Uint(1)),
            Err(Error::CannotClearBits { burned: 2, requested: 1, .. })
        ));
    }

    #[test]
    fn rejects_values_wider_than_the_field() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let field = session.field("KEY_PURPOSE_0").unwrap();
        assert!(matches!(
            session.stage_field(field, &FieldValue::Uint(16)),
            Err(Error::InvalidValue { .. })
        ));
        assert!(!session.has_pending());
    }

    #[test]
    fn write_protection_blocks_burning() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let field = session.field("KEY_PURPOSE_1").unwrap();
        session.stage_write_protect(field).unwrap();
        session.burn_all().unwrap();

        assert!(session.is_write_protected(field).unwrap());
        assert!(matches!(
            session.stage_field(field, &FieldValue::Uint(4)),
            Err(Error::WriteProtected(_))
        ));
    }

    #[test]
    fn reed_solomon_block_can_only_be_written_once() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32s3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let block = session.block("BLOCK_USR_DATA").unwrap();
        session.stage_block_data(block, 0, &[0x11; 4]).unwrap();
        session.burn_all().unwrap();
        assert_eq!(session.block_words(3).unwrap()[0], 0x1111_1111);

        session.stage_block_data(block, 4, &[0x22; 4]).unwrap();
        assert!(matches!(
            session.burn_all(),
            Err(Error::BlockAlreadyWritten(_))
        ));
        // Nothing was written
        assert_eq!(session.block_words(3).unwrap()[1], 0);
    }

    #[test]
    fn three_quarters_coding_limits_block_size() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let coding = session.field("CODING_SCHEME").unwrap();
        session.stage_field(coding, &FieldValue::Uint(1)).unwrap();
        session.burn_all().unwrap();

        let block3 = session.block("BLOCK3").unwrap();
        assert_eq!(
            session.coding_scheme(block3).unwrap(),
            CodingScheme::ThreeQuarters
        );
        assert!(matches!(
            session.stage_block_data(block3, 0, &[0xaa; 32]),
            Err(Error::DataTooLarge { max: 24, .. })
        ));

        let data = (1..=24).collect::<Vec<u8>>();
        session.stage_block_data(block3, 0, &data).unwrap();
        session.burn_all().unwrap();

        assert_eq!(session.block_words(3).unwrap()[0], 0x0403_0201);
        assert_eq!(session.block_words(3).unwrap()[5], 0x1817_1615);
    }

    #[test]
    fn repeat_coding_is_rejected() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let coding = session.field("CODING_SCHEME").unwrap();
        session.stage_field(coding, &FieldValue::Uint(2)).unwrap();
        session.burn_all().unwrap();

        let block2 = session.block("BLOCK2").unwrap();
        session.stage_bits(block2, &[0]).unwrap();
        assert!(matches!(
            session.burn_all(),
            Err(Error::UnsupportedCodingScheme { .. })
        ));
    }

    #[test]
    fn detached_session_does_not_touch_the_backend() {
        let mut backend = crate::backend::SerialBackend::detached(Chip::Esp32);
        let (mut session, registry) = bind(&mut backend, true, false, false).unwrap();

        assert!(!session.is_connected());
        assert!(registry.lookup("summary").is_ok());
        assert!(matches!(session.reload(), Err(Error::NotConnected)));
    }
}
