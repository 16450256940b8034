use std::{
    fs,
    path::{Path, PathBuf},
};

use log::{debug, info};

use super::EfuseBackend;
use crate::{
    coding::decode_three_quarters,
    connection::reset::ResetBeforeOperation,
    error::Error,
    target::{
        efuse::{CodingRule, CodingScheme, EfuseBlock, EfuseLayout},
        Chip,
        CHIP_DETECT_MAGIC_REG_ADDR,
    },
};

/// An emulated chip whose register window lives in memory.
///
/// When created with a file path the window is loaded from and persisted to
/// that file as a raw little-endian image.
pub struct EmulatedBackend {
    layout: &'static EfuseLayout,
    mem: Vec<u32>,
    path: Option<PathBuf>,
    dirty: bool,
}

impl EmulatedBackend {
    /// Emulate `chip`, loading its state from `path` if given.
    ///
    /// A missing file is created with every eFuse unburned.
    pub fn new(chip: Chip, path: Option<PathBuf>) -> Result<Self, Error> {
        let layout = chip.efuse_layout();
        let words = (layout.mem_size / 4) as usize;

        let (mem, fresh) = match &path {
            Some(path) if path.exists() => {
                debug!("Loading eFuse image {}", path.display());
                (load(path, layout.mem_size as usize)?, false)
            }
            Some(path) => {
                info!("Creating eFuse image {}", path.display());
                (vec![0; words], true)
            }
            None => (vec![0; words], false),
        };

        let mut backend = Self {
            layout,
            mem,
            path,
            dirty: fresh,
        };

        if fresh {
            backend.persist()?;
        }

        Ok(backend)
    }

    /// Emulate `chip` without backing file
    pub fn in_memory(chip: Chip) -> Self {
        let layout = chip.efuse_layout();

        Self {
            layout,
            mem: vec![0; (layout.mem_size / 4) as usize],
            path: None,
            dirty: false,
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    fn index(&self, address: u32) -> Result<usize, Error> {
        if address % 4 != 0 || !self.layout.contains(address) {
            return Err(Error::EmulatedAddressOutOfRange(address));
        }

        Ok(((address - self.layout.mem_base) / 4) as usize)
    }

    fn word(&self, address: u32) -> u32 {
        self.index(address).map(|i| self.mem[i]).unwrap_or_default()
    }

    fn set_word(&mut self, address: u32, value: u32) {
        if let Ok(i) = self.index(address) {
            self.mem[i] = value;
        }
    }

    /// Bit `bit` of the block 0 field `name`, as currently burned
    fn protection_bit(&self, name: &str, bit: Option<u8>) -> bool {
        let (Some(field), Some(bit), Some(block0)) =
            (self.layout.field(name), bit, self.layout.block(0))
        else {
            return false;
        };

        let absolute = field.bit_start + bit as u32;
        let word = self.word(block0.read_address + (absolute / 32) * 4);

        word & (1 << (absolute % 32)) != 0
    }

    fn read_protected(&self, address: u32) -> bool {
        self.layout.blocks.iter().any(|block| {
            let end = block.read_address + block.size() as u32;
            (block.read_address..end).contains(&address)
                && self.protection_bit("RD_DIS", block.read_disable)
        })
    }

    fn coding_scheme(&self, block: &EfuseBlock) -> CodingScheme {
        match (self.layout.coding, block.index) {
            (_, 0) => CodingScheme::None,
            (CodingRule::ReedSolomon, _) => CodingScheme::ReedSolomon,
            (CodingRule::Configurable, _) => {
                let value = self
                    .layout
                    .field("CODING_SCHEME")
                    .map(|field| {
                        let word = self.word(self.layout.blocks[0].read_address + field.word * 4);
                        (word >> (field.bit_start % 32)) & ((1 << field.bit_count) - 1)
                    })
                    .unwrap_or_default();

                CodingScheme::from_field(value as u64)
            }
        }
    }

    /// Burn the write registers of `block` into its read registers
    fn program_block(&mut self, block: &EfuseBlock) {
        if self.protection_bit("WR_DIS", block.write_disable) {
            debug!("{} is write protected, ignoring program command", block.name);
            return;
        }

        let data = (0..block.length as u32)
            .map(|i| self.word(block.write_address + i * 4))
            .collect::<Vec<_>>();

        let data = match self.coding_scheme(block) {
            CodingScheme::ThreeQuarters => {
                let mut encoded = [0u8; 32];
                for (chunk, word) in encoded.chunks_exact_mut(4).zip(&data) {
                    chunk.copy_from_slice(&word.to_le_bytes());
                }

                let mut decoded = decode_three_quarters(&encoded)
                    .chunks_exact(4)
                    .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect::<Vec<_>>();
                decoded.resize(block.length as usize, 0);
                decoded
            }
            _ => data,
        };

        for (i, value) in data.into_iter().enumerate() {
            let address = block.read_address + i as u32 * 4;
            let burned = self.word(address) | value;
            self.set_word(address, burned);
        }
    }

    fn clear_write_registers(&mut self, block: &EfuseBlock) {
        for i in 0..block.length as u32 {
            self.set_word(block.write_address + i * 4, 0);
        }
    }

    fn execute(&mut self, command: u32) -> Result<(), Error> {
        let layout = self.layout;
        let controller = layout.controller;

        if command & controller.program_command(0) != 0 {
            if self.word(controller.conf_reg) != controller.write_op_code {
                debug!("Program command without write op code, ignoring");
            } else if controller.block_select {
                let index = ((command >> 2) & 0xf) as u8;
                let block = layout
                    .block(index)
                    .ok_or(Error::InvalidEfuseBlock(index as u32))?;

                self.program_block(block);
                // All blocks share the same programming registers
                self.clear_write_registers(block);
                if let Some(check) = controller.check_value_reg {
                    for i in 0..3 {
                        self.set_word(check + i * 4, 0);
                    }
                }
                self.dirty = true;
            } else {
                // Block 0 goes last so that protection bits burned together
                // with data do not block it
                for block in layout.blocks.iter().rev() {
                    self.program_block(block);
                    self.clear_write_registers(block);
                }
                self.dirty = true;
            }
        }

        self.set_word(controller.cmd_reg, 0);

        if self.dirty {
            self.persist()?;
        }

        Ok(())
    }

    fn persist(&mut self) -> Result<(), Error> {
        if let Some(path) = &self.path {
            let bytes = self
                .mem
                .iter()
                .flat_map(|word| word.to_le_bytes())
                .collect::<Vec<_>>();

            fs::write(path, bytes)
                .map_err(|e| Error::FileWriteError(path.display().to_string(), e))?;
        }

        self.dirty = false;
        Ok(())
    }
}

impl EfuseBackend for EmulatedBackend {
    fn chip_name(&self) -> &str {
        self.layout.chip.name()
    }

    fn connect(&mut self, _before: ResetBeforeOperation) -> Result<(), Error> {
        Ok(())
    }

    fn read_reg(&mut self, address: u32) -> Result<u32, Error> {
        if address == CHIP_DETECT_MAGIC_REG_ADDR {
            return Ok(self.layout.chip.magic_values()[0]);
        }

        let index = self.index(address)?;
        if self.read_protected(address) {
            return Ok(0);
        }

        Ok(self.mem[index])
    }

    fn write_reg(&mut self, address: u32, value: u32) -> Result<(), Error> {
        let index = self.index(address)?;
        self.mem[index] = value;

        if address == self.layout.controller.cmd_reg {
            self.execute(value)?;
        }

        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        if self.dirty {
            self.persist()?;
        }

        Ok(())
    }
}

fn load(path: &Path, expected: usize) -> Result<Vec<u32>, Error> {
    let bytes =
        fs::read(path).map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;

    if bytes.len() != expected {
        return Err(Error::CorruptEfuseFile {
            path: path.to_owned(),
            len: bytes.len(),
            expected,
        });
    }

    Ok(bytes
        .chunks_exact(4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("espefuse-{}-{name}.bin", std::process::id()))
    }

    #[test]
    fn creates_missing_file() {
        let path = temp_path("create");
        let _ = fs::remove_file(&path);

        let backend = EmulatedBackend::new(Chip::Esp32c3, Some(path.clone())).unwrap();
        assert_eq!(backend.path(), Some(path.as_path()));

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), Chip::Esp32c3.efuse_layout().mem_size as usize);
        assert!(bytes.iter().all(|b| *b == 0));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejects_truncated_file() {
        let path = temp_path("corrupt");
        fs::write(&path, [0u8; 12]).unwrap();

        assert!(matches!(
            EmulatedBackend::new(Chip::Esp32s2, Some(path.clone())),
            Err(Error::CorruptEfuseFile { len: 12, expected: 0x200, .. })
        ));

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn rejects_addresses_outside_the_window() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);

        assert!(matches!(
            backend.read_reg(0x3ff5_a000 + 0x120),
            Err(Error::EmulatedAddressOutOfRange(_))
        ));
        assert!(matches!(
            backend.write_reg(0x6000_0000, 1),
            Err(Error::EmulatedAddressOutOfRange(_))
        ));
    }

    #[test]
    fn reports_magic_value() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32h2);

        let magic = backend.read_reg(CHIP_DETECT_MAGIC_REG_ADDR).unwrap();
        assert_eq!(Chip::from_magic(magic).unwrap(), Chip::Esp32h2);
    }

    #[test]
    fn programs_selected_block() {
        let layout = Chip::Esp32c3.efuse_layout();
        let controller = layout.controller;
        let key0 = layout.block(4).unwrap();
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);

        backend.write_reg(key0.write_address, 0xdead_beef).unwrap();
        backend
            .write_reg(controller.conf_reg, controller.write_op_code)
            .unwrap();
        backend
            .write_reg(controller.cmd_reg, controller.program_command(4))
            .unwrap();

        assert_eq!(backend.read_reg(controller.cmd_reg).unwrap(), 0);
        assert_eq!(backend.read_reg(key0.read_address).unwrap(), 0xdead_beef);
        assert_eq!(backend.read_reg(key0.write_address).unwrap(), 0);
        // Other blocks stay untouched
        assert_eq!(backend.read_reg(layout.block(5).unwrap().read_address).unwrap(), 0);
    }

    #[test]
    fn ignores_program_without_write_op_code() {
        let layout = Chip::Esp32.efuse_layout();
        let controller = layout.controller;
        let block3 = layout.block(3).unwrap();

        let path = temp_path("ignored-program");
        let _ = fs::remove_file(&path);
        let mut backend = EmulatedBackend::new(Chip::Esp32, Some(path.clone())).unwrap();

        // Anything rewriting the file would replace this marker
        let marker = vec![0xa5; layout.mem_size as usize];
        fs::write(&path, &marker).unwrap();

        backend.write_reg(block3.write_address, 0x1).unwrap();
        backend
            .write_reg(controller.cmd_reg, controller.program_command(3))
            .unwrap();
        backend.close().unwrap();

        assert_eq!(backend.read_reg(block3.read_address).unwrap(), 0);
        assert_eq!(fs::read(&path).unwrap(), marker);

        fs::remove_file(&path).unwrap();
    }

    #[test]
    fn hides_read_protected_blocks() {
        let layout = Chip::Esp32c3.efuse_layout();
        let controller = layout.controller;
        let block0 = layout.block(0).unwrap();
        let key1 = layout.block(5).unwrap();
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);

        let burn = |backend: &mut EmulatedBackend, address: u32, value: u32, block: u8| {
            backend.write_reg(address, value).unwrap();
            backend
                .write_reg(controller.conf_reg, controller.write_op_code)
                .unwrap();
            backend
                .write_reg(controller.cmd_reg, controller.program_command(block))
                .unwrap();
        };

        burn(&mut backend, key1.write_address, 0x1234_5678, 5);
        assert_eq!(backend.read_reg(key1.read_address).unwrap(), 0x1234_5678);

        // RD_DIS starts at bit 32, bit 1 protects BLOCK_KEY1
        burn(&mut backend, block0.write_address + 4, 1 << 1, 0);
        assert_eq!(backend.read_reg(key1.read_address).unwrap(), 0);
    }
}
