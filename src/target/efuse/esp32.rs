//! eFuse field definitions for the esp32

use super::{
    Category, CodingRule, Controller, EfuseBlock, EfuseField, EfuseLayout, FieldKind,
    FlashVoltageFields,
};
use crate::target::Chip;

/// All eFuse blocks available on this device.
pub(crate) const BLOCKS: &[EfuseBlock] = &[
    EfuseBlock {
        index: 0,
        name: "BLOCK0",
        aliases: &[],
        length: 7,
        read_address: 0x3ff5_a000,
        write_address: 0x3ff5_a01c,
        write_disable: None,
        read_disable: None,
    },
    EfuseBlock {
        index: 1,
        name: "BLOCK1",
        aliases: &["flash_encryption"],
        length: 8,
        read_address: 0x3ff5_a038,
        write_address: 0x3ff5_a098,
        write_disable: Some(7),
        read_disable: Some(0),
    },
    EfuseBlock {
        index: 2,
        name: "BLOCK2",
        aliases: &["secure_boot_v1", "secure_boot_v2"],
        length: 8,
        read_address: 0x3ff5_a058,
        write_address: 0x3ff5_a0b8,
        write_disable: Some(8),
        read_disable: Some(1),
    },
    EfuseBlock {
        index: 3,
        name: "BLOCK3",
        aliases: &[],
        length: 8,
        read_address: 0x3ff5_a078,
        write_address: 0x3ff5_a0d8,
        write_disable: Some(9),
        read_disable: Some(2),
    },
];

/// Defined eFuse registers and commands
pub(crate) mod defines {
    pub(crate) const DR_REG_EFUSE_BASE: u32 = 0x3ff5_a000;
    pub(crate) const EFUSE_MEM_SIZE: u32 = 0x120;
    pub(crate) const EFUSE_CONF_REG: u32 = DR_REG_EFUSE_BASE + 0x0fc;
    pub(crate) const EFUSE_STATUS_REG: u32 = DR_REG_EFUSE_BASE + 0x100;
    pub(crate) const EFUSE_CMD_REG: u32 = DR_REG_EFUSE_BASE + 0x104;
    pub(crate) const EFUSE_WRITE_OP_CODE: u32 = 0x5a5a;
    pub(crate) const EFUSE_READ_OP_CODE: u32 = 0x5aa5;
}

/// Disable programming of individual eFuses
pub const WR_DIS: EfuseField = EfuseField::new("WR_DIS", 0, 0, 0, 16)
    .category(Category::Efuse)
    .wr_dis(1);
/// Disable reading from BLOCK1-3
pub const RD_DIS: EfuseField = EfuseField::new("RD_DIS", 0, 0, 16, 4)
    .category(Category::Efuse)
    .wr_dis(0);
/// Flash encryption is enabled while an odd number of bits is set
pub const FLASH_CRYPT_CNT: EfuseField = EfuseField::new("FLASH_CRYPT_CNT", 0, 0, 20, 7)
    .category(Category::Security)
    .wr_dis(2);
/// Disable UART download mode (ECO3 and later)
pub const UART_DOWNLOAD_DIS: EfuseField = EfuseField::new("UART_DOWNLOAD_DIS", 0, 0, 27, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Factory MAC address
pub const MAC: EfuseField = EfuseField::new("MAC", 0, 1, 32, 48)
    .kind(FieldKind::Mac)
    .category(Category::Identity)
    .wr_dis(3);
/// CRC8 of the factory MAC address
pub const MAC_CRC: EfuseField = EfuseField::new("MAC_CRC", 0, 2, 80, 8)
    .category(Category::Identity)
    .wr_dis(3);
/// Disables APP CPU
pub const CHIP_VER_DIS_APP_CPU: EfuseField = EfuseField::new("CHIP_VER_DIS_APP_CPU", 0, 3, 96, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// Disables Bluetooth
pub const CHIP_VER_DIS_BT: EfuseField = EfuseField::new("CHIP_VER_DIS_BT", 0, 3, 97, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// Disables cache
pub const CHIP_VER_DIS_CACHE: EfuseField = EfuseField::new("CHIP_VER_DIS_CACHE", 0, 3, 99, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// Override SD_DATA_1 pad (GPIO8) and SPI_HD
pub const SPI_PAD_CONFIG_HD: EfuseField = EfuseField::new("SPI_PAD_CONFIG_HD", 0, 3, 100, 5)
    .category(Category::Config)
    .wr_dis(3);
/// Chip package identifier
pub const CHIP_PACKAGE: EfuseField = EfuseField::new("CHIP_PACKAGE", 0, 3, 105, 3)
    .category(Category::Identity)
    .wr_dis(3);
/// If set, the CPU speed is limited by CPU_FREQ_RATED
pub const CHIP_CPU_FREQ_LOW: EfuseField = EfuseField::new("CHIP_CPU_FREQ_LOW", 0, 3, 108, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// If set, the maximum CPU frequency is rated
pub const CHIP_CPU_FREQ_RATED: EfuseField = EfuseField::new("CHIP_CPU_FREQ_RATED", 0, 3, 109, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// BLOCK3 partially served for ADC calibration data
pub const BLK3_PART_RESERVE: EfuseField = EfuseField::new("BLK3_PART_RESERVE", 0, 3, 110, 1)
    .category(Category::Calibration)
    .wr_dis(10)
    .rd_dis(3);
/// Silicon revision bit 0
pub const CHIP_VER_REV1: EfuseField = EfuseField::new("CHIP_VER_REV1", 0, 3, 111, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// 8MHz clock frequency calibration
pub const CLK8M_FREQ: EfuseField = EfuseField::new("CLK8M_FREQ", 0, 4, 128, 8)
    .category(Category::Calibration)
    .wr_dis(4);
/// Voltage reference calibration
pub const ADC_VREF: EfuseField = EfuseField::new("ADC_VREF", 0, 4, 136, 5)
    .category(Category::Calibration)
    .wr_dis(4);
/// VDD_SDIO regulator enabled when XPD_SDIO_FORCE is set
pub const XPD_SDIO_REG: EfuseField = EfuseField::new("XPD_SDIO_REG", 0, 4, 142, 1)
    .category(Category::FlashVoltage)
    .wr_dis(5);
/// VDD_SDIO regulator voltage, 0: 1.8V, 1: 3.3V
pub const XPD_SDIO_TIEH: EfuseField = EfuseField::new("XPD_SDIO_TIEH", 0, 4, 143, 1)
    .category(Category::FlashVoltage)
    .wr_dis(5);
/// Ignore the MTDI pin (GPIO12) for the VDD_SDIO voltage on reset
pub const XPD_SDIO_FORCE: EfuseField = EfuseField::new("XPD_SDIO_FORCE", 0, 4, 144, 1)
    .category(Category::FlashVoltage)
    .wr_dis(5);
/// Override SD_CLK pad (GPIO6) and SPI_CLK
pub const SPI_PAD_CONFIG_CLK: EfuseField = EfuseField::new("SPI_PAD_CONFIG_CLK", 0, 5, 160, 5)
    .category(Category::Config)
    .wr_dis(6);
/// Override SD_DATA_0 pad (GPIO7) and SPI_Q
pub const SPI_PAD_CONFIG_Q: EfuseField = EfuseField::new("SPI_PAD_CONFIG_Q", 0, 5, 165, 5)
    .category(Category::Config)
    .wr_dis(6);
/// Override SD_DATA_1 pad (GPIO8) and SPI_D
pub const SPI_PAD_CONFIG_D: EfuseField = EfuseField::new("SPI_PAD_CONFIG_D", 0, 5, 170, 5)
    .category(Category::Config)
    .wr_dis(6);
/// Override SD_CMD pad (GPIO11) and SPI_CS0
pub const SPI_PAD_CONFIG_CS0: EfuseField = EfuseField::new("SPI_PAD_CONFIG_CS0", 0, 5, 175, 5)
    .category(Category::Config)
    .wr_dis(6);
/// Silicon revision bit 1
pub const CHIP_VER_REV2: EfuseField = EfuseField::new("CHIP_VER_REV2", 0, 5, 180, 1)
    .category(Category::Identity)
    .wr_dis(3);
/// Power level in high performance mode
pub const VOL_LEVEL_HP_INV: EfuseField = EfuseField::new("VOL_LEVEL_HP_INV", 0, 5, 182, 2)
    .category(Category::Calibration)
    .wr_dis(3);
/// Wafer version minor
pub const WAFER_VERSION_MINOR: EfuseField = EfuseField::new("WAFER_VERSION_MINOR", 0, 5, 184, 2)
    .category(Category::Identity)
    .wr_dis(3);
/// Flash encryption config (key tweak bits)
pub const FLASH_CRYPT_CONFIG: EfuseField = EfuseField::new("FLASH_CRYPT_CONFIG", 0, 5, 188, 4)
    .category(Category::Security)
    .wr_dis(10)
    .rd_dis(3);
/// Efuse variable block length scheme
pub const CODING_SCHEME: EfuseField = EfuseField::new("CODING_SCHEME", 0, 6, 192, 2)
    .category(Category::Efuse)
    .wr_dis(10)
    .rd_dis(3);
/// Disable ROM BASIC interpreter fallback
pub const CONSOLE_DEBUG_DISABLE: EfuseField =
    EfuseField::new("CONSOLE_DEBUG_DISABLE", 0, 6, 194, 1)
        .category(Category::Security)
        .wr_dis(15);
/// Disable the SDIO host
pub const DISABLE_SDIO_HOST: EfuseField = EfuseField::new("DISABLE_SDIO_HOST", 0, 6, 195, 1)
    .category(Category::Config);
/// Secure boot V1 is enabled for the bootloader image
pub const ABS_DONE_0: EfuseField = EfuseField::new("ABS_DONE_0", 0, 6, 196, 1)
    .category(Category::Security)
    .wr_dis(12);
/// Secure boot V2 is enabled for the bootloader image
pub const ABS_DONE_1: EfuseField = EfuseField::new("ABS_DONE_1", 0, 6, 197, 1)
    .category(Category::Security)
    .wr_dis(13);
/// Disable JTAG
pub const JTAG_DISABLE: EfuseField = EfuseField::new("JTAG_DISABLE", 0, 6, 198, 1)
    .category(Category::Security)
    .wr_dis(14);
/// Disable flash encryption in UART bootloader
pub const DISABLE_DL_ENCRYPT: EfuseField = EfuseField::new("DISABLE_DL_ENCRYPT", 0, 6, 199, 1)
    .category(Category::Security)
    .wr_dis(15);
/// Disable flash decryption in UART bootloader
pub const DISABLE_DL_DECRYPT: EfuseField = EfuseField::new("DISABLE_DL_DECRYPT", 0, 6, 200, 1)
    .category(Category::Security)
    .wr_dis(15);
/// Disable flash cache in UART bootloader
pub const DISABLE_DL_CACHE: EfuseField = EfuseField::new("DISABLE_DL_CACHE", 0, 6, 201, 1)
    .category(Category::Security)
    .wr_dis(15);
/// Usage of efuse block 3 (reserved)
pub const KEY_STATUS: EfuseField = EfuseField::new("KEY_STATUS", 0, 6, 202, 1)
    .category(Category::Efuse)
    .wr_dis(10)
    .rd_dis(3);
/// Flash encryption key
pub const BLOCK1: EfuseField = EfuseField::new("BLOCK1", 1, 0, 0, 256)
    .category(Category::Security)
    .wr_dis(7)
    .rd_dis(0);
/// Secure boot key
pub const BLOCK2: EfuseField = EfuseField::new("BLOCK2", 2, 0, 0, 256)
    .category(Category::Security)
    .wr_dis(8)
    .rd_dis(1);
/// Variable block 3
pub const BLOCK3: EfuseField = EfuseField::new("BLOCK3", 3, 0, 0, 256)
    .category(Category::User)
    .wr_dis(9)
    .rd_dis(2);

pub(crate) const FIELDS: &[EfuseField] = &[
    WR_DIS,
    RD_DIS,
    FLASH_CRYPT_CNT,
    UART_DOWNLOAD_DIS,
    MAC,
    MAC_CRC,
    CHIP_VER_DIS_APP_CPU,
    CHIP_VER_DIS_BT,
    CHIP_VER_DIS_CACHE,
    SPI_PAD_CONFIG_HD,
    CHIP_PACKAGE,
    CHIP_CPU_FREQ_LOW,
    CHIP_CPU_FREQ_RATED,
    BLK3_PART_RESERVE,
    CHIP_VER_REV1,
    CLK8M_FREQ,
    ADC_VREF,
    XPD_SDIO_REG,
    XPD_SDIO_TIEH,
    XPD_SDIO_FORCE,
    SPI_PAD_CONFIG_CLK,
    SPI_PAD_CONFIG_Q,
    SPI_PAD_CONFIG_D,
    SPI_PAD_CONFIG_CS0,
    CHIP_VER_REV2,
    VOL_LEVEL_HP_INV,
    WAFER_VERSION_MINOR,
    FLASH_CRYPT_CONFIG,
    CODING_SCHEME,
    CONSOLE_DEBUG_DISABLE,
    DISABLE_SDIO_HOST,
    ABS_DONE_0,
    ABS_DONE_1,
    JTAG_DISABLE,
    DISABLE_DL_ENCRYPT,
    DISABLE_DL_DECRYPT,
    DISABLE_DL_CACHE,
    KEY_STATUS,
    BLOCK1,
    BLOCK2,
    BLOCK3,
];

pub(crate) static LAYOUT: EfuseLayout = EfuseLayout {
    chip: Chip::Esp32,
    blocks: BLOCKS,
    fields: FIELDS,
    controller: Controller {
        conf_reg: defines::EFUSE_CONF_REG,
        status_reg: defines::EFUSE_STATUS_REG,
        cmd_reg: defines::EFUSE_CMD_REG,
        write_op_code: defines::EFUSE_WRITE_OP_CODE,
        read_op_code: defines::EFUSE_READ_OP_CODE,
        check_value_reg: None,
        block_select: false,
    },
    coding: CodingRule::Configurable,
    mem_base: defines::DR_REG_EFUSE_BASE,
    mem_size: defines::EFUSE_MEM_SIZE,
    flash_voltage: Some(FlashVoltageFields {
        force: XPD_SDIO_FORCE.name,
        regulator: XPD_SDIO_REG.name,
        tieh: XPD_SDIO_TIEH.name,
    }),
};
