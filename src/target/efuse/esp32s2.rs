//! eFuse field definitions for the esp32s2

use super::{
    blocks_v2, controller_v2, v2_fields, Category, CodingRule, EfuseBlock, EfuseField, EfuseLayout,
    FlashVoltageFields, MEM_SIZE_V2,
};
use crate::target::Chip;

pub(crate) const DR_REG_EFUSE_BASE: u32 = 0x3f41_a000;

/// All eFuse blocks available on this device.
pub(crate) const BLOCKS: &[EfuseBlock] = &blocks_v2(DR_REG_EFUSE_BASE);

/// Disable programming of individual eFuses
pub const WR_DIS: EfuseField = EfuseField::new("WR_DIS", 0, 0, 0, 32).category(Category::Efuse);
/// Disable reading from BlOCK4-10
pub const RD_DIS: EfuseField = EfuseField::new("RD_DIS", 0, 1, 32, 7)
    .category(Category::Efuse)
    .wr_dis(0);
/// Set this bit to disable Icache
pub const DIS_ICACHE: EfuseField = EfuseField::new("DIS_ICACHE", 0, 1, 40, 1).wr_dis(2);
/// Set this bit to disable Dcache
pub const DIS_DCACHE: EfuseField = EfuseField::new("DIS_DCACHE", 0, 1, 41, 1).wr_dis(2);
/// Disables Icache when SoC is in Download mode
pub const DIS_DOWNLOAD_ICACHE: EfuseField = EfuseField::new("DIS_DOWNLOAD_ICACHE", 0, 1, 42, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Disables Dcache when SoC is in Download mode
pub const DIS_DOWNLOAD_DCACHE: EfuseField = EfuseField::new("DIS_DOWNLOAD_DCACHE", 0, 1, 43, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Set this bit to disable the function that forces chip into download mode
pub const DIS_FORCE_DOWNLOAD: EfuseField = EfuseField::new("DIS_FORCE_DOWNLOAD", 0, 1, 44, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Set this bit to disable USB OTG function
pub const DIS_USB: EfuseField = EfuseField::new("DIS_USB", 0, 1, 45, 1).wr_dis(2);
/// Set this bit to disable the TWAI Controller function
pub const DIS_TWAI: EfuseField = EfuseField::new("DIS_TWAI", 0, 1, 46, 1).wr_dis(2);
/// Disables capability to Remap RAM to ROM address space
pub const DIS_BOOT_REMAP: EfuseField = EfuseField::new("DIS_BOOT_REMAP", 0, 1, 47, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Software disables JTAG. When software disabled, JTAG can be activated
/// temporarily by HMAC peripheral
pub const SOFT_DIS_JTAG: EfuseField = EfuseField::new("SOFT_DIS_JTAG", 0, 1, 49, 1)
    .category(Category::Security)
    .wr_dis(31);
/// Hardware disables JTAG permanently
pub const HARD_DIS_JTAG: EfuseField = EfuseField::new("HARD_DIS_JTAG", 0, 1, 50, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Disables flash encryption when in download boot modes
pub const DIS_DOWNLOAD_MANUAL_ENCRYPT: EfuseField =
    EfuseField::new("DIS_DOWNLOAD_MANUAL_ENCRYPT", 0, 1, 51, 1)
        .category(Category::Security)
        .wr_dis(2);
/// Set this bit to exchange USB D+ and D- pins
pub const USB_EXCHG_PINS: EfuseField = EfuseField::new("USB_EXCHG_PINS", 0, 1, 56, 1).wr_dis(30);
/// Set this bit to enable external USB PHY
pub const USB_EXT_PHY_ENABLE: EfuseField =
    EfuseField::new("USB_EXT_PHY_ENABLE", 0, 1, 57, 1).wr_dis(30);
/// If set, forces USB BVALID to 1
pub const USB_FORCE_NOPERSIST: EfuseField =
    EfuseField::new("USB_FORCE_NOPERSIST", 0, 1, 58, 1).wr_dis(30);
/// BLOCK0 efuse version
pub const BLOCK0_VERSION: EfuseField = EfuseField::new("BLOCK0_VERSION", 0, 1, 59, 2)
    .category(Category::Identity)
    .wr_dis(30);
/// If VDD_SPI_FORCE is 1, this value determines if the VDD_SPI regulator is
/// powered on
pub const VDD_SPI_XPD: EfuseField = EfuseField::new("VDD_SPI_XPD", 0, 2, 68, 1)
    .category(Category::FlashVoltage)
    .wr_dis(3);
/// If VDD_SPI_FORCE is 1, determines VDD_SPI voltage. 0: 1.8V, 1: 3.3V
pub const VDD_SPI_TIEH: EfuseField = EfuseField::new("VDD_SPI_TIEH", 0, 2, 69, 1)
    .category(Category::FlashVoltage)
    .wr_dis(3);
/// Set this bit to use XPD_VDD_PSI_REG and VDD_SPI_TIEH to configure VDD_SPI LDO
pub const VDD_SPI_FORCE: EfuseField = EfuseField::new("VDD_SPI_FORCE", 0, 2, 70, 1)
    .category(Category::FlashVoltage)
    .wr_dis(3);
/// RTC watchdog timeout threshold; in unit of slow clock cycle
pub const WDT_DELAY_SEL: EfuseField = EfuseField::new("WDT_DELAY_SEL", 0, 2, 80, 2).wr_dis(3);
/// Enables encryption and decryption, when an SPI boot mode is set
pub const SPI_BOOT_CRYPT_CNT: EfuseField = EfuseField::new("SPI_BOOT_CRYPT_CNT", 0, 2, 82, 3)
    .category(Category::Security)
    .wr_dis(4);
/// Enabled revocation of secure boot key 0
pub const SECURE_BOOT_KEY_REVOKE0: EfuseField =
    EfuseField::new("SECURE_BOOT_KEY_REVOKE0", 0, 2, 85, 1)
        .category(Category::Security)
        .wr_dis(5);
/// Enabled revocation of secure boot key 1
pub const SECURE_BOOT_KEY_REVOKE1: EfuseField =
    EfuseField::new("SECURE_BOOT_KEY_REVOKE1", 0, 2, 86, 1)
        .category(Category::Security)
        .wr_dis(6);
/// Enabled revocation of secure boot key 2
pub const SECURE_BOOT_KEY_REVOKE2: EfuseField =
    EfuseField::new("SECURE_BOOT_KEY_REVOKE2", 0, 2, 87, 1)
        .category(Category::Security)
        .wr_dis(7);
/// Purpose of KEY0
pub const KEY_PURPOSE_0: EfuseField = EfuseField::new("KEY_PURPOSE_0", 0, 2, 88, 4)
    .category(Category::Security)
    .wr_dis(8);
/// Purpose of KEY1
pub const KEY_PURPOSE_1: EfuseField = EfuseField::new("KEY_PURPOSE_1", 0, 2, 92, 4)
    .category(Category::Security)
    .wr_dis(9);
/// Purpose of KEY2
pub const KEY_PURPOSE_2: EfuseField = EfuseField::new("KEY_PURPOSE_2", 0, 3, 96, 4)
    .category(Category::Security)
    .wr_dis(10);
/// Purpose of KEY3
pub const KEY_PURPOSE_3: EfuseField = EfuseField::new("KEY_PURPOSE_3", 0, 3, 100, 4)
    .category(Category::Security)
    .wr_dis(11);
/// Purpose of KEY4
pub const KEY_PURPOSE_4: EfuseField = EfuseField::new("KEY_PURPOSE_4", 0, 3, 104, 4)
    .category(Category::Security)
    .wr_dis(12);
/// Purpose of KEY5
pub const KEY_PURPOSE_5: EfuseField = EfuseField::new("KEY_PURPOSE_5", 0, 3, 108, 4)
    .category(Category::Security)
    .wr_dis(13);
/// Set this bit to enable secure boot
pub const SECURE_BOOT_EN: EfuseField = EfuseField::new("SECURE_BOOT_EN", 0, 3, 116, 1)
    .category(Category::Security)
    .wr_dis(15);
/// Set this bit to enable aggressive secure boot key revocation mode
pub const SECURE_BOOT_AGGRESSIVE_REVOKE: EfuseField =
    EfuseField::new("SECURE_BOOT_AGGRESSIVE_REVOKE", 0, 3, 117, 1)
        .category(Category::Security)
        .wr_dis(16);
/// Configures flash startup delay after SoC power-up, in unit of (ms/2)
pub const FLASH_TPUW: EfuseField = EfuseField::new("FLASH_TPUW", 0, 3, 124, 4).wr_dis(18);
/// Set this bit to disable all download boot modes
pub const DIS_DOWNLOAD_MODE: EfuseField = EfuseField::new("DIS_DOWNLOAD_MODE", 0, 4, 128, 1)
    .category(Category::Security)
    .wr_dis(18);
/// Set this bit to disable Legacy SPI boot mode
pub const DIS_LEGACY_SPI_BOOT: EfuseField = EfuseField::new("DIS_LEGACY_SPI_BOOT", 0, 4, 129, 1)
    .category(Category::Security)
    .wr_dis(18);
/// Selects the default UART for printing boot messages
pub const UART_PRINT_CHANNEL: EfuseField =
    EfuseField::new("UART_PRINT_CHANNEL", 0, 4, 130, 1).wr_dis(18);
/// Set this bit to disable use of USB OTG in UART download boot mode
pub const DIS_USB_DOWNLOAD_MODE: EfuseField =
    EfuseField::new("DIS_USB_DOWNLOAD_MODE", 0, 4, 132, 1)
        .category(Category::Security)
        .wr_dis(18);
/// Set this bit to enable secure UART download mode
pub const ENABLE_SECURITY_DOWNLOAD: EfuseField =
    EfuseField::new("ENABLE_SECURITY_DOWNLOAD", 0, 4, 133, 1)
        .category(Category::Security)
        .wr_dis(18);
/// Set the default UART boot message output mode
pub const UART_PRINT_CONTROL: EfuseField =
    EfuseField::new("UART_PRINT_CONTROL", 0, 4, 134, 2).wr_dis(18);
/// Set default power supply for GPIO33-GPIO37, set when SPI flash is
/// initialized
pub const PIN_POWER_SELECTION: EfuseField =
    EfuseField::new("PIN_POWER_SELECTION", 0, 4, 136, 1).wr_dis(18);
/// SPI flash type
pub const FLASH_TYPE: EfuseField = EfuseField::new("FLASH_TYPE", 0, 4, 137, 1).wr_dis(18);
/// If set, ROM code sends an SPI flash resume command before an SPI boot
pub const FORCE_SEND_RESUME: EfuseField =
    EfuseField::new("FORCE_SEND_RESUME", 0, 4, 138, 1).wr_dis(18);
/// Secure version (used by ESP-IDF anti-rollback feature)
pub const SECURE_VERSION: EfuseField = EfuseField::new("SECURE_VERSION", 0, 4, 139, 16)
    .category(Category::Security)
    .wr_dis(18);

pub(crate) const FIELDS: &[EfuseField] = v2_fields![
    WR_DIS,
    RD_DIS,
    DIS_ICACHE,
    DIS_DCACHE,
    DIS_DOWNLOAD_ICACHE,
    DIS_DOWNLOAD_DCACHE,
    DIS_FORCE_DOWNLOAD,
    DIS_USB,
    DIS_TWAI,
    DIS_BOOT_REMAP,
    SOFT_DIS_JTAG,
    HARD_DIS_JTAG,
    DIS_DOWNLOAD_MANUAL_ENCRYPT,
    USB_EXCHG_PINS,
    USB_EXT_PHY_ENABLE,
    USB_FORCE_NOPERSIST,
    BLOCK0_VERSION,
    VDD_SPI_XPD,
    VDD_SPI_TIEH,
    VDD_SPI_FORCE,
    WDT_DELAY_SEL,
    SPI_BOOT_CRYPT_CNT,
    SECURE_BOOT_KEY_REVOKE0,
    SECURE_BOOT_KEY_REVOKE1,
    SECURE_BOOT_KEY_REVOKE2,
    KEY_PURPOSE_0,
    KEY_PURPOSE_1,
    KEY_PURPOSE_2,
    KEY_PURPOSE_3,
    KEY_PURPOSE_4,
    KEY_PURPOSE_5,
    SECURE_BOOT_EN,
    SECURE_BOOT_AGGRESSIVE_REVOKE,
    FLASH_TPUW,
    DIS_DOWNLOAD_MODE,
    DIS_LEGACY_SPI_BOOT,
    UART_PRINT_CHANNEL,
    DIS_USB_DOWNLOAD_MODE,
    ENABLE_SECURITY_DOWNLOAD,
    UART_PRINT_CONTROL,
    PIN_POWER_SELECTION,
    FLASH_TYPE,
    FORCE_SEND_RESUME,
    SECURE_VERSION,
];

pub(crate) const FLASH_VOLTAGE: FlashVoltageFields = FlashVoltageFields {
    force: VDD_SPI_FORCE.name,
    regulator: VDD_SPI_XPD.name,
    tieh: VDD_SPI_TIEH.name,
};

pub(crate) static LAYOUT: EfuseLayout = EfuseLayout {
    chip: Chip::Esp32s2,
    blocks: BLOCKS,
    fields: FIELDS,
    controller: controller_v2(DR_REG_EFUSE_BASE),
    coding: CodingRule::ReedSolomon,
    mem_base: DR_REG_EFUSE_BASE,
    mem_size: MEM_SIZE_V2,
    flash_voltage: Some(FLASH_VOLTAGE),
};
