//! eFuse field definitions for the esp32s3

use super::{
    blocks_v2, controller_v2, v2_fields, Category, CodingRule, EfuseBlock, EfuseField, EfuseLayout,
    FlashVoltageFields, MEM_SIZE_V2,
};
use crate::target::Chip;

pub(crate) const DR_REG_EFUSE_BASE: u32 = 0x6000_7000;

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
pub const DIS_USB_OTG: EfuseField = EfuseField::new("DIS_USB_OTG", 0, 1, 45, 1).wr_dis(2);
/// Set this bit to disable the TWAI Controller function
pub const DIS_TWAI: EfuseField = EfuseField::new("DIS_TWAI", 0, 1, 46, 1).wr_dis(2);
/// Disable app cpu
pub const DIS_APP_CPU: EfuseField = EfuseField::new("DIS_APP_CPU", 0, 1, 47, 1).wr_dis(2);
/// Set these bits to disable JTAG in the soft way (odd number 1 means disable).
/// JTAG can be enabled in HMAC module
pub const SOFT_DIS_JTAG: EfuseField = EfuseField::new("SOFT_DIS_JTAG", 0, 1, 48, 3)
    .category(Category::Security)
    .wr_dis(31);
/// Set this bit to disable JTAG in the hard way. JTAG is disabled permanently
pub const DIS_PAD_JTAG: EfuseField = EfuseField::new("DIS_PAD_JTAG", 0, 1, 51, 1)
    .category(Category::Security)
    .wr_dis(2);
/// Disables flash encryption when in download boot modes
pub const DIS_DOWNLOAD_MANUAL_ENCRYPT: EfuseField =
    EfuseField::new("DIS_DOWNLOAD_MANUAL_ENCRYPT", 0, 1, 52, 1)
        .category(Category::Security)
        .wr_dis(2);
/// Set this bit to exchange USB D+ and D- pins
pub const USB_EXCHG_PINS: EfuseField = EfuseField::new("USB_EXCHG_PINS", 0, 1, 57, 1).wr_dis(30);
/// Set this bit to enable external PHY
pub const USB_EXT_PHY_ENABLE: EfuseField =
    EfuseField::new("USB_EXT_PHY_ENABLE", 0, 1, 58, 1).wr_dis(30);
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
/// Disable direct boot mode
pub const DIS_DIRECT_BOOT: EfuseField = EfuseField::new("DIS_DIRECT_BOOT", 0, 4, 129, 1)
    .category(Category::Security)
    .wr_dis(18);
/// USB printing
pub const DIS_USB_SERIAL_JTAG_ROM_PRINT: EfuseField =
    EfuseField::new("DIS_USB_SERIAL_JTAG_ROM_PRINT", 0, 4, 130, 1).wr_dis(18);
/// Flash ECC mode in ROM
pub const FLASH_ECC_MODE: EfuseField = EfuseField::new("FLASH_ECC_MODE", 0, 4, 131, 1).wr_dis(18);
/// Disable UART download mode through USB-Serial-JTAG
pub const DIS_USB_SERIAL_JTAG_DOWNLOAD_MODE: EfuseField =
    EfuseField::new("DIS_USB_SERIAL_JTAG_DOWNLOAD_MODE", 0, 4, 132, 1)
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
/// Flash page size
pub const FLASH_PAGE_SIZE: EfuseField = EfuseField::new("FLASH_PAGE_SIZE", 0, 4, 138, 2).wr_dis(18);
/// Enable ECC for flash boot
pub const FLASH_ECC_EN: EfuseField = EfuseField::new("FLASH_ECC_EN", 0, 4, 140, 1).wr_dis(18);
/// Set this bit to force ROM code to send a resume command during SPI boot
pub const FORCE_SEND_RESUME: EfuseField =
    EfuseField::new("FORCE_SEND_RESUME", 0, 4, 141, 1).wr_dis(18);
/// Secure version (used by ESP-IDF anti-rollback feature)
pub const SECURE_VERSION: EfuseField = EfuseField::new("SECURE_VERSION", 0, 4, 142, 16)
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
    DIS_USB_OTG,
    DIS_TWAI,
    DIS_APP_CPU,
    SOFT_DIS_JTAG,
    DIS_PAD_JTAG,
    DIS_DOWNLOAD_MANUAL_ENCRYPT,
    USB_EXCHG_PINS,
    USB_EXT_PHY_ENABLE,
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
    DIS_DIRECT_BOOT,
    DIS_USB_SERIAL_JTAG_ROM_PRINT,
    FLASH_ECC_MODE,
    DIS_USB_SERIAL_JTAG_DOWNLOAD_MODE,
    ENABLE_SECURITY_DOWNLOAD,
    UART_PRINT_CONTROL,
    PIN_POWER_SELECTION,
    FLASH_TYPE,
    FLASH_PAGE_SIZE,
    FLASH_ECC_EN,
    FORCE_SEND_RESUME,
    SECURE_VERSION,
];

pub(crate) const FLASH_VOLTAGE: FlashVoltageFields = FlashVoltageFields {
    force: VDD_SPI_FORCE.name,
    regulator: VDD_SPI_XPD.name,
    tieh: VDD_SPI_TIEH.name,
};

pub(crate) static LAYOUT: EfuseLayout = EfuseLayout {
    chip: Chip::Esp32s3,
    blocks: BLOCKS,
    fields: FIELDS,
    controller: controller_v2(DR_REG_EFUSE_BASE),
    coding: CodingRule::ReedSolomon,
    mem_base: DR_REG_EFUSE_BASE,
    mem_size: MEM_SIZE_V2,
    flash_voltage: Some(FLASH_VOLTAGE),
};
