//! Operations which burn eFuses

use std::fs;

use clap::{ArgMatches, Args, Command, FromArgMatches, ValueEnum};
use log::{info, warn};

use super::{
    block_names,
    parse::{parse_u32, parse_usize, parse_value},
    protectable_field_names,
    Operation,
};
use crate::{
    error::Error,
    session::{EfuseSession, FieldValue},
    target::efuse::EfuseLayout,
};

pub(super) const BURN_EFUSE: Operation = Operation {
    name: "burn-efuse",
    about: "Burn new values into eFuse fields",
    destructive: true,
    args: burn_efuse_args,
    run: burn_efuse,
};

pub(super) const READ_PROTECT_EFUSE: Operation = Operation {
    name: "read-protect-efuse",
    about: "Disable reading back the given eFuse fields",
    destructive: true,
    args: read_protect_args,
    run: read_protect_efuse,
};

pub(super) const WRITE_PROTECT_EFUSE: Operation = Operation {
    name: "write-protect-efuse",
    about: "Disable any further burning of the given eFuse fields",
    destructive: true,
    args: write_protect_args,
    run: write_protect_efuse,
};

pub(super) const BURN_BLOCK_DATA: Operation = Operation {
    name: "burn-block-data",
    about: "Burn the content of binary files into eFuse blocks",
    destructive: true,
    args: burn_block_data_args,
    run: burn_block_data,
};

pub(super) const BURN_BIT: Operation = Operation {
    name: "burn-bit",
    about: "Burn individual bits of an eFuse block",
    destructive: true,
    args: burn_bit_args,
    run: burn_bit,
};

pub(super) const SET_FLASH_VOLTAGE: Operation = Operation {
    name: "set-flash-voltage",
    about: "Permanently set the voltage of the internal flash regulator",
    destructive: true,
    args: set_flash_voltage_args,
    run: set_flash_voltage,
};

#[derive(Debug, Args)]
struct BurnEfuseArgs {
    /// Names of eFuse fields, each followed by the value to burn
    #[arg(value_name = "NAME VALUE", required = true, num_args = 2..)]
    name_value_pairs: Vec<String>,
}

fn burn_efuse_args(command: Command, _layout: &EfuseLayout) -> Command {
    BurnEfuseArgs::augment_args(command)
}

fn burn_efuse(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = BurnEfuseArgs::from_arg_matches(matches)?;

    let pairs = args.name_value_pairs.chunks_exact(2);
    if let [name] = pairs.remainder() {
        return Err(Error::InvalidValue {
            name: name.clone(),
            value: String::new(),
            reason: String::from("every field name must be followed by a value"),
        });
    }

    for pair in pairs {
        let field = session.field(&pair[0])?;
        let value = parse_value(field, &pair[1])?;
        session.stage_field(field, &value)?;
    }

    session.burn_all()
}

#[derive(Debug, Args)]
struct ProtectArgs {
    /// Names of the eFuse fields to protect
    #[arg(value_name = "EFUSE_NAME", required = true, ignore_case = true)]
    efuse_name: Vec<String>,
}

fn read_protect_args(command: Command, layout: &EfuseLayout) -> Command {
    ProtectArgs::augment_args(command).mut_arg("efuse_name", |arg| {
        arg.value_parser(protectable_field_names(layout, EfuseLayout::read_disable_bit))
    })
}

fn write_protect_args(command: Command, layout: &EfuseLayout) -> Command {
    ProtectArgs::augment_args(command).mut_arg("efuse_name", |arg| {
        arg.value_parser(protectable_field_names(layout, EfuseLayout::write_disable_bit))
    })
}

fn read_protect_efuse(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = ProtectArgs::from_arg_matches(matches)?;

    for name in &args.efuse_name {
        let field = session.field(name)?;
        session.stage_read_protect(field)?;
    }

    session.burn_all()
}

fn write_protect_efuse(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = ProtectArgs::from_arg_matches(matches)?;

    for name in &args.efuse_name {
        let field = session.field(name)?;
        session.stage_write_protect(field)?;
    }

    session.burn_all()
}

#[derive(Debug, Args)]
struct BurnBlockDataArgs {
    /// Byte offset of the data within the block
    #[arg(long, default_value = "0", value_parser = parse_usize)]
    offset: usize,
    /// Names of eFuse blocks, each followed by the file to burn into it
    #[arg(value_name = "BLOCK DATAFILE", required = true, num_args = 2..)]
    block_datafile: Vec<String>,
}

fn burn_block_data_args(command: Command, _layout: &EfuseLayout) -> Command {
    BurnBlockDataArgs::augment_args(command)
}

fn burn_block_data(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = BurnBlockDataArgs::from_arg_matches(matches)?;

    let pairs = args.block_datafile.chunks_exact(2);
    if let [block] = pairs.remainder() {
        return Err(Error::InvalidValue {
            name: block.clone(),
            value: String::new(),
            reason: String::from("every block name must be followed by a data file"),
        });
    }

    if args.offset != 0 && pairs.len() > 1 {
        return Err(Error::Configuration(String::from(
            "`--offset` can only be used when burning a single block",
        )));
    }

    for pair in pairs {
        let block = session.block(&pair[0])?;
        let data =
            fs::read(&pair[1]).map_err(|e| Error::FileOpenError(pair[1].clone(), e))?;

        info!("Read {} bytes from {}", data.len(), pair[1]);
        session.stage_block_data(block, args.offset, &data)?;
    }

    session.burn_all()
}

#[derive(Debug, Args)]
struct BurnBitArgs {
    /// eFuse block to burn the bits into
    #[arg(index = 1, value_name = "BLOCK", ignore_case = true)]
    block: String,
    /// Numbers of the bits to burn, counted from the start of the block
    #[arg(index = 2, value_name = "BIT_NUMBER", required = true, value_parser = parse_u32)]
    bit_number: Vec<u32>,
}

fn burn_bit_args(command: Command, layout: &EfuseLayout) -> Command {
    BurnBitArgs::augment_args(command)
        .mut_arg("block", |arg| arg.value_parser(block_names(layout)))
}

fn burn_bit(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = BurnBitArgs::from_arg_matches(matches)?;

    let block = session.block(&args.block)?;
    session.stage_bits(block, &args.bit_number)?;

    session.burn_all()
}

/// Voltage of the flash regulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FlashVoltage {
    #[value(name = "1.8V")]
    V1_8,
    #[value(name = "3.3V")]
    V3_3,
    /// Disable the regulator, flash is powered externally
    #[value(name = "OFF")]
    Off,
}

#[derive(Debug, Args)]
struct SetFlashVoltageArgs {
    /// Voltage selected for the flash
    #[arg(value_enum, ignore_case = true)]
    voltage: FlashVoltage,
}

fn set_flash_voltage_args(command: Command, _layout: &EfuseLayout) -> Command {
    SetFlashVoltageArgs::augment_args(command)
}

fn set_flash_voltage(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = SetFlashVoltageArgs::from_arg_matches(matches)?;

    let fields = session
        .layout()
        .flash_voltage
        .ok_or_else(|| Error::UnsupportedFeature {
            chip: session.chip(),
            feature: String::from("setting the flash voltage"),
        })?;

    let force = session.field(fields.force)?;
    let regulator = session.field(fields.regulator)?;
    let tieh = session.field(fields.tieh)?;

    match args.voltage {
        FlashVoltage::Off => {
            if session.read_field(regulator)? == FieldValue::Bool(true) {
                return Err(Error::InvalidValue {
                    name: regulator.name.to_owned(),
                    value: String::from("OFF"),
                    reason: String::from("the regulator is already enabled"),
                });
            }
        }
        FlashVoltage::V1_8 => {
            if session.read_field(tieh)? == FieldValue::Bool(true) {
                return Err(Error::InvalidValue {
                    name: tieh.name.to_owned(),
                    value: String::from("1.8V"),
                    reason: String::from("the regulator is already set to 3.3V"),
                });
            }
            session.stage_field(regulator, &FieldValue::Bool(true))?;
        }
        FlashVoltage::V3_3 => {
            session.stage_field(regulator, &FieldValue::Bool(true))?;
            session.stage_field(tieh, &FieldValue::Bool(true))?;
        }
    }

    // The strapping pin is ignored once the voltage is forced
    session.stage_field(force, &FieldValue::Bool(true))?;

    if args.voltage == FlashVoltage::V3_3 {
        warn!("Flash must support 3.3V operation, 1.8V flash may be damaged");
    }

    session.burn_all()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{backend::EmulatedBackend, session::bind, target::Chip};

    fn run(
        session: &mut EfuseSession<'_>,
        operation: &Operation,
        args: &[&str],
    ) -> Result<(), Error> {
        let matches = operation
            .command(session.layout())
            .try_get_matches_from(std::iter::once(operation.name).chain(args.iter().copied()))?;

        (operation.run)(session, &matches)
    }

    #[test]
    fn burns_field_values() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(
            &mut session,
            &BURN_EFUSE,
            &["DIS_PAD_JTAG", "1", "secure_version", "0x3"],
        )
        .unwrap();

        assert_eq!(session.read("DIS_PAD_JTAG").unwrap(), FieldValue::Bool(true));
        assert_eq!(session.read("SECURE_VERSION").unwrap(), FieldValue::Uint(3));
    }

    #[test]
    fn odd_number_of_arguments_is_rejected() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let result = run(
            &mut session,
            &BURN_EFUSE,
            &["DIS_PAD_JTAG", "1", "SECURE_VERSION"],
        );

        assert!(matches!(result, Err(Error::InvalidValue { .. })));
        assert!(!session.has_pending());
    }

    #[test]
    fn nothing_is_burned_when_one_value_is_invalid() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let result = run(
            &mut session,
            &BURN_EFUSE,
            &["DIS_PAD_JTAG", "1", "KEY_PURPOSE_0", "99"],
        );

        assert!(matches!(result, Err(Error::InvalidValue { .. })));
        session.discard();
        assert_eq!(session.read("DIS_PAD_JTAG").unwrap(), FieldValue::Bool(false));
    }

    #[test]
    fn burns_bits_of_a_block() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32s2);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(&mut session, &BURN_BIT, &["block3", "0", "33"]).unwrap();

        assert_eq!(&session.block_words(3).unwrap()[..2], &[0b1, 0b10]);
    }

    #[test]
    fn write_protects_fields() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(&mut session, &WRITE_PROTECT_EFUSE, &["BLOCK3"]).unwrap();

        let field = session.field("BLOCK3").unwrap();
        assert!(session.is_write_protected(field).unwrap());
        assert!(!session.is_read_protected(field).unwrap());
    }

    #[test]
    fn read_protection_hides_the_block() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(&mut session, &READ_PROTECT_EFUSE, &["BLOCK_KEY2"]).unwrap();

        let field = session.field("BLOCK_KEY2").unwrap();
        assert!(session.is_read_protected(field).unwrap());
    }

    #[test]
    fn fields_without_read_protection_are_not_offered() {
        let layout = Chip::Esp32c3.efuse_layout();
        let result = READ_PROTECT_EFUSE
            .command(layout)
            .try_get_matches_from(["read-protect-efuse", "DIS_PAD_JTAG"]);

        assert!(result.is_err());
    }

    #[test]
    fn burns_block_data_from_files() {
        let dir = std::env::temp_dir().join(format!("espefuse-block-data-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let file = dir.join("data.bin");
        fs::write(&file, [0xde, 0xad, 0xbe, 0xef]).unwrap();

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(
            &mut session,
            &BURN_BLOCK_DATA,
            &["--offset", "4", "BLOCK_USR_DATA", file.to_str().unwrap()],
        )
        .unwrap();

        assert_eq!(&session.block_words(3).unwrap()[..2], &[0, 0xefbe_adde]);
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn missing_data_file_is_reported() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let result = run(
            &mut session,
            &BURN_BLOCK_DATA,
            &["BLOCK3", "/does/not/exist.bin"],
        );

        assert!(matches!(result, Err(Error::FileOpenError(..))));
    }

    #[test]
    fn sets_flash_voltage() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(&mut session, &SET_FLASH_VOLTAGE, &["1.8V"]).unwrap();

        assert_eq!(session.read("XPD_SDIO_FORCE").unwrap(), FieldValue::Bool(true));
        assert_eq!(session.read("XPD_SDIO_REG").unwrap(), FieldValue::Bool(true));
        assert_eq!(session.read("XPD_SDIO_TIEH").unwrap(), FieldValue::Bool(false));

        run(&mut session, &SET_FLASH_VOLTAGE, &["3.3V"]).unwrap();
        assert_eq!(session.read("XPD_SDIO_TIEH").unwrap(), FieldValue::Bool(true));

        assert!(matches!(
            run(&mut session, &SET_FLASH_VOLTAGE, &["OFF"]),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn flash_voltage_off_only_forces() {
        let mut backend = EmulatedBackend::in_memory(Chip::Esp32s2);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(&mut session, &SET_FLASH_VOLTAGE, &["off"]).unwrap();

        assert_eq!(session.read("VDD_SPI_FORCE").unwrap(), FieldValue::Bool(true));
        assert_eq!(session.read("VDD_SPI_XPD").unwrap(), FieldValue::Bool(false));
    }
}
