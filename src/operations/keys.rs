//! Burning of keys into key blocks

use std::{
    fs,
    ops::RangeInclusive,
    path::{Path, PathBuf},
};

use clap::{builder::PossibleValuesParser, ArgMatches, Args, Command, FromArgMatches, ValueEnum};
use log::info;
use strum::Display;

use super::Operation;
use crate::{
    error::Error,
    session::{EfuseSession, FieldValue},
    target::efuse::{EfuseBlock, EfuseLayout},
};

pub(super) const BURN_KEY_ESP32: Operation = Operation {
    name: "burn-key",
    about: "Burn a 256-bit key into BLOCK1, BLOCK2 or BLOCK3",
    destructive: true,
    args: burn_key_esp32_args,
    run: burn_key_esp32,
};

pub(super) const BURN_KEY: Operation = Operation {
    name: "burn-key",
    about: "Burn a 256-bit key into a key block and set its purpose",
    destructive: true,
    args: burn_key_args,
    run: burn_key,
};

/// Parser accepting all names of the key blocks in `indices`
fn key_blocks(layout: &EfuseLayout, indices: RangeInclusive<u8>) -> PossibleValuesParser {
    PossibleValuesParser::new(
        layout
            .blocks
            .iter()
            .filter(|block| indices.contains(&block.index))
            .flat_map(|block| std::iter::once(block.name).chain(block.aliases.iter().copied())),
    )
}

fn read_key(path: &Path, block: &EfuseBlock, len: usize) -> Result<Vec<u8>, Error> {
    let key = fs::read(path).map_err(|e| Error::FileOpenError(path.display().to_string(), e))?;

    if key.len() != len {
        return Err(Error::InvalidValue {
            name: block.name.to_owned(),
            value: path.display().to_string(),
            reason: format!("expected a {len} byte key, the file holds {} bytes", key.len()),
        });
    }

    Ok(key)
}

#[derive(Debug, Args)]
struct BurnKeyEsp32Args {
    /// Key block to burn
    #[arg(index = 1, value_name = "BLOCK", ignore_case = true)]
    block: String,
    /// File containing the raw key
    #[arg(index = 2, value_name = "KEYFILE")]
    keyfile: PathBuf,
    /// Leave the key block readable and writable
    #[arg(long)]
    no_protect_key: bool,
}

fn burn_key_esp32_args(command: Command, layout: &EfuseLayout) -> Command {
    BurnKeyEsp32Args::augment_args(command)
        .mut_arg("block", |arg| arg.value_parser(key_blocks(layout, 1..=3)))
}

fn burn_key_esp32(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = BurnKeyEsp32Args::from_arg_matches(matches)?;

    let block = session.block(&args.block)?;
    let capacity = session.block_capacity(block)?;
    let mut key = read_key(&args.keyfile, block, capacity)?;

    // The flash encryption and secure boot hardware read these keys in
    // reverse byte order
    if matches!(block.index, 1 | 2) {
        key.reverse();
    }

    session.stage_block_data(block, 0, &key)?;

    let field = session.field(block.name)?;
    if args.no_protect_key {
        info!("{} is left readable and writable", block.name);
    } else {
        session.stage_read_protect(field)?;
        session.stage_write_protect(field)?;
    }

    session.burn_all()
}

/// What a key block is used for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, ValueEnum)]
#[repr(u8)]
pub enum KeyPurpose {
    #[value(name = "USER")]
    #[strum(serialize = "USER")]
    User = 0,
    #[value(skip)]
    #[strum(serialize = "RESERVED")]
    Reserved = 1,
    #[value(name = "XTS_AES_256_KEY_1")]
    #[strum(serialize = "XTS_AES_256_KEY_1")]
    XtsAes256Key1 = 2,
    #[value(name = "XTS_AES_256_KEY_2")]
    #[strum(serialize = "XTS_AES_256_KEY_2")]
    XtsAes256Key2 = 3,
    #[value(name = "XTS_AES_128_KEY")]
    #[strum(serialize = "XTS_AES_128_KEY")]
    XtsAes128Key = 4,
    #[value(name = "HMAC_DOWN_ALL")]
    #[strum(serialize = "HMAC_DOWN_ALL")]
    HmacDownAll = 5,
    #[value(name = "HMAC_DOWN_JTAG")]
    #[strum(serialize = "HMAC_DOWN_JTAG")]
    HmacDownJtag = 6,
    #[value(name = "HMAC_DOWN_DIGITAL_SIGNATURE")]
    #[strum(serialize = "HMAC_DOWN_DIGITAL_SIGNATURE")]
    HmacDownDigitalSignature = 7,
    #[value(name = "HMAC_UP")]
    #[strum(serialize = "HMAC_UP")]
    HmacUp = 8,
    #[value(name = "SECURE_BOOT_DIGEST0")]
    #[strum(serialize = "SECURE_BOOT_DIGEST0")]
    SecureBootDigest0 = 9,
    #[value(name = "SECURE_BOOT_DIGEST1")]
    #[strum(serialize = "SECURE_BOOT_DIGEST1")]
    SecureBootDigest1 = 10,
    #[value(name = "SECURE_BOOT_DIGEST2")]
    #[strum(serialize = "SECURE_BOOT_DIGEST2")]
    SecureBootDigest2 = 11,
}

impl KeyPurpose {
    /// The purpose stored as `value` in a `KEY_PURPOSE_n` field
    pub fn from_raw(value: u64) -> Option<Self> {
        Some(match value {
            0 => KeyPurpose::User,
            1 => KeyPurpose::Reserved,
            2 => KeyPurpose::XtsAes256Key1,
            3 => KeyPurpose::XtsAes256Key2,
            4 => KeyPurpose::XtsAes128Key,
            5 => KeyPurpose::HmacDownAll,
            6 => KeyPurpose::HmacDownJtag,
            7 => KeyPurpose::HmacDownDigitalSignature,
            8 => KeyPurpose::HmacUp,
            9 => KeyPurpose::SecureBootDigest0,
            10 => KeyPurpose::SecureBootDigest1,
            11 => KeyPurpose::SecureBootDigest2,
            _ => return None,
        })
    }

    /// Whether the key is a public key digest, which must stay readable
    pub fn is_digest(&self) -> bool {
        matches!(
            self,
            KeyPurpose::SecureBootDigest0
                | KeyPurpose::SecureBootDigest1
                | KeyPurpose::SecureBootDigest2
        )
    }

    pub fn is_xts_aes_256(&self) -> bool {
        matches!(self, KeyPurpose::XtsAes256Key1 | KeyPurpose::XtsAes256Key2)
    }
}

#[derive(Debug, Args)]
struct BurnKeyArgs {
    /// Key block to burn
    #[arg(index = 1, value_name = "BLOCK", ignore_case = true)]
    block: String,
    /// File containing the raw key
    #[arg(index = 2, value_name = "KEYFILE")]
    keyfile: PathBuf,
    /// Purpose to assign to the key
    #[arg(index = 3, value_name = "KEYPURPOSE", value_enum, ignore_case = true)]
    keypurpose: KeyPurpose,
    /// Leave the key readable by software
    #[arg(long)]
    no_read_protect: bool,
    /// Leave the key and its purpose writable
    #[arg(long)]
    no_write_protect: bool,
}

fn burn_key_args(command: Command, layout: &EfuseLayout) -> Command {
    BurnKeyArgs::augment_args(command)
        .mut_arg("block", |arg| arg.value_parser(key_blocks(layout, 4..=9)))
}

fn burn_key(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = BurnKeyArgs::from_arg_matches(matches)?;
    let purpose = args.keypurpose;

    if purpose.is_xts_aes_256() && !session.chip().supports_xts_aes_256() {
        return Err(Error::UnsupportedFeature {
            chip: session.chip(),
            feature: format!("the {purpose} key purpose"),
        });
    }

    let block = session.block(&args.block)?;
    let key_field = session.field(block.name)?;
    let purpose_field = session.field(&format!("KEY_PURPOSE_{}", block.index - 4))?;

    match session.read_field(purpose_field)? {
        FieldValue::Uint(0) => {}
        FieldValue::Uint(current) if current == purpose as u64 => {}
        FieldValue::Uint(current) => {
            let current = KeyPurpose::from_raw(current)
                .map(|purpose| purpose.to_string())
                .unwrap_or_else(|| current.to_string());

            return Err(Error::InvalidValue {
                name: purpose_field.name.to_owned(),
                value: purpose.to_string(),
                reason: format!("{} already has the purpose {current}", block.name),
            });
        }
        current => {
            return Err(Error::InvalidValue {
                name: purpose_field.name.to_owned(),
                value: purpose.to_string(),
                reason: format!("{} has an unreadable purpose {current:?}", block.name),
            })
        }
    }

    let mut key = read_key(&args.keyfile, block, block.size())?;
    if !purpose.is_digest() {
        key.reverse();
    }

    info!("Burning {purpose} key into {}", block.name);
    session.stage_block_data(block, 0, &key)?;
    session.stage_field(purpose_field, &FieldValue::Uint(purpose as u64))?;

    if purpose.is_digest() {
        info!("{} holds a digest and stays readable", block.name);
    } else if !args.no_read_protect {
        session.stage_read_protect(key_field)?;
    }

    if !args.no_write_protect {
        session.stage_write_protect(key_field)?;
        session.stage_write_protect(purpose_field)?;
    }

    session.burn_all()
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::{backend::EmulatedBackend, session::bind, target::Chip};

    fn key_file(name: &str, key: &[u8]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("espefuse-keys-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();

        let path = dir.join(name);
        fs::write(&path, key).unwrap();
        path
    }

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
    fn burns_and_protects_esp32_key() {
        let key = (0..32).collect::<Vec<u8>>();
        let path = key_file("esp32-flash-encryption.bin", &key);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(&mut session, &BURN_KEY_ESP32, &["flash_encryption", path.to_str().unwrap()]).unwrap();

        let field = session.field("BLOCK1").unwrap();
        assert!(session.is_read_protected(field).unwrap());
        assert!(session.is_write_protected(field).unwrap());
    }

    #[test]
    fn unprotected_esp32_key_is_stored_reversed() {
        let key = (0..32).collect::<Vec<u8>>();
        let path = key_file("esp32-secure-boot.bin", &key);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(
            &mut session,
            &BURN_KEY_ESP32,
            &["BLOCK2", path.to_str().unwrap(), "--no-protect-key"],
        )
        .unwrap();

        assert_eq!(session.block_words(2).unwrap()[0], 0x1c1d_1e1f);
        assert_eq!(session.block_words(2).unwrap()[7], 0x0001_0203);
    }

    #[test]
    fn key_length_must_match_the_block() {
        let path = key_file("short.bin", &[0xaa; 16]);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        assert!(matches!(
            run(&mut session, &BURN_KEY_ESP32, &["BLOCK3", path.to_str().unwrap()]),
            Err(Error::InvalidValue { .. })
        ));
    }

    #[test]
    fn burns_key_with_purpose() {
        let path = key_file("xts-128.bin", &[0x5a; 32]);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(
            &mut session,
            &BURN_KEY,
            &["BLOCK_KEY1", path.to_str().unwrap(), "XTS_AES_128_KEY"],
        )
        .unwrap();

        assert_eq!(
            session.read("KEY_PURPOSE_1").unwrap(),
            FieldValue::Uint(KeyPurpose::XtsAes128Key as u64)
        );

        let key = session.field("BLOCK_KEY1").unwrap();
        assert!(session.is_read_protected(key).unwrap());
        assert!(session.is_write_protected(key).unwrap());
        assert!(session
            .is_write_protected(session.field("KEY_PURPOSE_1").unwrap())
            .unwrap());
    }

    #[test]
    fn digests_stay_readable() {
        let digest = (0..32).collect::<Vec<u8>>();
        let path = key_file("digest.bin", &digest);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32s3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        run(
            &mut session,
            &BURN_KEY,
            &["block5", path.to_str().unwrap(), "secure_boot_digest0"],
        )
        .unwrap();

        let key = session.field("BLOCK_KEY1").unwrap();
        assert!(!session.is_read_protected(key).unwrap());
        assert_eq!(session.block_words(5).unwrap()[0], 0x0302_0100);
    }

    #[test]
    fn xts_aes_256_needs_chip_support() {
        let path = key_file("xts-256.bin", &[0x11; 32]);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32c3);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        assert!(matches!(
            run(
                &mut session,
                &BURN_KEY,
                &["BLOCK_KEY0", path.to_str().unwrap(), "XTS_AES_256_KEY_1"],
            ),
            Err(Error::UnsupportedFeature { chip: Chip::Esp32c3, .. })
        ));
    }

    #[test]
    fn purpose_can_not_be_changed() {
        let path = key_file("hmac.bin", &[0x22; 32]);

        let mut backend = EmulatedBackend::in_memory(Chip::Esp32h2);
        let (mut session, _) = bind(&mut backend, false, false, true).unwrap();

        let purpose = session.field("KEY_PURPOSE_2").unwrap();
        session.stage_field(purpose, &FieldValue::Uint(5)).unwrap();
        session.burn_all().unwrap();

        match run(
            &mut session,
            &BURN_KEY,
            &["BLOCK_KEY2", path.to_str().unwrap(), "HMAC_UP"],
        ) {
            Err(Error::InvalidValue { reason, .. }) => assert!(reason.contains("HMAC_DOWN_ALL")),
            other => panic!("unexpected result {other:?}"),
        }
    }

    #[test]
    fn names_stored_purposes() {
        assert_eq!(KeyPurpose::from_raw(1), Some(KeyPurpose::Reserved));
        assert_eq!(KeyPurpose::Reserved.to_string(), "RESERVED");
        assert_eq!(
            KeyPurpose::from_raw(KeyPurpose::SecureBootDigest2 as u64),
            Some(KeyPurpose::SecureBootDigest2)
        );
        assert_eq!(KeyPurpose::from_raw(12), None);
    }

    #[test]
    fn non_key_blocks_are_not_offered() {
        let layout = Chip::Esp32c3.efuse_layout();
        let result = BURN_KEY
            .command(layout)
            .try_get_matches_from(["burn-key", "BLOCK_USR_DATA", "key.bin", "USER"]);

        assert!(result.is_err());
    }
}
