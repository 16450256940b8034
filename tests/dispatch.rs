use std::{
    cell::Cell,
    fs,
    path::{Path, PathBuf},
    rc::Rc,
};

use espefuse::{
    backend::{EfuseBackend, EmulatedBackend},
    bind,
    connection::reset::ResetBeforeOperation,
    dispatch::{Confirm, Dispatcher, Outcome, PendingAction},
    resolver::{ChipResolver, Resolve, ResolveRequest},
    Chip,
    Error,
    FieldValue,
};
use pretty_assertions::assert_eq;
use strum::IntoEnumIterator;

fn efuse_file(name: &str) -> PathBuf {
    let dir = std::env::temp_dir().join(format!("espefuse-dispatch-{}", std::process::id()));
    fs::create_dir_all(&dir).unwrap();

    let path = dir.join(name);
    let _ = fs::remove_file(&path);
    path
}

fn never_confirm(_: &PendingAction) -> bool {
    panic!("confirmation must not be requested");
}

fn read_field(chip: Chip, path: &Path, name: &str) -> FieldValue {
    let mut backend = EmulatedBackend::new(chip, Some(path.to_owned())).unwrap();
    let (session, _) = bind(&mut backend, false, false, false).unwrap();

    session.read(name).unwrap()
}

#[test]
fn summary_leaves_efuse_file_unchanged() {
    let path = efuse_file("summary.bin");
    let args = [
        "espefuse",
        "--chip",
        "esp32s3",
        "--virt",
        "--path-efuse-file",
        path.to_str().unwrap(),
        "summary",
    ];

    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);
    assert_eq!(dispatcher.run_from(args).unwrap(), Outcome::Succeeded);
    let before = fs::read(&path).unwrap();

    assert_eq!(dispatcher.run_from(args).unwrap(), Outcome::Succeeded);
    assert_eq!(fs::read(&path).unwrap(), before);
}

#[test]
fn emulating_auto_is_a_configuration_error() {
    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);
    let result = dispatcher.run_from(["espefuse", "--virt", "summary"]);

    assert!(matches!(result, Err(Error::Configuration(_))));
}

#[test]
fn unknown_operation_is_fatal() {
    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);
    let result = dispatcher.run_from(["espefuse", "--chip", "esp32", "--virt", "erase-everything"]);

    assert!(matches!(result, Err(Error::UnknownOperation(name)) if name == "erase-everything"));
}

#[test]
fn burning_without_confirmation() {
    let path = efuse_file("do-not-confirm.bin");

    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);
    let outcome = dispatcher
        .run_from([
            "espefuse",
            "--chip",
            "esp32c3",
            "--virt",
            "--path-efuse-file",
            path.to_str().unwrap(),
            "--do-not-confirm",
            "burn-efuse",
            "DIS_PAD_JTAG",
            "1",
        ])
        .unwrap();

    assert_eq!(outcome, Outcome::Succeeded);
    assert_eq!(
        read_field(Chip::Esp32c3, &path, "DIS_PAD_JTAG"),
        FieldValue::Bool(true)
    );
}

#[test]
fn confirmed_burn_is_persisted() {
    let path = efuse_file("confirmed.bin");
    let mut actions = Vec::new();

    let outcome = Dispatcher::new(ChipResolver, |action: &PendingAction| {
        actions.push(action.clone());
        true
    })
    .run_from([
        "espefuse",
        "--chip",
        "esp32",
        "--virt",
        "--path-efuse-file",
        path.to_str().unwrap(),
        "burn-efuse",
        "JTAG_DISABLE",
        "1",
    ])
    .unwrap();

    assert_eq!(outcome, Outcome::Succeeded);
    assert_eq!(
        actions,
        vec![PendingAction {
            chip: Chip::Esp32,
            operation: String::from("burn-efuse"),
            arguments: vec![String::from("JTAG_DISABLE"), String::from("1")],
        }]
    );
    assert_eq!(
        read_field(Chip::Esp32, &path, "JTAG_DISABLE"),
        FieldValue::Bool(true)
    );
}

#[test]
fn declined_confirmation_aborts() {
    let path = efuse_file("declined.bin");
    let args = [
        "espefuse",
        "--chip",
        "esp32h2",
        "--virt",
        "--path-efuse-file",
        path.to_str().unwrap(),
        "burn-bit",
        "BLOCK3",
        "0",
        "1",
    ];

    let mut asked = 0;
    let outcome = Dispatcher::new(ChipResolver, |_: &PendingAction| {
        asked += 1;
        false
    })
    .run_from(args)
    .unwrap();

    assert_eq!(outcome, Outcome::Aborted);
    assert_eq!(outcome.exit_code(), 1);
    assert_eq!(asked, 1);
    assert!(fs::read(&path).unwrap().iter().all(|byte| *byte == 0));
}

#[test]
fn burning_a_key_from_the_command_line() {
    let path = efuse_file("burn-key.bin");
    let key = efuse_file("burn-key-key.bin");
    fs::write(&key, [0x5a; 32]).unwrap();

    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);
    let outcome = dispatcher
        .run_from([
            "espefuse",
            "--chip",
            "esp32c3",
            "--virt",
            "--path-efuse-file",
            path.to_str().unwrap(),
            "--do-not-confirm",
            "burn-key",
            "BLOCK_KEY1",
            key.to_str().unwrap(),
            "XTS_AES_128_KEY",
        ])
        .unwrap();

    assert_eq!(outcome, Outcome::Succeeded);
    assert_eq!(
        read_field(Chip::Esp32c3, &path, "KEY_PURPOSE_1"),
        FieldValue::Uint(4)
    );
}

#[test]
fn help_without_chip_needs_no_device() {
    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);

    assert_eq!(
        dispatcher.run_from(["espefuse", "--help"]).unwrap(),
        Outcome::HelpDisplayed
    );
    assert_eq!(
        dispatcher.run_from(["espefuse", "burn-key", "--help"]).unwrap(),
        Outcome::HelpDisplayed
    );
}

#[test]
fn missing_operation_prints_help() {
    let mut dispatcher = Dispatcher::new(ChipResolver, never_confirm);
    let outcome = dispatcher.run_from(["espefuse", "--chip", "esp32s2"]).unwrap();

    assert_eq!(outcome, Outcome::NoOperation);
    assert_eq!(outcome.exit_code(), 1);
}

#[test]
fn every_chip_binds_to_its_own_operations() {
    for chip in Chip::iter() {
        let mut backend = EmulatedBackend::in_memory(chip);
        let (session, registry) = bind(&mut backend, false, false, false).unwrap();

        assert_eq!(session.chip(), chip);
        for name in ["summary", "dump", "burn-efuse", "burn-key"] {
            assert_eq!(registry.lookup(name).unwrap().name, name);
        }
    }
}

/// A backend reporting an arbitrary chip name, counting how often it is
/// released
struct MockBackend {
    name: &'static str,
    closes: Rc<Cell<usize>>,
    fail_close: bool,
}

impl EfuseBackend for MockBackend {
    fn chip_name(&self) -> &str {
        self.name
    }

    fn connect(&mut self, _before: ResetBeforeOperation) -> Result<(), Error> {
        Ok(())
    }

    fn read_reg(&mut self, _address: u32) -> Result<u32, Error> {
        Ok(0)
    }

    fn write_reg(&mut self, _address: u32, _value: u32) -> Result<(), Error> {
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.closes.set(self.closes.get() + 1);

        if self.fail_close {
            Err(Error::NotConnected)
        } else {
            Ok(())
        }
    }
}

struct MockResolver {
    name: &'static str,
    closes: Rc<Cell<usize>>,
    fail_close: bool,
}

impl MockResolver {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            closes: Rc::new(Cell::new(0)),
            fail_close: false,
        }
    }
}

impl Resolve for MockResolver {
    fn resolve(&mut self, _request: &ResolveRequest) -> Result<Box<dyn EfuseBackend>, Error> {
        Ok(Box::new(MockBackend {
            name: self.name,
            closes: self.closes.clone(),
            fail_close: self.fail_close,
        }))
    }
}

fn closes_after(args: &[&str]) -> (Result<Outcome, Error>, usize) {
    let resolver = MockResolver::new("ESP32-C3");
    let closes = resolver.closes.clone();

    let result = Dispatcher::new(resolver, |_: &PendingAction| false).run_from(args);
    (result, closes.get())
}

#[test]
fn backend_is_released_exactly_once() {
    let (result, closes) = closes_after(&["espefuse", "summary"]);
    assert_eq!(result.unwrap(), Outcome::Succeeded);
    assert_eq!(closes, 1);

    let (result, closes) = closes_after(&["espefuse", "--help"]);
    assert_eq!(result.unwrap(), Outcome::HelpDisplayed);
    assert_eq!(closes, 1);

    let (result, closes) = closes_after(&["espefuse"]);
    assert_eq!(result.unwrap(), Outcome::NoOperation);
    assert_eq!(closes, 1);

    let (result, closes) = closes_after(&["espefuse", "burn-efuse", "DIS_PAD_JTAG", "1"]);
    assert_eq!(result.unwrap(), Outcome::Aborted);
    assert_eq!(closes, 1);

    let (result, closes) = closes_after(&["espefuse", "frobnicate"]);
    assert!(matches!(result, Err(Error::UnknownOperation(_))));
    assert_eq!(closes, 1);

    let (result, closes) = closes_after(&["espefuse", "summary", "NO_SUCH_FIELD"]);
    assert!(matches!(result, Err(Error::Cli(_))));
    assert_eq!(closes, 1);
}

/// A prompt that fails, like a terminal that went away
struct FailingConfirm;

impl Confirm for FailingConfirm {
    fn confirm(&mut self, _action: &PendingAction) -> Result<bool, Error> {
        Err(Error::Cancelled)
    }
}

#[test]
fn failed_confirmation_is_reported_and_released() {
    let resolver = MockResolver::new("ESP32-C3");
    let closes = resolver.closes.clone();

    let result = Dispatcher::new(resolver, FailingConfirm)
        .run_from(["espefuse", "burn-efuse", "DIS_PAD_JTAG", "1"]);

    assert!(matches!(result, Err(Error::Cancelled)));
    assert_eq!(closes.get(), 1);
}

#[test]
fn release_error_is_reported_after_success_only() {
    let mut resolver = MockResolver::new("ESP32-C3");
    resolver.fail_close = true;
    let closes = resolver.closes.clone();

    let mut dispatcher = Dispatcher::new(resolver, |_: &PendingAction| true);

    assert!(matches!(
        dispatcher.run_from(["espefuse", "summary"]),
        Err(Error::NotConnected)
    ));
    assert!(matches!(
        dispatcher.run_from(["espefuse", "--do-not-confirm", "burn-efuse", "NO_SUCH_FIELD", "1"]),
        Err(Error::UnknownField { .. })
    ));
    assert_eq!(closes.get(), 2);
}

#[test]
fn unsupported_chip_is_rejected_and_released() {
    let resolver = MockResolver::new("ESP8266");
    let closes = resolver.closes.clone();

    let result = Dispatcher::new(resolver, never_confirm).run_from(["espefuse", "summary"]);

    assert!(matches!(result, Err(Error::UnsupportedChip(name)) if name == "ESP8266"));
    assert_eq!(closes.get(), 1);
}

#[test]
fn failed_resolution_acquires_nothing() {
    struct FailingResolver;

    impl Resolve for FailingResolver {
        fn resolve(&mut self, _request: &ResolveRequest) -> Result<Box<dyn EfuseBackend>, Error> {
            Err(Error::ChipDetect(String::from("no reply")))
        }
    }

    let result = Dispatcher::new(FailingResolver, never_confirm).run_from(["espefuse", "summary"]);
    assert!(matches!(result, Err(Error::ChipDetect(_))));
}
