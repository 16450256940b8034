use std::collections::BTreeMap;

use clap::{ArgMatches, Args, Command, FromArgMatches};

use super::{field_names, no_args, parse::format_mac, Operation};
use crate::{
    error::Error,
    session::{EfuseSession, FieldValue},
    target::efuse::{Category, EfuseField, EfuseLayout, FieldKind},
};

pub(super) const SUMMARY: Operation = Operation {
    name: "summary",
    about: "Print a human-readable summary of the eFuse values",
    destructive: false,
    args: summary_args,
    run: summary,
};

pub(super) const DUMP: Operation = Operation {
    name: "dump",
    about: "Dump the raw content of every eFuse block",
    destructive: false,
    args: no_args,
    run: dump,
};

#[derive(Debug, Args)]
struct SummaryArgs {
    /// Only print the given fields
    #[arg(value_name = "FIELD", ignore_case = true)]
    fields: Vec<String>,
}

fn summary_args(command: Command, layout: &EfuseLayout) -> Command {
    SummaryArgs::augment_args(command).mut_arg("fields", |arg| arg.value_parser(field_names(layout)))
}

fn summary(session: &mut EfuseSession<'_>, matches: &ArgMatches) -> Result<(), Error> {
    let args = SummaryArgs::from_arg_matches(matches)?;

    let fields = if args.fields.is_empty() {
        session.layout().fields.iter().collect::<Vec<_>>()
    } else {
        args.fields
            .iter()
            .map(|name| session.field(name))
            .collect::<Result<Vec<_>, _>>()?
    };

    let mut categories: BTreeMap<Category, Vec<&EfuseField>> = BTreeMap::new();
    for field in fields {
        categories.entry(field.category).or_default().push(field);
    }

    println!("{:<40} {:<48} {}", "EFUSE_NAME (Block)", "Value", "R/W");
    println!("{}", "-".repeat(95));

    for (category, fields) in categories {
        println!("{category}:");

        for field in fields {
            let name = format!("{} (BLOCK{})", field.name, field.block);
            let value = format_value(session, field)?;
            let access = format!(
                "{}/{}",
                if session.is_read_protected(field)? { "-" } else { "R" },
                if session.is_write_protected(field)? { "-" } else { "W" },
            );

            println!("{name:<40} = {value:<46} {access}");
        }
        println!();
    }

    if let Some(block) = session.layout().block(3) {
        println!("{} coding scheme: {}", block.name, session.coding_scheme(block)?);
    }

    Ok(())
}

fn format_value(session: &EfuseSession<'_>, field: &EfuseField) -> Result<String, Error> {
    let value = session.read_field(field)?;

    if field.kind == FieldKind::Bytes && session.is_read_protected(field)? {
        return Ok(vec!["??"; field.byte_len()].join(" "));
    }

    Ok(match (field.kind, value) {
        (FieldKind::Mac, FieldValue::Bytes(bytes)) => format_mac(&bytes),
        (FieldKind::Bytes, FieldValue::Bytes(bytes)) => bytes
            .iter()
            .rev()
            .map(|b| format!("{b:02x}"))
            .collect::<Vec<_>>()
            .join(" "),
        (_, value) => value.to_string(),
    })
}

fn dump(session: &mut EfuseSession<'_>, _matches: &ArgMatches) -> Result<(), Error> {
    for block in session.layout().blocks {
        let words = session
            .block_words(block.index)?
            .iter()
            .map(|word| format!("{word:08x}"))
            .collect::<Vec<_>>()
            .join(" ");

        let alias = block.aliases.first().copied().unwrap_or_default();
        println!("{:<16}({alias:<16}) [{:<2}] read_regs: {words}", block.name, block.index);
    }

    Ok(())
}
