//! Subcommands and the runtime part of the command line surface

pub mod get_token;
pub mod start;

use clap::builder::BoolishValueParser;
use clap::{Arg, ArgAction, ArgMatches, Command};
use exporter_lib::collector::{ConfigOption, OptionKind, OptionValues};

/// Command line argument for a collector configuration option
pub fn option_arg(option: &ConfigOption) -> Arg {
    let arg = Arg::new(option.name.clone())
        .long(option.name.clone())
        .env(option.env.clone())
        .help(option.help.clone());

    match option.kind {
        OptionKind::List => arg
            .action(ArgAction::Append)
            .value_delimiter(',')
            .value_name("VALUE"),
        OptionKind::Toggle => arg
            .action(ArgAction::SetTrue)
            .value_parser(BoolishValueParser::new()),
    }
}

/// Add every option to `command`
pub fn with_options(command: Command, options: &[ConfigOption]) -> Command {
    options
        .iter()
        .fold(command, |command, option| command.arg(option_arg(option)))
}

/// Read the values of `options` back out of parsed matches
pub fn option_values(options: &[ConfigOption], matches: &ArgMatches) -> OptionValues {
    let mut values = OptionValues::new();

    for option in options {
        match option.kind {
            OptionKind::List => {
                if let Some(given) = matches.get_many::<String>(&option.name) {
                    values.set_list(&option.name, given.cloned());
                }
            }
            OptionKind::Toggle => {
                if matches.get_flag(&option.name) {
                    values.enable(&option.name);
                }
            }
        }
    }

    values
}
