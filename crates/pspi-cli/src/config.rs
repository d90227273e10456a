//! Splits configuration flags from subcommand tokens.
//!
//! Configuration flags must precede the subcommand. Everything from the
//! first token that is not a recognised configuration flag onwards is
//! handed to the subcommand parser.

use std::ffi::{OsStr, OsString};

/// Flags understood by the configuration loader.
const CONFIG_CLI_FLAGS: &[&str] = &[
    "--config-path",
    "--search-path",
    "--state-dir",
    "--log-filter",
    "--log-format",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FlagAction {
    Include { needs_value: bool },
    Skip,
}

fn process_config_flag(argument: &OsStr) -> FlagAction {
    let text = argument.to_string_lossy();
    if !text.starts_with("--") {
        return FlagAction::Skip;
    }
    let (flag, has_inline_value) = text
        .split_once('=')
        .map_or((&*text, false), |(name, _)| (name, true));
    if CONFIG_CLI_FLAGS.contains(&flag) {
        FlagAction::Include {
            needs_value: !has_inline_value,
        }
    } else {
        FlagAction::Skip
    }
}

/// Arguments partitioned between the configuration loader and clap.
#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct ArgumentSplit {
    /// Program name followed by configuration flags.
    pub(crate) config_arguments: Vec<OsString>,
    /// Program name followed by the subcommand and its arguments.
    pub(crate) command_arguments: Vec<OsString>,
}

pub(crate) fn split_arguments(args: &[OsString]) -> ArgumentSplit {
    let Some((program, rest)) = args.split_first() else {
        return ArgumentSplit::default();
    };
    let mut config_arguments = vec![program.clone()];
    let mut tokens = rest.iter().peekable();
    while let Some(token) = tokens.peek() {
        match process_config_flag(token) {
            FlagAction::Include { needs_value } => {
                config_arguments.extend(tokens.next().cloned());
                if needs_value {
                    config_arguments.extend(tokens.next().cloned());
                }
            }
            FlagAction::Skip => break,
        }
    }
    let mut command_arguments = vec![program.clone()];
    command_arguments.extend(tokens.cloned());
    ArgumentSplit {
        config_arguments,
        command_arguments,
    }
}
