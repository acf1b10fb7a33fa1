#![forbid(unsafe_code)]

use std::path::Path;
use std::process::exit;

use clap::error::ErrorKind as ClapErrorKind;
use coyaml::{CommandLine, Loader, Options, Schema, apply_env, emit, load_schema_file};
use tracing::Level;

const USAGE: &str = "usage: coyaml SCHEMA [options]\n\n\
    Loads the schema description SCHEMA, then loads and validates a configuration against it. \
    Run `coyaml SCHEMA --help` for the options the schema defines.";

fn install_logging(debug: bool) {
    let level = if debug { Level::DEBUG } else { Level::WARN };
    let _ = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

/// Validate or print a configuration described by a schema file.
///
/// Exit codes: 0 success, 1 usage error, 2 unreadable schema, 3 invalid configuration.
fn main() {
    let mut args = std::env::args_os();
    let program = args.next().unwrap_or_else(|| "coyaml".into());
    let Some(schema_path) = args.next() else {
        eprintln!("{USAGE}");
        exit(1);
    };
    if schema_path == "-h" || schema_path == "--help" {
        println!("{USAGE}");
        exit(0);
    }

    let schema: Schema = match load_schema_file(&schema_path) {
        Ok(schema) => schema,
        Err(err) => {
            eprintln!("{}: invalid schema:\n{err}", schema_path.to_string_lossy());
            exit(2);
        }
    };

    let command_line = CommandLine::new(&schema);
    let invocation = match command_line.parse_from(std::iter::once(program).chain(args)) {
        Ok(invocation) => invocation,
        Err(err) => {
            let _ = err.print();
            match err.kind() {
                ClapErrorKind::DisplayHelp | ClapErrorKind::DisplayVersion => exit(0),
                _ => exit(1),
            }
        }
    };
    install_logging(invocation.debug_config);

    let options = Options {
        debug: invocation.debug_config,
        ..Options::default()
    };
    let mut loader = Loader::with_options(&schema, options);
    if let Err(err) = invocation.apply_vars(loader.variables_mut()) {
        eprintln!("{err}");
        exit(1);
    }

    let file = invocation
        .config_file
        .clone()
        .or_else(|| schema.default_config().map(Path::to_path_buf));
    let loaded = match &file {
        Some(path) => loader.load_file(path),
        None => Ok(loader.defaults()),
    };
    let mut config = match loaded {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{err}");
            exit(3);
        }
    };

    let overridden = apply_env(&mut config, command_line.table(), std::env::vars())
        .and_then(|()| command_line.apply(&invocation, &mut config));
    if let Err(err) = overridden {
        eprintln!("{err}");
        exit(3);
    }

    if invocation.print_config {
        print!("{}", emit(&config, &invocation.emit_options()));
    } else if invocation.check_config {
        if let Some(path) = &file {
            eprintln!("{}: configuration is valid", path.display());
        }
    }
}
