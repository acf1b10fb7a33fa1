//! Environment and command-line overrides on top of a loaded document.
#![cfg(feature = "cli")]

use coyaml::{CommandLine, ErrorKind, Group, Loader, Node, OverrideTable, Schema, Usertype, apply_env};
use indoc::indoc;

fn schema() -> Schema {
    Schema::builder(
        Group::new()
            .field(
                "port",
                Node::uint()
                    .max(65535)
                    .with_default(8080)
                    .command_line("-p --port")
                    .environ("APP_PORT")
                    .description("Port to listen on"),
            )
            .field(
                "verbosity",
                Node::int()
                    .min(0)
                    .max(3)
                    .command_line_incr("-v --verbose")
                    .command_line_decr("-q --quiet"),
            )
            .field("debug", Node::boolean().command_line("--debug").environ("APP_DEBUG"))
            .field("db", Group::new().field("url", Node::string().command_line("--db-url").environ("DATABASE_URL")))
            .field("primary", Node::custom("backend")),
    )
    .usertype(Usertype::new(
        "backend",
        Group::new().field("weight", Node::uint().with_default(1).command_line("--weight")),
    ))
    .program_name("app")
    .description("Test application")
    .build()
    .unwrap()
}

#[test]
fn environment_overrides_document_values() {
    let s = schema();
    let table = OverrideTable::from_schema(&s);
    let mut config = Loader::new(&s).load_str("port: 81\ndb: {url: sqlite://a}\n").unwrap();
    let env = [("APP_PORT", "2k"), ("DATABASE_URL", "postgres://db/app"), ("APP_DEBUG", "on")];
    apply_env(&mut config, &table, env).unwrap();
    assert_eq!(config.get_uint("port"), Some(2000));
    assert_eq!(config.get_str("db.url"), Some("postgres://db/app"));
    assert_eq!(config.get_bool("debug"), Some(true));
}

#[test]
fn environment_values_are_checked() {
    let s = schema();
    let table = OverrideTable::from_schema(&s);
    let mut config = Loader::new(&s).defaults();
    let err = apply_env(&mut config, &table, [("APP_DEBUG", "perhaps")]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(err.to_string().contains("APP_DEBUG"), "{err}");
    assert_eq!(config.get_bool("debug"), Some(false));
}

#[test]
fn command_line_applies_after_the_document() {
    let s = schema();
    let cli = CommandLine::new(&s);
    let invocation = cli
        .parse_from(["app", "--port", "9000", "-vv", "--db-url", "mem://", "--weight", "5", "-D", "x=1"])
        .unwrap();
    assert_eq!(invocation.vars, ["x=1"]);

    let mut loader = Loader::new(&s);
    invocation.apply_vars(loader.variables_mut()).unwrap();
    let yaml = indoc! {"
        port: 81
        verbosity: 1
        db:
          url: ${x}
    "};
    let mut config = loader.load_str(yaml).unwrap();
    assert_eq!(config.get_str("db.url"), Some("1"));
    cli.apply(&invocation, &mut config).unwrap();
    assert_eq!(config.get_uint("port"), Some(9000));
    assert_eq!(config.get_int("verbosity"), Some(3));
    assert_eq!(config.get_str("db.url"), Some("mem://"));
    assert_eq!(config.get_uint("primary.weight"), Some(5));
}

#[test]
fn counters_respect_bounds() {
    let s = schema();
    let cli = CommandLine::new(&s);
    let invocation = cli.parse_from(["app", "-vvvv"]).unwrap();
    let mut config = Loader::new(&s).defaults();
    let err = cli.apply(&invocation, &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(err.to_string().contains("--verbose"), "{err}");

    let invocation = cli.parse_from(["app", "--quiet"]).unwrap();
    let err = cli.apply(&invocation, &mut config).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn reserved_options_are_parsed() {
    let s = schema();
    let cli = CommandLine::new(&s);
    let invocation = cli
        .parse_from(["app", "-c", "/etc/app.yaml", "-P", "--print-short", "--print-comments", "--debug-config"])
        .unwrap();
    assert_eq!(invocation.config_file.as_deref(), Some(std::path::Path::new("/etc/app.yaml")));
    assert!(invocation.print_config);
    assert!(!invocation.check_config);
    assert!(invocation.debug_config);
    let emit = invocation.emit_options();
    assert!(emit.short && emit.comments);
    assert_eq!(invocation.override_count(), 0);
}

#[test]
fn unknown_flag_is_a_usage_error() {
    let s = schema();
    let cli = CommandLine::new(&s);
    let err = cli.parse_from(["app", "--no-such-flag"]).unwrap_err();
    assert_eq!(err.kind(), clap::error::ErrorKind::UnknownArgument);
}

#[test]
fn help_lists_schema_flags() {
    let s = schema();
    let cli = CommandLine::new(&s);
    let help = cli.command().clone().render_help().to_string();
    assert!(help.contains("--port"), "{help}");
    assert!(help.contains("Port to listen on"), "{help}");
    assert!(help.contains("--print-config"), "{help}");
    assert!(help.contains("Test application"), "{help}");
}
