//! A small server configuration built from a schema defined in code.
//!
//! Try:
//!
//! ```text
//! cargo run --example server_config -- -P
//! cargo run --example server_config -- --workers 8 -vv --print-short -P
//! SERVER_PORT=9000 cargo run --example server_config
//! ```

use std::collections::BTreeMap;

use anyhow::Context;
use coyaml::{apply_env, emit, CommandLine, Group, Inheritance, Loader, Node, Schema, Usertype};
use serde::Deserialize;

const DEFAULT_CONFIG: &str = r#"
name: demo
listen:
  - !Tcp {host: 0.0.0.0, port: 8080}
  - !Unix {path: /run/demo.sock}
upstreams:
  api: &backend
    hosts: [10.0.0.1, 10.0.0.2]
    timeout: 3
  static:
    <<: *backend
    timeout: 1
"#;

#[derive(Debug, Deserialize)]
struct ServerConfig {
    name: String,
    workers: u64,
    verbosity: i64,
    listen: Vec<Listen>,
    upstreams: BTreeMap<String, Upstream>,
    log: Log,
}

#[derive(Debug, Deserialize)]
enum Listen {
    Tcp { host: String, port: u64 },
    Unix { path: String },
}

#[derive(Debug, Deserialize)]
struct Upstream {
    hosts: Vec<String>,
    timeout: f64,
}

#[derive(Debug, Deserialize)]
struct Log {
    file: Option<String>,
    level: i64,
}

fn schema() -> anyhow::Result<Schema> {
    let schema = Schema::builder(
        Group::new()
            .field("name", Node::string().with_default("server").description("Instance name"))
            .field(
                "workers",
                Node::uint()
                    .min(1)
                    .max(256)
                    .with_default(4)
                    .command_line("-w --workers")
                    .environ("SERVER_WORKERS"),
            )
            .field(
                "verbosity",
                Node::int()
                    .with_default(0)
                    .command_line_incr("-v")
                    .command_line_decr("-q"),
            )
            .field("listen", Node::array(Node::custom("listen")))
            .field("upstreams", Node::mapping(Node::string(), Node::custom("upstream")))
            .field(
                "log",
                Group::new()
                    .field("file", Node::file().command_line("--log-file"))
                    .field("level", Node::int().min(0).max(5).with_default(2)),
            ),
    )
    .usertype(
        Usertype::new(
            "listen",
            Group::new()
                .field("host", Node::string().with_default("127.0.0.1"))
                .field("port", Node::uint().max(65535).with_default(80).environ("SERVER_PORT"))
                .field("path", Node::string().with_default("")),
        )
        .with_tag("Tcp", 1)
        .with_tag("Unix", 2)
        .with_default_tag(1),
    )
    .usertype(Usertype::new(
        "upstream",
        Group::new()
            .field("hosts", Node::array(Node::string()).inheritance(Inheritance::AppendToDefault))
            .field("timeout", Node::float().min(0.0).with_default(5.0)),
    ))
    .program_name("server_config")
    .description("Example server configured from YAML, the environment and the command line")
    .build()?;
    Ok(schema)
}

fn main() -> anyhow::Result<()> {
    let schema = schema()?;
    let command_line = CommandLine::new(&schema);
    let invocation = command_line.parse_from(std::env::args_os()).unwrap_or_else(|e| e.exit());

    let mut loader = Loader::new(&schema);
    invocation.apply_vars(loader.variables_mut())?;
    let mut config = match &invocation.config_file {
        Some(path) => loader.load_file(path).with_context(|| format!("loading {}", path.display()))?,
        None => loader.load_str(DEFAULT_CONFIG)?,
    };
    apply_env(&mut config, command_line.table(), std::env::vars())?;
    command_line.apply(&invocation, &mut config)?;

    if invocation.print_config {
        print!("{}", emit(&config, &invocation.emit_options()));
        return Ok(());
    }

    let server: ServerConfig = config.deserialize()?;
    println!("{} starts {} workers (verbosity {})", server.name, server.workers, server.verbosity);
    for listen in &server.listen {
        match listen {
            Listen::Tcp { host, port } => println!("  listening on {host}:{port}"),
            Listen::Unix { path } => println!("  listening on unix socket {path}"),
        }
    }
    for (name, upstream) in &server.upstreams {
        println!("  upstream {name}: {:?} (timeout {}s)", upstream.hosts, upstream.timeout);
    }
    match &server.log.file {
        Some(file) => println!("  logging at level {} to {file}", server.log.level),
        None => println!("  logging at level {} to stderr", server.log.level),
    }
    Ok(())
}
