//! Extracting a loaded configuration into application types through serde.

use std::collections::BTreeMap;
use std::path::PathBuf;

use coyaml::{ErrorKind, Group, Loader, Node, Schema, Usertype};
use indoc::indoc;
use serde::Deserialize;

#[derive(Debug, Deserialize, PartialEq)]
struct Settings {
    name: Option<String>,
    workers: u16,
    offset: i32,
    debug: bool,
    mode: Mode,
    data_dir: PathBuf,
    listen: Vec<Listen>,
    upstreams: BTreeMap<String, Upstream>,
    log: Log,
}

#[derive(Debug, Deserialize, PartialEq)]
#[serde(rename_all = "kebab-case")]
enum Mode {
    Standalone,
    HotStandby,
}

#[derive(Debug, Deserialize, PartialEq)]
enum Listen {
    Tcp { host: String, port: u16 },
    Unix(UnixSocket),
}

#[derive(Debug, Deserialize, PartialEq)]
struct UnixSocket {
    path: PathBuf,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Upstream {
    hosts: Vec<String>,
    timeout: f64,
}

#[derive(Debug, Deserialize, PartialEq)]
struct Log {
    file: Option<PathBuf>,
    level: u8,
}

fn schema() -> Schema {
    Schema::builder(
        Group::new()
            .field("name", Node::string())
            .field("workers", Node::uint().with_default(4))
            .field("offset", Node::int())
            .field("debug", Node::boolean())
            .field("mode", Node::string().with_default("standalone"))
            .field("data_dir", Node::dir().with_default("/var/lib/app"))
            .field("listen", Node::array(Node::custom("listen")))
            .field("upstreams", Node::mapping(Node::string(), Node::custom("upstream")))
            .field("log", Group::new().field("file", Node::file()).field("level", Node::uint().with_default(2))),
    )
    .usertype(
        Usertype::new(
            "listen",
            Group::new()
                .field("host", Node::string().with_default("0.0.0.0"))
                .field("port", Node::uint().with_default(80))
                .field("path", Node::file()),
        )
        .with_tag("Tcp", 1)
        .with_tag("Unix", 2)
        .with_default_tag(1),
    )
    .usertype(Usertype::new(
        "upstream",
        Group::new()
            .field("hosts", Node::array(Node::string()))
            .field("timeout", Node::float().with_default(5.0)),
    ))
    .build()
    .unwrap()
}

#[test]
fn loaded_document_extracts_into_nested_types() {
    let s = schema();
    let yaml = indoc! {"
        name: edge
        offset: -3
        debug: on
        mode: hot-standby
        listen:
          - {port: 443}
          - !Unix {path: /run/edge.sock}
        upstreams:
          api: {hosts: [a, b], timeout: 1.5}
          static: {hosts: [c]}
        log:
          file: /var/log/edge.log
    "};
    let settings: Settings = Loader::new(&s).load_str(yaml).unwrap().deserialize().unwrap();
    let expected = Settings {
        name: Some("edge".into()),
        workers: 4,
        offset: -3,
        debug: true,
        mode: Mode::HotStandby,
        data_dir: PathBuf::from("/var/lib/app"),
        listen: vec![
            Listen::Tcp {
                host: "0.0.0.0".into(),
                port: 443,
            },
            Listen::Unix(UnixSocket {
                path: PathBuf::from("/run/edge.sock"),
            }),
        ],
        upstreams: BTreeMap::from([
            (
                "api".to_owned(),
                Upstream {
                    hosts: vec!["a".into(), "b".into()],
                    timeout: 1.5,
                },
            ),
            (
                "static".to_owned(),
                Upstream {
                    hosts: vec!["c".into()],
                    timeout: 5.0,
                },
            ),
        ]),
        log: Log {
            file: Some(PathBuf::from("/var/log/edge.log")),
            level: 2,
        },
    };
    assert_eq!(settings, expected);
}

#[test]
fn partial_views_ignore_other_fields() {
    #[derive(Debug, Deserialize)]
    struct LogOnly {
        log: Log,
    }
    let s = schema();
    let view: LogOnly = Loader::new(&s).load_str("log: {level: 5}\n").unwrap().deserialize().unwrap();
    assert_eq!(view.log.level, 5);
    assert_eq!(view.log.file, None);
}

#[test]
fn values_that_do_not_fit_are_value_errors() {
    let s = schema();
    let config = Loader::new(&s).load_str("workers: 70000\n").unwrap();
    let err = config.deserialize::<Settings>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);

    let config = Loader::new(&s).load_str("mode: cluster\n").unwrap();
    let err = config.deserialize::<Settings>().unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(err.to_string().contains("cluster"), "{err}");
}
