//! `!Include` and `!FromFile` resolution against real files.

use std::fs;
use std::path::Path;

use coyaml::{ErrorKind, Group, Loader, Node, Schema, Value};
use indoc::indoc;
use tempfile::TempDir;

fn schema() -> Schema {
    Schema::new(
        Group::new()
            .field("name", Node::string())
            .field("port", Node::uint())
            .field("db", Group::new().field("host", Node::string()).field("pool", Node::uint()))
            .field("hosts", Node::array(Node::string()))
            .field("motd", Node::string())
            .field("key", Node::string()),
    )
    .unwrap()
}

fn write(dir: &Path, name: &str, text: impl AsRef<[u8]>) {
    let path = dir.join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, text).unwrap();
}

#[test]
fn include_resolves_next_to_the_including_file() {
    let tmp = TempDir::new().unwrap();
    let conf = tmp.path().join("conf");
    write(&conf, "main.yaml", "name: main\ndb: !Include other.yaml\n");
    write(&conf, "other.yaml", "host: db.local\npool: 4\n");
    // A file with the same name in the working directory must not be picked up.
    write(tmp.path(), "other.yaml", "host: wrong\n");

    let s = schema();
    let config = Loader::new(&s).load_file(conf.join("main.yaml")).unwrap();
    assert_eq!(config.get_str("name"), Some("main"));
    assert_eq!(config.get_str("db.host"), Some("db.local"));
    assert_eq!(config.get_uint("db.pool"), Some(4));
}

#[test]
fn nested_includes_resolve_relative_to_each_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "db: !Include sub/db.yaml\nhosts: !Include sub/hosts.yaml\n");
    write(tmp.path(), "sub/db.yaml", "host: !Include ../hostname.yaml\npool: 2\n");
    write(tmp.path(), "hostname.yaml", "db.example\n");
    write(tmp.path(), "sub/hosts.yaml", "- a\n- b\n");

    let s = schema();
    let config = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap();
    assert_eq!(config.get_str("db.host"), Some("db.example"));
    assert_eq!(config.get_str("hosts.1"), Some("b"));
}

#[test]
fn root_document_can_be_an_include() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "!Include real.yaml\n");
    write(tmp.path(), "real.yaml", "port: 8080\n");

    let s = schema();
    let config = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap();
    assert_eq!(config.get_uint("port"), Some(8080));
}

#[test]
fn circular_include_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "a.yaml", "db: !Include b.yaml\n");
    write(tmp.path(), "b.yaml", "host: x\npool: !Include a.yaml\n");

    let s = schema();
    let err = Loader::new(&s).load_file(tmp.path().join("a.yaml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.without_context().to_string().contains("circular include"), "{err}");
}

#[test]
fn self_include_is_rejected() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "db: !Include main.yaml\n");

    let s = schema();
    let err = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap_err();
    assert!(err.without_context().to_string().contains("circular include"), "{err}");
}

#[test]
fn missing_include_is_a_value_error_in_the_including_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "name: x\ndb: !Include nowhere.yaml\n");

    let s = schema();
    let err = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(err.location().map(|l| l.line()), Some(2));
    assert!(err.to_string().contains("main.yaml"), "{err}");
}

#[test]
fn errors_inside_included_files_name_that_file() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "db: !Include db.yaml\n");
    write(tmp.path(), "db.yaml", "host: x\npool: many\n");

    let s = schema();
    let err = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert_eq!(err.location().map(|l| l.line()), Some(2));
    assert!(err.to_string().contains("db.yaml"), "{err}");
}

#[test]
fn include_depth_is_limited() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "db: !Include l1.yaml\n");
    write(tmp.path(), "l1.yaml", "!Include l2.yaml\n");
    write(tmp.path(), "l2.yaml", "!Include l3.yaml\n");
    write(tmp.path(), "l3.yaml", "host: deep\n");

    let s = schema();
    let options = coyaml::options! { max_include_depth: 1 };
    let err = Loader::with_options(&s, options)
        .load_file(tmp.path().join("main.yaml"))
        .unwrap_err();
    assert!(err.without_context().to_string().contains("include depth"), "{err}");

    let config = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap();
    assert_eq!(config.get_str("db.host"), Some("deep"));
}

#[test]
fn from_file_reads_the_whole_file_verbatim() {
    let tmp = TempDir::new().unwrap();
    write(
        tmp.path(),
        "main.yaml",
        indoc! {"
            motd: !FromFile motd.txt
            key: !FromFile secret.bin
        "},
    );
    write(tmp.path(), "motd.txt", "Welcome, $USER!\n");
    write(tmp.path(), "secret.bin", [0u8, 159, 146, 150, 255]);

    let s = schema();
    let config = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap();
    // File contents are not substituted.
    assert_eq!(config.get_str("motd"), Some("Welcome, $USER!\n"));
    assert_eq!(config.get("key"), Some(&Value::Bytes(vec![0, 159, 146, 150, 255])));
}

#[test]
fn from_file_respects_the_size_cap() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "motd: !FromFile big.txt\n");
    write(tmp.path(), "big.txt", "x".repeat(4096));

    let s = schema();
    let options = coyaml::options! { max_file_size: Some(1024) };
    let err = Loader::with_options(&s, options)
        .load_file(tmp.path().join("main.yaml"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn from_file_is_only_allowed_on_strings() {
    let tmp = TempDir::new().unwrap();
    write(tmp.path(), "main.yaml", "port: !FromFile port.txt\n");
    write(tmp.path(), "port.txt", "80");

    let s = schema();
    let err = Loader::new(&s).load_file(tmp.path().join("main.yaml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[test]
fn unreadable_root_file_is_an_io_error() {
    let tmp = TempDir::new().unwrap();
    let s = schema();
    let err = Loader::new(&s).load_file(tmp.path().join("absent.yaml")).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
    assert!(err.to_string().contains("absent.yaml"), "{err}");
}
