//! Tagged usertypes: tag dispatch, scalar and sequence forms, and inheritance from the
//! enclosing instance of the same variant.

use coyaml::{Config, ErrorKind, Group, Inheritance, Loader, Node, Schema, Usertype, Value};
use indoc::indoc;

fn listen_schema() -> Schema {
    Schema::builder(Group::new().field("listen", Node::array(Node::custom("listen"))))
        .usertype(
            Usertype::new(
                "listen",
                Group::new()
                    .field("host", Node::string())
                    .field("port", Node::uint().max(65535).with_default(80))
                    .field("path", Node::file()),
            )
            .with_tag("Tcp", 1)
            .with_tag("Inet", 1)
            .with_tag("Unix", 2)
            .with_default_tag(1)
            .with_scalar_hook(|text, fields| match text.rsplit_once(':') {
                Some((host, port)) => {
                    fields.set("host", host)?;
                    fields.set("port", port)
                }
                None => fields.set("path", text),
            }),
        )
        .build()
        .unwrap()
}

fn tag_of(config: &Config<'_>, path: &str) -> Option<String> {
    let Some(Value::User(r)) = config.get(path) else {
        panic!("{path} is not a usertype instance");
    };
    config.describe_user(*r).1.map(str::to_owned)
}

#[test]
fn tags_select_variants() {
    let s = listen_schema();
    let yaml = indoc! {"
        listen:
          - {host: a, port: 81}
          - !Unix {path: /run/x.sock}
          - !Inet {host: b}
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(tag_of(&config, "listen.0").as_deref(), Some("Tcp"));
    assert_eq!(tag_of(&config, "listen.1").as_deref(), Some("Unix"));
    // `Inet` shares the discriminant of `Tcp`; the first declared name is reported.
    assert_eq!(tag_of(&config, "listen.2").as_deref(), Some("Tcp"));
    assert_eq!(config.get_uint("listen.2.port"), Some(80));
    assert_eq!(config.get_str("listen.1.path"), Some("/run/x.sock"));
}

#[test]
fn unknown_tag_is_a_syntax_error() {
    let s = listen_schema();
    let err = Loader::new(&s).load_str("listen:\n  - !Udp {port: 1}\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    assert!(err.to_string().contains("!Udp"), "{err}");
}

#[test]
fn untagged_instance_without_default_tag_is_rejected() {
    let s = Schema::builder(Group::new().field("shape", Node::custom("shape")))
        .usertype(
            Usertype::new("shape", Group::new().field("size", Node::uint()))
                .with_tag("Circle", 1)
                .with_tag("Square", 2),
        )
        .build()
        .unwrap();
    let loader = Loader::new(&s);
    let err = loader.load_str("shape: {size: 3}\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
    let config = loader.load_str("shape: !Square {size: 3}\n").unwrap();
    assert_eq!(config.get_uint("shape.size"), Some(3));
}

#[test]
fn scalar_form_goes_through_the_hook() {
    let s = listen_schema();
    let yaml = indoc! {"
        listen:
          - example.org:8443
          - !Unix /run/y.sock
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_str("listen.0.host"), Some("example.org"));
    assert_eq!(config.get_uint("listen.0.port"), Some(8443));
    assert_eq!(config.get_str("listen.1.path"), Some("/run/y.sock"));
    assert_eq!(tag_of(&config, "listen.1").as_deref(), Some("Unix"));
}

#[test]
fn hook_errors_are_value_errors() {
    let s = listen_schema();
    let err = Loader::new(&s).load_str("listen:\n  - host:99999\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn scalar_form_without_hook_is_a_syntax_error() {
    let s = Schema::builder(Group::new().field("item", Node::custom("item")))
        .usertype(Usertype::new("item", Group::new().field("n", Node::int())))
        .build()
        .unwrap();
    let err = Loader::new(&s).load_str("item: 5\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

fn acl_schema() -> Schema {
    Schema::builder(Group::new().field("acl", Node::custom("acl")))
        .usertype(
            Usertype::new(
                "acl",
                Group::new()
                    .field("value", Node::array(Node::string()))
                    .field("log", Node::boolean()),
            )
            .with_tag("Allow", 1)
            .with_tag("Deny", 2)
            .with_default_tag(1),
        )
        .build()
        .unwrap()
}

#[test]
fn sequence_form_fills_the_value_array() {
    let s = acl_schema();
    let config = Loader::new(&s).load_str("acl: !Deny [10.0.0.0/8, 192.168.0.0/16]\n").unwrap();
    assert_eq!(tag_of(&config, "acl").as_deref(), Some("Deny"));
    assert_eq!(config.get_str("acl.value.1"), Some("192.168.0.0/16"));
    assert_eq!(config.get_bool("acl.log"), Some(false));
}

#[test]
fn equals_key_is_an_alias_for_value() {
    let s = acl_schema();
    let config = Loader::new(&s).load_str("acl:\n  =: [a, b]\n  log: yes\n").unwrap();
    assert_eq!(config.get_str("acl.value.0"), Some("a"));
    assert_eq!(config.get_bool("acl.log"), Some(true));
}

#[test]
fn equals_key_and_value_key_are_duplicates() {
    let s = acl_schema();
    let config = Loader::new(&s).load_str("acl:\n  =: [a]\n  value: [b, c]\n").unwrap();
    assert_eq!(config.get_str("acl.value.0"), Some("a"));
    assert_eq!(config.get("acl.value.1"), None);
}

fn site_schema(hosts: Inheritance) -> Schema {
    Schema::builder(Group::new().field("site", Node::custom("site")))
        .usertype(
            Usertype::new(
                "site",
                Group::new()
                    .field("name", Node::string())
                    .field("timeout", Node::uint().with_default(30))
                    .field("limits", Group::new().field("rps", Node::uint()))
                    .field("hosts", Node::array(Node::string()).inheritance(hosts))
                    .field("children", Node::array(Node::custom("site"))),
            )
            .with_tag("Http", 1)
            .with_tag("Static", 2)
            .with_default_tag(1),
        )
        .build()
        .unwrap()
}

#[test]
fn nested_instances_inherit_unset_fields() {
    let s = site_schema(Inheritance::None);
    let yaml = indoc! {"
        site:
          name: root
          timeout: 5
          limits: {rps: 100}
          children:
            - name: api
            - name: assets
              timeout: 60
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_str("site.children.0.name"), Some("api"));
    assert_eq!(config.get_uint("site.children.0.timeout"), Some(5));
    assert_eq!(config.get_uint("site.children.0.limits.rps"), Some(100));
    assert_eq!(config.get_uint("site.children.1.timeout"), Some(60));
}

#[test]
fn different_variant_does_not_inherit() {
    let s = site_schema(Inheritance::None);
    let yaml = indoc! {"
        site:
          timeout: 5
          children:
            - !Static {name: files}
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_uint("site.children.0.timeout"), Some(30));
}

#[test]
fn explicit_values_are_never_overwritten() {
    let s = site_schema(Inheritance::None);
    let yaml = indoc! {"
        site:
          name: root
          hosts: [a]
          children:
            - name: child
              hosts: [b]
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_str("site.children.0.name"), Some("child"));
    assert_eq!(config.get_str("site.children.0.hosts.0"), Some("b"));
    assert_eq!(config.get("site.children.0.hosts.1"), None);
}

#[test]
fn replace_default_lists_can_opt_into_appending() {
    let s = site_schema(Inheritance::ReplaceDefault);
    let yaml = indoc! {"
        site:
          hosts: [a]
          children:
            - hosts: !Append [b]
            - hosts: [c]
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_str("site.children.0.hosts.0"), Some("b"));
    assert_eq!(config.get_str("site.children.0.hosts.1"), Some("a"));
    assert_eq!(config.get_str("site.children.1.hosts.0"), Some("c"));
    assert_eq!(config.get("site.children.1.hosts.1"), None);
}

#[test]
fn list_tags_are_rejected_elsewhere() {
    let s = site_schema(Inheritance::None);
    let err = Loader::new(&s).load_str("site:\n  hosts: !Bogus [a]\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
}
