use coyaml::{ErrorKind, Group, Loader, Node, Schema};
use indoc::indoc;

fn schema() -> Schema {
    Schema::new(
        Group::new()
            .field("url", Node::string())
            .field("path", Node::file())
            .field("workers", Node::int())
            .field("limit", Node::uint().max(10_000))
            .field("ratio", Node::float())
            .field("note", Node::string()),
    )
    .unwrap()
}

#[test]
fn variables_from_the_table_are_substituted() {
    let s = schema();
    let mut loader = Loader::new(&s);
    loader.variables_mut().set_string("host", "example.org");
    loader.variables_mut().set_integer("cpus", 4);
    let yaml = indoc! {"
        url: http://$host:${cpus}000/
        workers: $cpus
        limit: ${cpus * 2k}
    "};
    let config = loader.load_str(yaml).unwrap();
    assert_eq!(config.get_str("url"), Some("http://example.org:4000/"));
    assert_eq!(config.get_int("workers"), Some(4));
    assert_eq!(config.get_uint("limit"), Some(8000));
}

#[test]
fn scalar_anchors_can_be_used_as_variables() {
    let s = schema();
    let yaml = indoc! {"
        _base: &root /srv/app
        path: $root/data
        workers: &n 3
        limit: ${n * 100}
    "};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_str("path"), Some("/srv/app/data"));
    assert_eq!(config.get_uint("limit"), Some(300));
}

#[test]
fn anchor_after_quoted_hash_keeps_its_name() {
    let s = schema();
    let yaml = indoc! {r#"
        _l: ["a #b", &x hello]
        note: pre-$x
    "#};
    let config = Loader::new(&s).load_str(yaml).unwrap();
    assert_eq!(config.get_str("note"), Some("pre-hello"));
}

#[test]
fn table_wins_over_anchor_of_the_same_name() {
    let s = schema();
    let mut loader = Loader::new(&s);
    loader.variables_mut().set_string("name", "from-table");
    let config = loader.load_str("_x: &name from-anchor\nnote: $name\n").unwrap();
    assert_eq!(config.get_str("note"), Some("from-table"));
}

#[test]
fn mapping_anchor_cannot_be_substituted() {
    let s = schema();
    let err = Loader::new(&s).load_str("_x: &m {a: 1}\nnote: $m\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[test]
fn unresolved_plain_name_substitutes_nothing() {
    let s = schema();
    let config = Loader::new(&s).load_str("note: a${missing}b $gone.\n").unwrap();
    assert_eq!(config.get_str("note"), Some("ab ."));
}

#[test]
fn unresolved_name_in_arithmetic_is_an_error() {
    let s = schema();
    let err = Loader::new(&s).load_str("workers: ${missing + 1}\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Syntax);
}

#[test]
fn raw_tag_and_escapes_suppress_substitution() {
    let s = schema();
    let mut loader = Loader::new(&s);
    loader.variables_mut().set_string("user", "root");
    let yaml = indoc! {r#"
        url: !Raw http://$user@host/
        note: 'costs \$5 for \\$user'
    "#};
    let config = loader.load_str(yaml).unwrap();
    assert_eq!(config.get_str("url"), Some("http://$user@host/"));
    assert_eq!(config.get_str("note"), Some(r"costs $5 for \root"));
}

#[test]
fn arithmetic_keeps_integers_and_mixes_floats() {
    let s = schema();
    let mut loader = Loader::new(&s);
    loader.variables_mut().set_integer("base", 7);
    let config = loader
        .load_str("workers: ${base / 2}\nratio: ${base / 2.0}\nlimit: ${(base - 2) * 1ki}\n")
        .unwrap();
    assert_eq!(config.get_int("workers"), Some(3));
    assert_eq!(config.get_float("ratio"), Some(3.5));
    assert_eq!(config.get_uint("limit"), Some(5120));
}

#[test]
fn substituted_numbers_are_still_bounds_checked() {
    let s = schema();
    let mut loader = Loader::new(&s);
    loader.variables_mut().set_integer("big", 20_000);
    let err = loader.load_str("limit: $big\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn division_by_zero_is_a_value_error() {
    let s = schema();
    let err = Loader::new(&s).load_str("workers: ${1 / 0}\n").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Value);
}

#[test]
fn expansion_can_be_disabled() {
    let s = schema();
    let options = coyaml::options! { expand_vars: false };
    let config = Loader::with_options(&s, options).load_str("note: $HOME and \\n\n").unwrap();
    assert_eq!(config.get_str("note"), Some("$HOME and \\n"));
}

#[test]
fn variables_persist_across_loads() {
    let s = schema();
    let mut loader = Loader::new(&s);
    assert!(loader.variables_mut().set_assignment("env=prod"));
    assert!(loader.variables_mut().set_assignment("n=12"));
    let first = loader.load_str("note: $env\n").unwrap();
    let second = loader.load_str("workers: ${n + 1}\n").unwrap();
    assert_eq!(first.get_str("note"), Some("prod"));
    assert_eq!(second.get_int("workers"), Some(13));
    assert_eq!(loader.variables().len(), 2);
}
