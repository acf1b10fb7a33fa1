#![no_main]

use coyaml::{Group, Inheritance, Loader, Node, Schema, Usertype};
use libfuzzer_sys::fuzz_target;

fn schema() -> Schema {
    Schema::builder(
        Group::new()
            .field("a", Node::int())
            .field("key", Node::string())
            .field("ratio", Node::float().min(0.0).max(1.0))
            .field("outer", Group::new().field("inner", Group::new().field("x", Node::int())))
            .field("items", Node::array(Node::custom("item")))
            .field("env", Node::mapping(Node::string(), Node::uint()))
            .field("main", Node::custom("item")),
    )
    .usertype(
        Usertype::new(
            "item",
            Group::new()
                .field("k", Node::string())
                .field("n", Node::uint().max(100))
                .field("tags", Node::array(Node::string()).inheritance(Inheritance::Append)),
        )
        .with_tag("Plain", 0)
        .with_tag("Fancy", 1)
        .with_default_tag(0),
    )
    .build()
    .expect("fuzz schema is valid")
}

// Builds documents with duplicate keys, merges, aliases and substitutions around the
// fuzz input, and also feeds the raw input as a document. Loading must never panic.
fuzz_target!(|data: &[u8]| {
    if data.len() > 16 * 1024 {
        return;
    }
    let s = String::from_utf8_lossy(data);
    let schema = schema();
    let loader = Loader::new(&schema);

    let documents = [
        s.to_string(),
        format!("a: 1\na: 2\nkey: {s}\nkey: {s}\n"),
        format!("outer:\n  inner: {{x: 1, x: 2}}\nitems: [{{k: {s}}}, !Fancy {{k: {s}}}]\n"),
        format!("main: &m {{k: {s}, n: 3}}\nitems:\n  - <<: *m\n    tags: [{s}]\n"),
        format!("key: ${{{s}}}\nenv: {{'{s}': 1, '{s}': 2}}\n"),
    ];
    for text in &documents {
        if let Ok(config) = loader.load_str(text) {
            let _ = coyaml::emit(&config, &coyaml::EmitOptions::default());
        }
    }
});
