use std::borrow::Cow;

use saphyr_parser::Tag;

/// Splice the named file in place of the scalar.
pub(crate) const TAG_INCLUDE: &str = "!Include";
/// Use the whole content of the named file as the string value.
pub(crate) const TAG_FROM_FILE: &str = "!FromFile";
/// Take the scalar text verbatim, without variable substitution.
pub(crate) const TAG_RAW: &str = "!Raw";
/// On an array or mapping: keep inheriting the parent's entries.
pub(crate) const TAG_APPEND: &str = "!Append";
/// On an array or mapping: drop the parent's entries.
pub(crate) const TAG_REPLACE: &str = "!Replace";

pub(crate) const TAG_BINARY: &str = "!!binary";
pub(crate) const TAG_STR: &str = "!!str";
pub(crate) const TAG_MAP: &str = "!!map";
pub(crate) const TAG_SEQ: &str = "!!seq";

const YAML_CORE_PREFIX: &str = "tag:yaml.org,2002:";

/// Render a parser tag in its short written form (`!Include`, `!!binary`).
///
/// Called by:
/// - The include layer for every tagged event.
pub(crate) fn normalize_tag(tag: &Tag) -> String {
    match tag.handle.as_str() {
        "!" => format!("!{}", tag.suffix),
        YAML_CORE_PREFIX | "!!" => format!("!!{}", tag.suffix),
        "" => {
            // Verbatim tags (`!<tag:yaml.org,2002:str>`) arrive with the whole URI as suffix.
            match tag.suffix.strip_prefix(YAML_CORE_PREFIX) {
                Some(rest) => format!("!!{rest}"),
                None => tag.suffix.clone(),
            }
        }
        handle => format!("{handle}{}", tag.suffix),
    }
}

/// Convert an optional parser tag into its short form.
pub(crate) fn tag_to_string(tag: Option<Cow<'_, Tag>>) -> Option<String> {
    tag.map(|t| normalize_tag(&t))
}

/// Tags that only describe the YAML node type and carry no meaning for the schema.
pub(crate) fn is_core_tag(tag: Option<&str>) -> bool {
    matches!(tag, Some(TAG_STR | TAG_MAP | TAG_SEQ))
}
