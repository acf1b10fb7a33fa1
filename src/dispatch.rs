//! Tag to discriminant resolution for usertypes.

use crate::error::Error;
use crate::schema::Usertype;
use crate::tags::is_core_tag;

/// Resolve the tag written on a usertype node to its discriminant.
///
/// Arguments:
/// - `usertype`: the usertype the node is matched against.
/// - `tag`: the tag as written (`!Name`), or `None`.
///
/// Returns:
/// - `Ok(None)` for an untagged node of a usertype that declares no tags.
/// - `Ok(Some(v))` for a declared tag, or for an untagged node when a default tag exists.
/// - A syntax error for an unknown tag, or an untagged node that needs one.
///
/// Called by:
/// - The matcher for the scalar, sequence and mapping forms of a usertype.
pub(crate) fn resolve_tag(usertype: &Usertype, tag: Option<&str>) -> Result<Option<i64>, Error> {
    let tag = tag.filter(|t| !is_core_tag(Some(t)));
    match tag {
        None if usertype.tags().is_empty() => Ok(None),
        None => usertype.default_tag().map(Some).ok_or_else(|| {
            Error::syntax(format!(
                "`{}` needs a tag, one of: {}",
                usertype.name(),
                tag_list(usertype)
            ))
        }),
        Some(written) => {
            let name = written.strip_prefix('!').unwrap_or(written);
            usertype
                .tags()
                .iter()
                .find(|(n, _)| n == name)
                .map(|(_, v)| Some(*v))
                .ok_or_else(|| {
                    if usertype.tags().is_empty() {
                        Error::syntax(format!("`{}` does not accept tag `{written}`", usertype.name()))
                    } else {
                        Error::syntax(format!(
                            "unknown tag `{written}` for `{}`, expected one of: {}",
                            usertype.name(),
                            tag_list(usertype)
                        ))
                    }
                })
        }
    }
}

fn tag_list(usertype: &Usertype) -> String {
    usertype
        .tags()
        .iter()
        .map(|(n, _)| format!("!{n}"))
        .collect::<Vec<_>>()
        .join(", ")
}
