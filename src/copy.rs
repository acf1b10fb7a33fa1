//! Inheritance pass: unset fields of a usertype instance are filled from the instance it is
//! nested in, when both are the same usertype with the same discriminant.

use tracing::debug;

use crate::matcher::Matched;
use crate::schema::{Group, NodeKind, Schema};
use crate::value::{UserRef, UserValue, Value};

/// Run the copy pass over a successful match.
///
/// Records are visited in reverse finalization order, so an enclosing instance has inherited
/// from its own parent before its children copy from it.
pub(crate) fn copy_pass(schema: &Schema, matched: &mut Matched) {
    for &record in matched.finalized.iter().rev() {
        let Some(parent) = matched.marks[record].parent else {
            continue;
        };
        let (child_ref, parent_ref) = (matched.marks[record].instance, matched.marks[parent].instance);
        if matched.marks[record].usertype != matched.marks[parent].usertype
            || matched.arena[child_ref.0].tag != matched.arena[parent_ref.0].tag
        {
            continue;
        }
        let usertype = schema.usertype(matched.marks[record].usertype);
        debug!(
            usertype = usertype.name(),
            child = child_ref.0,
            parent = parent_ref.0,
            "inheriting unset fields"
        );
        let parent_filled = matched.marks[parent].filled.clone();
        let parent_fields = matched.arena[parent_ref.0].fields.clone();
        // A copy, not a take: inherited lists may contain the child itself.
        let mut child_fields = matched.arena[child_ref.0].fields.clone();
        let mut copier = Copier {
            arena: &mut matched.arena,
            parent_filled: &parent_filled,
            child_filled: &mut matched.marks[record].filled,
        };
        copier.copy_group(usertype.body(), &parent_fields, &mut child_fields);
        matched.arena[child_ref.0].fields = child_fields;
    }
}

struct Copier<'m> {
    arena: &'m mut Vec<UserValue>,
    parent_filled: &'m [bool],
    child_filled: &'m mut [bool],
}

impl Copier<'_> {
    /// Walk the transitions of `group`. Nested groups have no mark of their own and are
    /// always entered.
    fn copy_group(&mut self, group: &Group, parent: &[Value], child: &mut [Value]) {
        for (i, (_, node)) in group.fields().iter().enumerate() {
            match (&node.kind, &parent[i], &mut child[i]) {
                (NodeKind::Group(inner), Value::Group(pf), Value::Group(cf)) => self.copy_group(inner, pf, cf),
                (_, source, target) => {
                    let Some(slot) = node.meta.fill else {
                        continue;
                    };
                    if self.child_filled[slot] || !self.parent_filled[slot] {
                        continue;
                    }
                    self.copy_leaf(source, target);
                    self.child_filled[slot] = true;
                }
            }
        }
    }

    /// Scalars are replaced; arrays and mappings get the parent's entries appended after
    /// their own.
    fn copy_leaf(&mut self, source: &Value, target: &mut Value) {
        match (source, target) {
            (Value::Array(from), Value::Array(to)) => {
                to.extend(from.iter().map(|v| deep_clone(v, self.arena)));
            }
            (Value::Mapping(from), Value::Mapping(to)) => {
                to.extend(
                    from.iter()
                        .map(|(k, v)| (deep_clone(k, self.arena), deep_clone(v, self.arena))),
                );
            }
            (source, target) => *target = deep_clone(source, self.arena),
        }
    }
}

/// Clone a value, giving nested usertype instances their own arena entries.
pub(crate) fn deep_clone(value: &Value, arena: &mut Vec<UserValue>) -> Value {
    match value {
        Value::User(r) => {
            let original = arena[r.0].clone();
            let fields = original.fields.iter().map(|v| deep_clone(v, arena)).collect();
            let copy = UserRef(arena.len());
            arena.push(UserValue { fields, ..original });
            Value::User(copy)
        }
        Value::Group(fields) => Value::Group(fields.iter().map(|v| deep_clone(v, arena)).collect()),
        Value::Array(items) => Value::Array(items.iter().map(|v| deep_clone(v, arena)).collect()),
        Value::Mapping(pairs) => Value::Mapping(
            pairs
                .iter()
                .map(|(k, v)| (deep_clone(k, arena), deep_clone(v, arena)))
                .collect(),
        ),
        other => other.clone(),
    }
}
