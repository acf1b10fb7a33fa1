//! Serde view of a loaded [`Config`].
//!
//! Groups and usertype bodies are maps keyed by field name, arrays are sequences and
//! mappings are maps. Unset strings read as `None` (or unit). Enums are taken from:
//! - a usertype with a tag: the tag name is the variant, the body is its payload;
//! - a string: the string names a unit variant.

use serde::de::{self, DeserializeSeed, IntoDeserializer, Visitor};
use serde::forward_to_deserialize_any;

use crate::config::Config;
use crate::error::Error;
use crate::schema::{Group, Node, NodeKind};
use crate::value::{UserRef, Value};

/// Deserializer over the fields of one group.
pub(crate) struct GroupDeserializer<'c, 's> {
    config: &'c Config<'s>,
    group: &'s Group,
    fields: &'c [Value],
}

impl<'c, 's> GroupDeserializer<'c, 's> {
    pub(crate) fn new(config: &'c Config<'s>, group: &'s Group, fields: &'c [Value]) -> Self {
        Self { config, group, fields }
    }

    fn of_user(config: &'c Config<'s>, r: UserRef) -> Self {
        let instance = config.user(r);
        let body = config.schema().usertype(instance.usertype()).body();
        Self::new(config, body, instance.fields())
    }
}

impl<'de> de::Deserializer<'de> for GroupDeserializer<'_, '_> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_map(GroupAccess {
            config: self.config,
            entries: self.group.fields().iter().zip(self.fields),
            pending: None,
        })
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_some(self)
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct enum
        identifier ignored_any
    }
}

struct GroupAccess<'c, 's, I> {
    config: &'c Config<'s>,
    entries: I,
    pending: Option<(&'s Node, &'c Value)>,
}

impl<'de, 'c, 's, I> de::MapAccess<'de> for GroupAccess<'c, 's, I>
where
    I: Iterator<Item = (&'s (String, Node), &'c Value)>,
{
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        let Some(((name, node), value)) = self.entries.next() else {
            return Ok(None);
        };
        self.pending = Some((node, value));
        seed.deserialize(name.as_str().into_deserializer()).map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let (node, value) = self
            .pending
            .take()
            .ok_or_else(|| Error::assertion("group value requested before its key"))?;
        seed.deserialize(ValueDeserializer {
            config: self.config,
            node,
            value,
        })
    }
}

/// Deserializer for one field value.
struct ValueDeserializer<'c, 's> {
    config: &'c Config<'s>,
    node: &'s Node,
    value: &'c Value,
}

impl<'de> de::Deserializer<'de> for ValueDeserializer<'_, '_> {
    type Error = Error;

    fn deserialize_any<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match (self.value, &self.node.kind) {
            (Value::Null, _) => visitor.visit_unit(),
            (Value::Int(v), _) => visitor.visit_i64(*v),
            (Value::UInt(v), _) => visitor.visit_u64(*v),
            (Value::Float(v), _) => visitor.visit_f64(*v),
            (Value::Bool(v), _) => visitor.visit_bool(*v),
            (Value::Str(s), _) => visitor.visit_str(s),
            (Value::Bytes(b), _) => visitor.visit_bytes(b),
            (Value::Group(fields), NodeKind::Group(group)) => {
                GroupDeserializer::new(self.config, group, fields).deserialize_any(visitor)
            }
            (Value::User(r), _) => GroupDeserializer::of_user(self.config, *r).deserialize_any(visitor),
            (Value::Array(items), NodeKind::Array { element, .. }) => visitor.visit_seq(SeqAccess {
                config: self.config,
                element,
                items: items.iter(),
            }),
            (Value::Mapping(pairs), NodeKind::Mapping { key, value, .. }) => visitor.visit_map(MappingAccess {
                config: self.config,
                key,
                value,
                pairs: pairs.iter(),
                pending: None,
            }),
            (value, kind) => Err(Error::assertion(format!(
                "{} field holds an unexpected value `{value}`",
                kind.name()
            ))),
        }
    }

    fn deserialize_option<V: Visitor<'de>>(self, visitor: V) -> Result<V::Value, Error> {
        match self.value {
            Value::Null => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V: Visitor<'de>>(self, _name: &'static str, visitor: V) -> Result<V::Value, Error> {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_enum<V: Visitor<'de>>(
        self,
        name: &'static str,
        _variants: &'static [&'static str],
        visitor: V,
    ) -> Result<V::Value, Error> {
        match self.value {
            Value::Str(s) => visitor.visit_enum(s.as_str().into_deserializer()),
            Value::User(r) => {
                let instance = self.config.user(*r);
                let usertype = self.config.schema().usertype(instance.usertype());
                let variant = instance
                    .tag()
                    .and_then(|t| usertype.tag_name(t))
                    .ok_or_else(|| Error::value(format!("`{}` has no tag to select a variant of {name}", usertype.name())))?;
                visitor.visit_enum(TaggedUser {
                    variant,
                    body: GroupDeserializer::of_user(self.config, *r),
                })
            }
            other => Err(Error::value(format!("cannot read `{other}` as enum {name}"))),
        }
    }

    forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf unit unit_struct seq tuple tuple_struct map struct
        identifier ignored_any
    }
}

struct SeqAccess<'c, 's, I> {
    config: &'c Config<'s>,
    element: &'s Node,
    items: I,
}

impl<'de, 'c, 's, I> de::SeqAccess<'de> for SeqAccess<'c, 's, I>
where
    I: ExactSizeIterator<Item = &'c Value>,
{
    type Error = Error;

    fn next_element_seed<T: DeserializeSeed<'de>>(&mut self, seed: T) -> Result<Option<T::Value>, Error> {
        match self.items.next() {
            Some(value) => seed
                .deserialize(ValueDeserializer {
                    config: self.config,
                    node: self.element,
                    value,
                })
                .map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.items.len())
    }
}

struct MappingAccess<'c, 's, I> {
    config: &'c Config<'s>,
    key: &'s Node,
    value: &'s Node,
    pairs: I,
    pending: Option<&'c Value>,
}

impl<'de, 'c, 's, I> de::MapAccess<'de> for MappingAccess<'c, 's, I>
where
    I: ExactSizeIterator<Item = &'c (Value, Value)>,
{
    type Error = Error;

    fn next_key_seed<K: DeserializeSeed<'de>>(&mut self, seed: K) -> Result<Option<K::Value>, Error> {
        let Some((k, v)) = self.pairs.next() else {
            return Ok(None);
        };
        self.pending = Some(v);
        seed.deserialize(ValueDeserializer {
            config: self.config,
            node: self.key,
            value: k,
        })
        .map(Some)
    }

    fn next_value_seed<V: DeserializeSeed<'de>>(&mut self, seed: V) -> Result<V::Value, Error> {
        let value = self
            .pending
            .take()
            .ok_or_else(|| Error::assertion("mapping value requested before its key"))?;
        seed.deserialize(ValueDeserializer {
            config: self.config,
            node: self.value,
            value,
        })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.pairs.len())
    }
}

/// Enum access for a tagged usertype instance.
struct TaggedUser<'c, 's> {
    variant: &'s str,
    body: GroupDeserializer<'c, 's>,
}

impl<'de, 'c, 's> de::EnumAccess<'de> for TaggedUser<'c, 's> {
    type Error = Error;
    type Variant = GroupDeserializer<'c, 's>;

    fn variant_seed<V: DeserializeSeed<'de>>(self, seed: V) -> Result<(V::Value, Self::Variant), Error> {
        let variant = seed.deserialize(self.variant.into_deserializer())?;
        Ok((variant, self.body))
    }
}

impl<'de> de::VariantAccess<'de> for GroupDeserializer<'_, '_> {
    type Error = Error;

    /// The body is ignored for a unit variant.
    fn unit_variant(self) -> Result<(), Error> {
        Ok(())
    }

    fn newtype_variant_seed<T: DeserializeSeed<'de>>(self, seed: T) -> Result<T::Value, Error> {
        seed.deserialize(self)
    }

    fn tuple_variant<V: Visitor<'de>>(self, _len: usize, _visitor: V) -> Result<V::Value, Error> {
        Err(Error::value("a usertype body cannot be read as a tuple variant"))
    }

    fn struct_variant<V: Visitor<'de>>(self, _fields: &'static [&'static str], visitor: V) -> Result<V::Value, Error> {
        de::Deserializer::deserialize_any(self, visitor)
    }
}
