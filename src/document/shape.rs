//! Projection shapes: the set of field paths a narrower record type keeps.
//!
//! A shape is usually derived from a serde `Deserialize` impl. Derived impls hand their
//! field list to `Deserializer::deserialize_struct`, so a probe deserializer that records
//! that list and then bails out gives us the declared fields without running any decoding.

use crate::errors::DbError;
use crate::query::path::FieldPath;
use serde::de::{self, DeserializeOwned, Deserializer, Visitor};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shape {
    fields: Vec<FieldPath>,
}

impl Shape {
    /// Builds a shape from explicit field paths.
    ///
    /// # Errors
    /// `InvalidFieldPath` for the first path that does not parse.
    pub fn new<I, S>(fields: I) -> Result<Self, DbError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let fields = fields.into_iter().map(|f| FieldPath::parse(f.as_ref())).collect::<Result<Vec<_>, DbError>>()?;
        Ok(Self { fields })
    }

    pub(crate) const fn from_paths(fields: Vec<FieldPath>) -> Self {
        Self { fields }
    }

    /// Derives the shape of a struct-like type from its serde field list.
    ///
    /// Returns `None` for types that do not deserialize through `deserialize_struct`
    /// (maps, flattened structs, scalars); callers then keep the whole record.
    #[must_use]
    pub fn of<S: DeserializeOwned>() -> Option<Self> {
        let mut captured: Option<&'static [&'static str]> = None;
        let _ = S::deserialize(FieldListProbe { captured: &mut captured });
        // serde renames may produce names that are not paths; those fields cannot be projected
        captured.map(|names| Self { fields: names.iter().filter_map(|n| FieldPath::parse(n).ok()).collect() })
    }

    #[must_use]
    pub fn fields(&self) -> &[FieldPath] {
        &self.fields
    }

    /// True when the top-level segment `name` is one of the shape's fields.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f.head() == name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

struct FieldListProbe<'a> {
    captured: &'a mut Option<&'static [&'static str]>,
}

impl<'de> Deserializer<'de> for FieldListProbe<'_> {
    type Error = de::value::Error;

    fn deserialize_any<V: Visitor<'de>>(self, _visitor: V) -> Result<V::Value, Self::Error> {
        Err(de::Error::custom("shape probe only understands structs"))
    }

    fn deserialize_struct<V: Visitor<'de>>(
        self,
        _name: &'static str,
        fields: &'static [&'static str],
        _visitor: V,
    ) -> Result<V::Value, Self::Error> {
        *self.captured = Some(fields);
        Err(de::Error::custom("shape captured"))
    }

    serde::forward_to_deserialize_any! {
        bool i8 i16 i32 i64 i128 u8 u16 u32 u64 u128 f32 f64 char str string
        bytes byte_buf option unit unit_struct newtype_struct seq tuple
        tuple_struct map enum identifier ignored_any
    }
}
