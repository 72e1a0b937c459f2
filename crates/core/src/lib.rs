//! Cumulus core types: attribute values, attribute maps, schemas, and the
//! projector seam that turns typed cloud records into attribute maps.

#![forbid(unsafe_code)]

pub mod schema;
pub mod value;

pub use schema::{AttrType, Attribute, Elem, Mode, Schema};
pub use value::{AttrMap, TypeMismatch, Value};

pub mod prelude {
    pub use super::{AttrMap, AttrType, Attribute, Elem, Identified, Mode, Projector, Schema, Value};
}

/// Projector flattens one typed record into an attribute map keyed by
/// element-schema attribute names.
///
/// Projection is infallible: absent optional fields project to the
/// attribute's zero value (see [`AttrType::zero`]), never to a missing key.
pub trait Projector<T>: Send + Sync {
    fn project(&self, item: &T) -> AttrMap;
}

impl<T, F> Projector<T> for F
where
    F: Fn(&T) -> AttrMap + Send + Sync,
{
    fn project(&self, item: &T) -> AttrMap { self(item) }
}

/// Records carrying a stable remote identifier.
pub trait Identified {
    fn id(&self) -> &str;
}

impl<T: Identified + ?Sized> Identified for &T {
    fn id(&self) -> &str { (**self).id() }
}
