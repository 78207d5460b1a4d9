use crate::{EntityOrigin, Result, RowLabeled};

/// A typed element of an entity set.
///
/// Implementations only describe how to decode one labeled row into the
/// concrete type and which set the type belongs to; everything else about
/// the set (columns, execution) lives behind the context's catalog and
/// provider.
pub trait Entity: Send + Sized + 'static {
    /// Name of the entity set this type is read from.
    fn entity_name() -> &'static str;

    /// Decode a single labeled row.
    fn from_row(row: &RowLabeled) -> Result<Self>;

    /// Placeholder origin descriptor used to build a query before any real
    /// context exists. Entirely replaced by substitution before execution.
    fn origin() -> EntityOrigin {
        EntityOrigin::of::<Self>()
    }
}
