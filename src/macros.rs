// Shared macros for PDU builder types.

/// Generate simple field-setter methods for a builder struct.
///
/// ```ignore
/// builder_setters! {
///     sequence_number: u32,
///     addr_ton: TypeOfNumber
/// }
/// ```
/// expands to one `pub fn <field>(mut self, value: <Type>) -> Self` per entry,
/// which just assigns the field and returns `self` for chaining. Fields that
/// need conversion (e.g. `&str` into a fixed-width type) are written by hand
/// instead of listed here.
macro_rules! builder_setters {
    ($($field:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $field(mut self, $field: $ty) -> Self {
                self.$field = $field;
                self
            }
        )*
    };
}

pub(crate) use builder_setters;
