pub mod field;
pub mod form;

pub use field::{ChoiceRules, Derivation, FieldId, FieldKind, FieldSchema, TextRules};
pub use form::FormSchema;
