//! Surface type annotations (§3.1)

use serde::{Deserialize, Serialize};

/// A type annotation as it appears on a `Define` statement, a utility
/// parameter, or a utility's declared output type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypeAnn {
    WholeNumber,
    Float,
    /// Either integral or floating numeric type.
    Number,
    Text,
    Url,
    YesNo,
    Empty,
    OrderedList,
    UnorderedList,
    NamedList,
    Any,
}

impl std::fmt::Display for TypeAnn {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TypeAnn::WholeNumber => "Whole Number",
            TypeAnn::Float => "Float",
            TypeAnn::Number => "Number",
            TypeAnn::Text => "Text",
            TypeAnn::Url => "URL",
            TypeAnn::YesNo => "Yes/No",
            TypeAnn::Empty => "Empty",
            TypeAnn::OrderedList => "Ordered List",
            TypeAnn::UnorderedList => "Unordered List",
            TypeAnn::NamedList => "Named List",
            TypeAnn::Any => "Any",
        };
        write!(f, "{s}")
    }
}

impl TypeAnn {
    /// Best-effort compatibility check used by HIR's top-down type pass
    /// (§4.1). `Any` is compatible with everything in either direction; the
    /// VM remains dynamically checked regardless of this answer.
    pub fn compatible_with(self, other: TypeAnn) -> bool {
        if self == TypeAnn::Any || other == TypeAnn::Any {
            return true;
        }
        if self == other {
            return true;
        }
        matches!(
            (self, other),
            (TypeAnn::Number, TypeAnn::WholeNumber)
                | (TypeAnn::WholeNumber, TypeAnn::Number)
                | (TypeAnn::Number, TypeAnn::Float)
                | (TypeAnn::Float, TypeAnn::Number)
                | (TypeAnn::OrderedList, TypeAnn::UnorderedList)
                | (TypeAnn::UnorderedList, TypeAnn::OrderedList)
        )
    }
}
