//! Name analysis for entity matching.
//!
//! From an entity's raw names this crate produces the signals the index and
//! the scorer work with: comparison-normalized forms, tokenized parts with
//! tags and phonetic codes, and symbols marking semantic equivalence
//! classes (legal forms, cross-language synonyms, known given names).

mod dates;
mod normalize;
mod parts;
mod phonetic;
mod pick;
pub mod symbols;

pub use dates::expand_dates;
pub use normalize::{comparison_form, safe_string, squash_spaces, tokenize};
pub use parts::{analyze_name, analyze_names, Name, NamePart, PartTag};
pub use phonetic::phonetic_code;
pub use pick::pick_names;
pub use symbols::{Symbol, SymbolCategory};
