//! Property types and their index groups.
//!
//! Every schema property carries a [`PropType`] that decides how values are
//! indexed and matched. Types with a `group` are copied into a shared
//! keyword or text field in the index document (`countries`, `dates`, ...),
//! so that a query example can match values across differently named
//! properties.

use serde::{Deserialize, Serialize};

/// The value type of a schema property.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PropType {
    /// A name for the entity, analyzed into parts, phonetics, and symbols.
    Name,
    /// A reference to another entity by its identifier.
    Entity,
    /// A date or partial date (`2023`, `2023-01`, `2023-01-01`).
    Date,
    /// An ISO 3166-1 alpha-2 country code.
    Country,
    /// A registration, tax, or document number.
    Identifier,
    Phone,
    Email,
    /// A postal address, matched as free text.
    Address,
    /// A risk topic tag (`sanction`, `crime`, `role.pep`, ...).
    Topic,
    Gender,
    Iban,
    Url,
    /// A short plain-text value without a dedicated group.
    String,
    /// A longer free-text value.
    Text,
    Number,
}

impl PropType {
    /// The shared index field this type's values are copied to, if any.
    pub fn group(&self) -> Option<&'static str> {
        match self {
            PropType::Name => Some("names"),
            PropType::Entity => Some("entities"),
            PropType::Date => Some("dates"),
            PropType::Country => Some("countries"),
            PropType::Identifier => Some("identifiers"),
            PropType::Phone => Some("phones"),
            PropType::Email => Some("emails"),
            PropType::Address => Some("addresses"),
            PropType::Topic => Some("topics"),
            PropType::Gender => Some("genders"),
            PropType::Iban => Some("ibans"),
            PropType::Url => Some("urls"),
            PropType::String | PropType::Text | PropType::Number => None,
        }
    }

    /// Whether the group field is analyzed text rather than a keyword.
    ///
    /// Text groups are queried with `match`, keyword groups with `term`.
    pub fn is_text_group(&self) -> bool {
        matches!(self, PropType::Name | PropType::Address)
    }

    /// Derive a country code from a value of this type, when the value
    /// format embeds one. Used to enrich query examples so that a phone
    /// number or IBAN also matches on nationality.
    pub fn country_hint(&self, value: &str) -> Option<String> {
        match self {
            PropType::Iban => {
                let prefix = value.get(0..2)?;
                if prefix.chars().all(|c| c.is_ascii_alphabetic()) {
                    Some(prefix.to_lowercase())
                } else {
                    None
                }
            }
            PropType::Phone => phone_country(value),
            _ => None,
        }
    }
}

/// Map an international phone number prefix to a country code.
fn phone_country(value: &str) -> Option<String> {
    let digits = value.strip_prefix('+')?;
    // Longest prefixes first so that e.g. +380 is not read as +3.
    const PREFIXES: &[(&str, &str)] = &[
        ("380", "ua"),
        ("971", "ae"),
        ("1", "us"),
        ("7", "ru"),
        ("33", "fr"),
        ("34", "es"),
        ("39", "it"),
        ("44", "gb"),
        ("49", "de"),
        ("81", "jp"),
        ("86", "cn"),
        ("90", "tr"),
        ("91", "in"),
    ];
    let mut best: Option<(&str, &str)> = None;
    for (prefix, country) in PREFIXES {
        if digits.starts_with(prefix) {
            match best {
                Some((b, _)) if b.len() >= prefix.len() => {}
                _ => best = Some((prefix, country)),
            }
        }
    }
    best.map(|(_, country)| country.to_string())
}

/// A named property as declared by a schema.
#[derive(Debug, Clone, Copy)]
pub struct Property {
    pub name: &'static str,
    pub prop_type: PropType,
    /// Whether values of this property participate in matching. Values of
    /// non-matchable properties are still indexed into `text`.
    pub matchable: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_cover_typed_values() {
        assert_eq!(PropType::Country.group(), Some("countries"));
        assert_eq!(PropType::Name.group(), Some("names"));
        assert_eq!(PropType::String.group(), None);
        assert!(PropType::Address.is_text_group());
        assert!(!PropType::Country.is_text_group());
    }

    #[test]
    fn country_hints() {
        assert_eq!(PropType::Phone.country_hint("+79261234567"), Some("ru".into()));
        assert_eq!(PropType::Phone.country_hint("+380441234567"), Some("ua".into()));
        assert_eq!(PropType::Iban.country_hint("DE89370400440532013000"), Some("de".into()));
        assert_eq!(PropType::Name.country_hint("Acme"), None);
        assert_eq!(PropType::Phone.country_hint("12345"), None);
    }
}
