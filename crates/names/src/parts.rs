//! Name analysis: normalized forms, tagged parts, and symbols.

use model::NameKind;
use serde::{Deserialize, Serialize};

use crate::normalize::{comparison_form, tokenize};
use crate::phonetic::phonetic_code;
use crate::symbols::{self, Symbol, SymbolCategory};

/// Honorific prefixes stripped from person names before comparison.
const HONORIFICS: &[&str] = &[
    "mr", "mrs", "ms", "miss", "dr", "prof", "sir", "dame", "lord", "lady", "gen",
    "general", "col", "colonel", "maj", "major", "capt", "captain", "lt", "sheikh",
    "haji", "hajji", "mullah",
];

/// The role of a token inside a name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PartTag {
    /// A token of a human name.
    Person,
    /// A recognized organization legal form.
    Legal,
    /// A single-letter initial.
    Initial,
    /// Any other token.
    Plain,
}

/// A single token of an analyzed name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NamePart {
    pub text: String,
    pub tag: PartTag,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phonetic: Option<String>,
}

/// An analyzed name: the raw value, its comparison form, tagged parts, and
/// the symbols detected in it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Name {
    pub original: String,
    /// Lowercased, NFC-composed, space-squashed form with honorifics
    /// stripped (person) or legal forms canonicalized (organization).
    pub form: String,
    pub parts: Vec<NamePart>,
    pub symbols: Vec<Symbol>,
}

impl Name {
    /// Symbols that should be written to the index.
    pub fn matchable_symbols(&self) -> impl Iterator<Item = &Symbol> {
        self.symbols.iter().filter(|s| s.is_matchable())
    }

    /// Phonetic codes of the parts, in order, without duplicates.
    pub fn phonetics(&self) -> Vec<&str> {
        let mut out = Vec::new();
        for part in &self.parts {
            if let Some(code) = &part.phonetic {
                if !out.contains(&code.as_str()) {
                    out.push(code.as_str());
                }
            }
        }
        out
    }
}

/// Analyze one raw name value according to the schema's name kind.
pub fn analyze_name(raw: &str, kind: NameKind) -> Name {
    let mut normalized = comparison_form(raw);
    if kind == NameKind::Person {
        normalized = strip_honorifics(&normalized);
    }
    let tokens = tokenize(&normalized);

    let mut parts = Vec::with_capacity(tokens.len());
    let mut symbols = Vec::new();
    let mut form_tokens = Vec::with_capacity(tokens.len());

    for token in tokens {
        let org_class = if kind == NameKind::Org { symbols::org_class(&token) } else { None };
        let tag = if org_class.is_some() {
            PartTag::Legal
        } else if token.chars().count() == 1 {
            PartTag::Initial
        } else if kind == NameKind::Person {
            PartTag::Person
        } else {
            PartTag::Plain
        };

        match tag {
            PartTag::Legal => {
                let class = org_class.expect("legal tag implies a class");
                push_symbol(&mut symbols, Symbol::new(SymbolCategory::OrgClass, class));
                // The comparison form carries the canonical class so that
                // "ooo" and "gmbh" normalize to the same string.
                form_tokens.push(class.to_lowercase());
            }
            PartTag::Initial => {
                push_symbol(
                    &mut symbols,
                    Symbol::new(SymbolCategory::Initial, token.to_uppercase()),
                );
                form_tokens.push(token.clone());
            }
            PartTag::Person | PartTag::Plain => {
                if kind == NameKind::Person {
                    if let Some(id) = symbols::given_name(&token) {
                        push_symbol(&mut symbols, Symbol::new(SymbolCategory::Name, id.to_string()));
                    }
                }
                if kind == NameKind::Org {
                    if let Some(word) = symbols::synonym(&token) {
                        push_symbol(&mut symbols, Symbol::new(SymbolCategory::Symbol, word));
                    }
                }
                form_tokens.push(token.clone());
            }
        }

        let phonetic = phonetic_code(&token);
        parts.push(NamePart { text: token, tag, phonetic });
    }

    Name {
        original: raw.to_string(),
        form: form_tokens.join(" "),
        parts,
        symbols,
    }
}

/// Analyze every name of an entity-like value set.
pub fn analyze_names<'a>(values: impl IntoIterator<Item = &'a str>, kind: NameKind) -> Vec<Name> {
    values.into_iter().map(|value| analyze_name(value, kind)).collect()
}

fn strip_honorifics(normalized: &str) -> String {
    let mut tokens: Vec<&str> = normalized.split(' ').collect();
    while tokens.len() > 1 {
        let first = tokens[0].trim_end_matches('.');
        if HONORIFICS.contains(&first) {
            tokens.remove(0);
        } else {
            break;
        }
    }
    tokens.join(" ")
}

fn push_symbol(symbols: &mut Vec<Symbol>, symbol: Symbol) {
    if !symbols.contains(&symbol) {
        symbols.push(symbol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn person_name_analysis() {
        let name = analyze_name("Mr. Vladimir PUTIN", NameKind::Person);
        assert_eq!(name.form, "vladimir putin");
        assert_eq!(name.parts.len(), 2);
        assert_eq!(name.parts[0].text, "vladimir");
        assert_eq!(name.parts[1].phonetic.as_deref(), Some("PTN"));
        assert!(name
            .symbols
            .iter()
            .any(|s| s.category == SymbolCategory::Name && s.id == "1001"));
    }

    #[test]
    fn org_name_analysis() {
        let name = analyze_name("Gazprom Bank OOO", NameKind::Org);
        assert_eq!(name.form, "gazprom bank llc");
        let rendered: Vec<String> = name.symbols.iter().map(|s| s.to_string()).collect();
        assert!(rendered.contains(&"ORGCLS:LLC".to_string()));
        assert!(rendered.contains(&"SYMBOL:BANK".to_string()));
    }

    #[test]
    fn initials_tagged_but_not_matchable() {
        let name = analyze_name("J R Ewing", NameKind::Person);
        assert_eq!(name.parts[0].tag, PartTag::Initial);
        assert_eq!(name.parts[0].phonetic, None);
        let matchable: Vec<String> = name.matchable_symbols().map(|s| s.to_string()).collect();
        assert!(!matchable.iter().any(|s| s.starts_with("INITIAL:")));
        assert!(name.symbols.iter().any(|s| s.category == SymbolCategory::Initial));
    }

    #[test]
    fn honorific_only_name_is_kept() {
        let name = analyze_name("Dr", NameKind::Person);
        assert_eq!(name.form, "dr");
    }

    #[test]
    fn legal_forms_normalize_across_languages() {
        let ooo = analyze_name("Vympel OOO", NameKind::Org);
        let gmbh = analyze_name("Vympel GmbH", NameKind::Org);
        assert_eq!(ooo.form, gmbh.form);
    }
}
