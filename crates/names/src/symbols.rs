//! Symbols: semantic equivalence classes attached to name parts.
//!
//! A symbol stands for a class of interchangeable tokens. Detected legal
//! forms become `ORGCLS:<class>` (so `OOO`, `LLC`, and `GmbH` all match),
//! known synonym groups become `SYMBOL:<word>` (`BANK` matches `BANKA` and
//! `БАНК`), and dictionary hits on given names become `NAME:<id>` so that
//! transliteration variants agree. Initials are tagged but never indexed.

use std::collections::HashMap;
use std::fmt;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

/// The class a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SymbolCategory {
    /// A recognized organization legal form.
    OrgClass,
    /// A known cross-language synonym token.
    Symbol,
    /// A dictionary hit on a known given name.
    Name,
    /// A single-letter initial.
    Initial,
}

/// A tag attached to a name, identifying an equivalence class.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Symbol {
    pub category: SymbolCategory,
    pub id: String,
}

impl Symbol {
    pub fn new(category: SymbolCategory, id: impl Into<String>) -> Symbol {
        Symbol { category, id: id.into() }
    }

    /// Initial-class symbols are computed for scoring but excluded from the
    /// index, where single letters would match far too broadly.
    pub fn is_matchable(&self) -> bool {
        self.category != SymbolCategory::Initial
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.category {
            SymbolCategory::OrgClass => "ORGCLS",
            SymbolCategory::Symbol => "SYMBOL",
            SymbolCategory::Name => "NAME",
            SymbolCategory::Initial => "INITIAL",
        };
        write!(f, "{}:{}", prefix, self.id)
    }
}

/// Legal-form tokens mapped to their canonical class.
static ORG_CLASSES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (class, tokens) in [
        ("LLC", &["llc", "ooo", "ооо", "gmbh", "sarl", "srl", "sro", "llp", "ltda"][..]),
        ("JSC", &["jsc", "ao", "ао", "oao", "оао", "zao", "зао", "pjsc", "pao", "пао", "cjsc"][..]),
        ("LTD", &["ltd", "limited"][..]),
        ("INC", &["inc", "incorporated", "corp", "corporation"][..]),
        ("PLC", &["plc"][..]),
        ("SA", &["sa", "ag", "nv", "spa"][..]),
        ("FUND", &["fund", "foundation", "fond", "фонд"][..]),
    ] {
        for token in tokens {
            map.insert(*token, class);
        }
    }
    map
});

/// Cross-language synonym tokens mapped to their symbol word.
static SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (word, tokens) in [
        ("BANK", &["bank", "banka", "banque", "banco", "банк", "банка"][..]),
        ("GROUP", &["group", "groupe", "grupo", "gruppa", "группа"][..]),
        ("HOLDING", &["holding", "holdings", "холдинг"][..]),
        ("COMPANY", &["company", "co", "kompaniya", "компания", "cia", "societe"][..]),
        ("INTERNATIONAL", &["international", "intl", "mezhdunarodny"][..]),
        ("TRADE", &["trade", "trading", "torg"][..]),
        ("INDUSTRY", &["industry", "industries", "industrial", "prom"][..]),
        ("INVEST", &["invest", "investment", "investments", "инвест"][..]),
        ("CAPITAL", &["capital", "капитал"][..]),
        ("AIRLINE", &["airline", "airlines", "airways", "avia"][..]),
        ("SHIPPING", &["shipping", "marine", "maritime"][..]),
        ("OIL", &["oil", "petroleum", "neft", "нефть"][..]),
        ("STATE", &["state", "national", "gos"][..]),
    ] {
        for token in tokens {
            map.insert(*token, word);
        }
    }
    map
});

/// Given-name variants mapped to stable dictionary ids.
static GIVEN_NAMES: Lazy<HashMap<&'static str, u32>> = Lazy::new(|| {
    let mut map = HashMap::new();
    for (id, variants) in [
        (1001u32, &["vladimir", "wladimir", "uladzimir", "владимир", "володимир"][..]),
        (1002, &["sergei", "sergey", "serguei", "serhiy", "сергей"][..]),
        (1003, &["alexander", "aleksandr", "oleksandr", "alexandre", "александр"][..]),
        (1004, &["mohammed", "muhammad", "mohamed", "mohammad", "mehmet"][..]),
        (1005, &["natalia", "natalya", "nataliya", "наталья"][..]),
        (1006, &["dmitri", "dmitry", "dmitrii", "dmytro", "дмитрий"][..]),
        (1007, &["yevgeny", "evgeny", "evgeni", "yevgeniy", "евгений"][..]),
        (1008, &["viktor", "victor", "виктор"][..]),
        (1009, &["mikhail", "michail", "mykhailo", "михаил"][..]),
        (1010, &["ekaterina", "yekaterina", "kateryna", "екатерина"][..]),
        (1011, &["nikolai", "nikolay", "mykola", "николай"][..]),
        (1012, &["andrei", "andrey", "andriy", "андрей"][..]),
    ] {
        for variant in variants {
            map.insert(*variant, id);
        }
    }
    map
});

/// Look up the legal-form class of a lowercase token.
pub fn org_class(token: &str) -> Option<&'static str> {
    ORG_CLASSES.get(token).copied()
}

/// Look up the synonym class of a lowercase token.
pub fn synonym(token: &str) -> Option<&'static str> {
    SYNONYMS.get(token).copied()
}

/// Look up the dictionary id of a lowercase given-name token.
pub fn given_name(token: &str) -> Option<u32> {
    GIVEN_NAMES.get(token).copied()
}
