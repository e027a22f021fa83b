//! The schema taxonomy and its is-a lattice.
//!
//! Schemata form a partial order via `extends` (`Person` is a `LegalEntity`
//! is a `Thing`). Search filters widen a requested schema into the set of
//! concrete schemata that can satisfy a match, and the nested-fetch resolver
//! uses the `edge` flag to expand through relationship entities such as
//! `Sanction` or `Ownership`.

use std::collections::{BTreeMap, HashMap};

use once_cell::sync::Lazy;

use crate::property::{PropType, Property};

/// How names of entities with this schema should be analyzed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameKind {
    /// Human names: honorific prefixes are stripped before comparison.
    Person,
    /// Organization names: legal-form tokens are replaced by placeholders.
    Org,
    /// Everything else: plain comparison normalization.
    Other,
}

struct SchemaDef {
    name: &'static str,
    extends: &'static [&'static str],
    matchable: bool,
    edge: bool,
    name_kind: NameKind,
    properties: &'static [(&'static str, PropType, bool)],
}

/// Properties shared by every entity.
const THING: &[(&str, PropType, bool)] = &[
    ("name", PropType::Name, true),
    ("alias", PropType::Name, true),
    ("weakAlias", PropType::Name, false),
    ("summary", PropType::Text, false),
    ("description", PropType::Text, false),
    ("country", PropType::Country, true),
    ("address", PropType::Address, true),
    ("addressEntity", PropType::Entity, false),
    ("topics", PropType::Topic, true),
    ("notes", PropType::Text, false),
    ("sourceUrl", PropType::Url, false),
    ("createdAt", PropType::Date, false),
    ("modifiedAt", PropType::Date, false),
];

const LEGAL_ENTITY: &[(&str, PropType, bool)] = &[
    ("email", PropType::Email, true),
    ("phone", PropType::Phone, true),
    ("website", PropType::Url, false),
    ("legalForm", PropType::String, false),
    ("incorporationDate", PropType::Date, true),
    ("dissolutionDate", PropType::Date, true),
    ("status", PropType::String, false),
    ("sector", PropType::String, false),
    ("registrationNumber", PropType::Identifier, true),
    ("idNumber", PropType::Identifier, true),
    ("taxNumber", PropType::Identifier, true),
    ("jurisdiction", PropType::Country, true),
    ("mainCountry", PropType::Country, true),
];

const PERSON: &[(&str, PropType, bool)] = &[
    ("title", PropType::String, false),
    ("firstName", PropType::String, false),
    ("secondName", PropType::String, false),
    ("middleName", PropType::String, false),
    ("lastName", PropType::String, false),
    ("fatherName", PropType::String, false),
    ("birthDate", PropType::Date, true),
    ("birthPlace", PropType::String, false),
    ("deathDate", PropType::Date, true),
    ("nationality", PropType::Country, true),
    ("citizenship", PropType::Country, true),
    ("passportNumber", PropType::Identifier, true),
    ("gender", PropType::Gender, true),
    ("position", PropType::String, false),
    ("religion", PropType::String, false),
    ("education", PropType::String, false),
];

const COMPANY: &[(&str, PropType, bool)] = &[
    ("innCode", PropType::Identifier, true),
    ("ogrnCode", PropType::Identifier, true),
    ("kppCode", PropType::Identifier, true),
    ("leiCode", PropType::Identifier, true),
    ("swiftBic", PropType::Identifier, true),
    ("capital", PropType::Number, false),
    ("voenCode", PropType::Identifier, true),
];

const VEHICLE: &[(&str, PropType, bool)] = &[
    ("registrationNumber", PropType::Identifier, true),
    ("type", PropType::String, false),
    ("model", PropType::String, false),
    ("owner", PropType::Entity, false),
    ("operator", PropType::Entity, false),
    ("buildDate", PropType::Date, false),
];

const VESSEL: &[(&str, PropType, bool)] = &[
    ("imoNumber", PropType::Identifier, true),
    ("mmsi", PropType::Identifier, true),
    ("callSign", PropType::Identifier, true),
    ("flag", PropType::Country, true),
    ("tonnage", PropType::Number, false),
];

const AIRPLANE: &[(&str, PropType, bool)] = &[("serialNumber", PropType::Identifier, true)];

const ADDRESS: &[(&str, PropType, bool)] = &[
    ("full", PropType::Address, true),
    ("street", PropType::String, false),
    ("city", PropType::String, false),
    ("postalCode", PropType::Identifier, false),
    ("region", PropType::String, false),
];

const POSITION: &[(&str, PropType, bool)] = &[
    ("inceptionDate", PropType::Date, false),
    ("dissolutionDate", PropType::Date, false),
];

const IDENTIFICATION: &[(&str, PropType, bool)] = &[
    ("holder", PropType::Entity, false),
    ("number", PropType::Identifier, true),
    ("type", PropType::String, false),
    ("authority", PropType::String, false),
    ("startDate", PropType::Date, false),
    ("endDate", PropType::Date, false),
];

const SANCTION: &[(&str, PropType, bool)] = &[
    ("entity", PropType::Entity, false),
    ("authority", PropType::String, false),
    ("program", PropType::String, false),
    ("reason", PropType::Text, false),
    ("listingDate", PropType::Date, false),
    ("startDate", PropType::Date, false),
    ("endDate", PropType::Date, false),
];

const PAYMENT: &[(&str, PropType, bool)] = &[
    ("payer", PropType::Entity, false),
    ("beneficiary", PropType::Entity, false),
    ("amount", PropType::Number, false),
    ("currency", PropType::String, false),
    ("date", PropType::Date, false),
    ("purpose", PropType::Text, false),
];

const OWNERSHIP: &[(&str, PropType, bool)] = &[
    ("owner", PropType::Entity, false),
    ("asset", PropType::Entity, false),
    ("percentage", PropType::Number, false),
    ("startDate", PropType::Date, false),
    ("endDate", PropType::Date, false),
];

const DIRECTORSHIP: &[(&str, PropType, bool)] = &[
    ("director", PropType::Entity, false),
    ("organization", PropType::Entity, false),
    ("role", PropType::String, false),
    ("startDate", PropType::Date, false),
    ("endDate", PropType::Date, false),
];

const EMPLOYMENT: &[(&str, PropType, bool)] = &[
    ("employer", PropType::Entity, false),
    ("employee", PropType::Entity, false),
    ("role", PropType::String, false),
];

const MEMBERSHIP: &[(&str, PropType, bool)] = &[
    ("member", PropType::Entity, false),
    ("organization", PropType::Entity, false),
    ("role", PropType::String, false),
];

const FAMILY: &[(&str, PropType, bool)] = &[
    ("person", PropType::Entity, false),
    ("relative", PropType::Entity, false),
    ("relationship", PropType::String, false),
];

const ASSOCIATE: &[(&str, PropType, bool)] = &[
    ("person", PropType::Entity, false),
    ("associate", PropType::Entity, false),
    ("relationship", PropType::String, false),
];

const OCCUPANCY: &[(&str, PropType, bool)] = &[
    ("holder", PropType::Entity, false),
    ("post", PropType::Entity, false),
    ("status", PropType::String, false),
    ("startDate", PropType::Date, false),
    ("endDate", PropType::Date, false),
];

const UNKNOWN_LINK: &[(&str, PropType, bool)] = &[
    ("subject", PropType::Entity, false),
    ("object", PropType::Entity, false),
    ("role", PropType::String, false),
];

const DEFS: &[SchemaDef] = &[
    SchemaDef { name: "Thing", extends: &[], matchable: false, edge: false, name_kind: NameKind::Other, properties: THING },
    SchemaDef { name: "LegalEntity", extends: &["Thing"], matchable: true, edge: false, name_kind: NameKind::Org, properties: LEGAL_ENTITY },
    SchemaDef { name: "Person", extends: &["LegalEntity"], matchable: true, edge: false, name_kind: NameKind::Person, properties: PERSON },
    SchemaDef { name: "Organization", extends: &["LegalEntity"], matchable: true, edge: false, name_kind: NameKind::Org, properties: &[] },
    SchemaDef { name: "Company", extends: &["Organization"], matchable: true, edge: false, name_kind: NameKind::Org, properties: COMPANY },
    SchemaDef { name: "PublicBody", extends: &["Organization"], matchable: true, edge: false, name_kind: NameKind::Org, properties: &[] },
    SchemaDef { name: "Vehicle", extends: &["Thing"], matchable: false, edge: false, name_kind: NameKind::Other, properties: VEHICLE },
    SchemaDef { name: "Vessel", extends: &["Vehicle"], matchable: true, edge: false, name_kind: NameKind::Other, properties: VESSEL },
    SchemaDef { name: "Airplane", extends: &["Vehicle"], matchable: true, edge: false, name_kind: NameKind::Other, properties: AIRPLANE },
    SchemaDef { name: "Address", extends: &["Thing"], matchable: false, edge: false, name_kind: NameKind::Other, properties: ADDRESS },
    SchemaDef { name: "Position", extends: &["Thing"], matchable: false, edge: false, name_kind: NameKind::Other, properties: POSITION },
    SchemaDef { name: "Identification", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: IDENTIFICATION },
    SchemaDef { name: "Passport", extends: &["Identification"], matchable: false, edge: true, name_kind: NameKind::Other, properties: &[] },
    SchemaDef { name: "Sanction", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: SANCTION },
    SchemaDef { name: "Payment", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: PAYMENT },
    SchemaDef { name: "Ownership", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: OWNERSHIP },
    SchemaDef { name: "Directorship", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: DIRECTORSHIP },
    SchemaDef { name: "Employment", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: EMPLOYMENT },
    SchemaDef { name: "Membership", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: MEMBERSHIP },
    SchemaDef { name: "Family", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: FAMILY },
    SchemaDef { name: "Associate", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: ASSOCIATE },
    SchemaDef { name: "Occupancy", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: OCCUPANCY },
    SchemaDef { name: "UnknownLink", extends: &["Thing"], matchable: false, edge: true, name_kind: NameKind::Other, properties: UNKNOWN_LINK },
];

/// A resolved schema with inherited properties and lattice links.
#[derive(Debug)]
pub struct Schema {
    pub name: &'static str,
    pub matchable: bool,
    /// Relationship schemata connect two entities; the nested resolver
    /// expands one hop past them so that e.g. a sanction's program is
    /// visible from the sanctioned entity.
    pub edge: bool,
    pub name_kind: NameKind,
    extends: &'static [&'static str],
    /// Transitive ancestors, nearest first.
    pub ancestors: Vec<&'static str>,
    /// All schemata that extend this one, transitively.
    pub descendants: Vec<&'static str>,
    properties: BTreeMap<&'static str, Property>,
}

impl Schema {
    /// Whether this schema equals or descends from `other`.
    pub fn is_a(&self, other: &str) -> bool {
        self.name == other || self.ancestors.contains(&other)
    }

    /// Look up a declared or inherited property by name.
    pub fn property(&self, name: &str) -> Option<&Property> {
        self.properties.get(name)
    }

    /// Declared and inherited properties, ordered by name.
    pub fn properties(&self) -> impl Iterator<Item = &Property> {
        self.properties.values()
    }

    /// The set of schema names a query for this schema should filter on:
    /// the matchable ancestor chain plus every descendant.
    ///
    /// A non-matchable schema other than `Thing` yields an empty set, which
    /// callers treat as an unsatisfiable filter.
    pub fn matchable_set(&self) -> Vec<&'static str> {
        let mut out = Vec::new();
        collect_matchable(self, true, &mut out);
        for descendant in &self.descendants {
            if !out.contains(descendant) {
                out.push(descendant);
            }
        }
        out
    }
}

fn collect_matchable(schema: &Schema, root: bool, out: &mut Vec<&'static str>) {
    if root && schema.name != "Thing" && !schema.matchable {
        return;
    }
    if (root || schema.matchable) && !out.contains(&schema.name) {
        out.push(schema.name);
    }
    for parent in schema.extends {
        if let Some(parent) = get(parent) {
            collect_matchable(parent, false, out);
        }
    }
}

static REGISTRY: Lazy<HashMap<&'static str, Schema>> = Lazy::new(|| {
    let defs: HashMap<&str, &SchemaDef> = DEFS.iter().map(|d| (d.name, d)).collect();

    fn ancestors_of(name: &str, defs: &HashMap<&str, &SchemaDef>, out: &mut Vec<&'static str>) {
        if let Some(def) = defs.get(name) {
            for parent in def.extends {
                if !out.contains(parent) {
                    out.push(parent);
                    ancestors_of(parent, defs, out);
                }
            }
        }
    }

    let mut registry = HashMap::new();
    for def in DEFS {
        let mut ancestors = Vec::new();
        ancestors_of(def.name, &defs, &mut ancestors);

        let mut properties: BTreeMap<&'static str, Property> = BTreeMap::new();
        // Ancestor properties first so a schema can re-declare one.
        for ancestor in ancestors.iter().rev() {
            if let Some(parent) = defs.get(ancestor) {
                for &(name, prop_type, matchable) in parent.properties {
                    properties.insert(name, Property { name, prop_type, matchable });
                }
            }
        }
        for &(name, prop_type, matchable) in def.properties {
            properties.insert(name, Property { name, prop_type, matchable });
        }

        registry.insert(
            def.name,
            Schema {
                name: def.name,
                matchable: def.matchable,
                edge: def.edge,
                name_kind: def.name_kind,
                extends: def.extends,
                ancestors,
                descendants: Vec::new(),
                properties,
            },
        );
    }

    let mut descendants: HashMap<&str, Vec<&'static str>> = HashMap::new();
    for def in DEFS {
        let mut chain = Vec::new();
        ancestors_of(def.name, &defs, &mut chain);
        for ancestor in chain {
            descendants.entry(ancestor).or_default().push(def.name);
        }
    }
    for (name, mut children) in descendants {
        children.sort();
        if let Some(schema) = registry.get_mut(name) {
            schema.descendants = children;
        }
    }
    registry
});

/// Look up a schema by its tag.
pub fn get(name: &str) -> Option<&'static Schema> {
    REGISTRY.get(name)
}

/// The property name under which an incoming reference is reported on the
/// referenced entity. `Sanction.entity = X` shows up on `X` as
/// `sanctions`. Properties without a reverse name are not reported.
pub fn reverse_name(schema: &str, prop: &str) -> Option<&'static str> {
    match (schema, prop) {
        ("Sanction", "entity") => Some("sanctions"),
        ("Identification" | "Passport", "holder") => Some("identification"),
        ("Payment", "payer") => Some("paymentsMade"),
        ("Payment", "beneficiary") => Some("paymentsReceived"),
        ("Ownership", "owner") => Some("ownershipOwner"),
        ("Ownership", "asset") => Some("ownershipAsset"),
        ("Directorship", "director") => Some("directorshipDirector"),
        ("Directorship", "organization") => Some("directorshipOrganization"),
        ("Employment", "employer") => Some("employmentEmployer"),
        ("Employment", "employee") => Some("employmentEmployee"),
        ("Membership", "member") => Some("membershipMember"),
        ("Membership", "organization") => Some("membershipOrganization"),
        ("Family", "person") => Some("familyPerson"),
        ("Family", "relative") => Some("familyRelative"),
        ("Associate", "person") => Some("associates"),
        ("Associate", "associate") => Some("associateOf"),
        ("Occupancy", "holder") => Some("positionOccupancies"),
        ("Occupancy", "post") => Some("occupancies"),
        ("UnknownLink", "subject") => Some("unknownLinkTo"),
        ("UnknownLink", "object") => Some("unknownLinkFrom"),
        _ => None,
    }
}

/// All schema names in the taxonomy.
pub fn all() -> impl Iterator<Item = &'static Schema> {
    REGISTRY.values()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lattice_is_a() {
        let person = get("Person").unwrap();
        assert!(person.is_a("Person"));
        assert!(person.is_a("LegalEntity"));
        assert!(person.is_a("Thing"));
        assert!(!person.is_a("Organization"));
    }

    #[test]
    fn matchable_chain() {
        assert_eq!(get("Person").unwrap().matchable_set(), &["Person", "LegalEntity"]);
        assert_eq!(
            get("Company").unwrap().matchable_set(),
            &["Company", "Organization", "LegalEntity"]
        );
        assert_eq!(get("Airplane").unwrap().matchable_set(), &["Airplane"]);
        assert!(get("Vehicle").unwrap().matchable_set().contains(&"Vessel"));
    }

    #[test]
    fn thing_covers_descendants() {
        let set = get("Thing").unwrap().matchable_set();
        assert!(set.contains(&"Thing"));
        assert!(set.contains(&"Person"));
        assert!(set.contains(&"Company"));
    }

    #[test]
    fn properties_are_inherited() {
        let person = get("Person").unwrap();
        assert!(person.property("name").is_some());
        assert!(person.property("registrationNumber").is_some());
        assert!(person.property("birthDate").is_some());
        assert!(person.property("imoNumber").is_none());
    }

    #[test]
    fn edges_are_marked() {
        assert!(get("Sanction").unwrap().edge);
        assert!(get("Ownership").unwrap().edge);
        assert!(!get("Person").unwrap().edge);
    }
}
