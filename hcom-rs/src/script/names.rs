//! Variable and parameter name resolution.
//!
//! Users type *short* dotted names (`Mass.P1.x`); the log-data store and the
//! model host use *long* names (`Mass#P1#Position`).  A name may carry a
//! generation suffix after its last `@` and may contain `*` wildcards.

use tracing::warn;

use crate::host::{LogDataStore, ModelHost, VectorRef};
use crate::pattern::Pattern;

// ── Generation specifiers ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationSpecifier {
    /// Zero-based generation.
    Explicit(usize),
    Lowest,
    Highest,
    Latest,
    All,
}

/// Split `name@gen` on the last `@`.
pub fn split_generation(name: &str) -> (&str, Option<&str>) {
    match name.rfind('@') {
        Some(i) => (&name[..i], Some(&name[i + 1..])),
        None => (name, None),
    }
}

/// Parse the text after `@`.  Integers are one-based; zero or negative means
/// the latest generation.
pub fn parse_generation(s: &str) -> Result<GenerationSpecifier, String> {
    match s.trim() {
        "l" | "L" => Ok(GenerationSpecifier::Lowest),
        "h" | "H" => Ok(GenerationSpecifier::Highest),
        "*" | "a" | "A" => Ok(GenerationSpecifier::All),
        other => match other.parse::<i64>() {
            Ok(g) if g >= 1 => Ok(GenerationSpecifier::Explicit((g - 1) as usize)),
            Ok(_) => Ok(GenerationSpecifier::Latest),
            Err(_) => Err(format!("Could not parse generation specifier: {other}")),
        },
    }
}

// ── Short / long names ────────────────────────────────────────────────────────

/// Bidirectional table of final-segment abbreviations.
#[derive(Debug, Clone, Default)]
pub struct NameTable {
    entries: Vec<(String, String)>,
}

impl NameTable {
    pub fn with_defaults() -> Self {
        let mut table = NameTable::default();
        for (short, long) in [
            ("x", "Position"),
            ("v", "Velocity"),
            ("f", "Force"),
            ("p", "Pressure"),
            ("q", "Flow"),
            ("y", "Value"),
            ("Zc", "CharImpedance"),
            ("c", "WaveVariable"),
            ("me", "EquivalentMass"),
            ("Q", "HeatFlow"),
            ("t", "Temperature"),
        ] {
            table.register(short, long);
        }
        table
    }

    /// Append a mapping.  Earlier registrations win on lookup.
    pub fn register(&mut self, short: &str, long: &str) {
        self.entries.push((short.to_owned(), long.to_owned()));
    }

    /// `Mass.P1.x` → `Mass#P1#Position`.  Quotes are removed.
    pub fn to_long_name(&self, name: &str) -> String {
        let name = name.replace('.', "#").replace('"', "");
        self.translate_last(&name, '#', |(s, l)| (s.as_str(), l.as_str()))
    }

    /// `Mass#P1#Position` → `Mass.P1.x`.
    pub fn to_short_name(&self, name: &str) -> String {
        let name = name.replace('#', ".");
        self.translate_last(&name, '.', |(s, l)| (l.as_str(), s.as_str()))
    }

    fn translate_last<'a>(
        &'a self,
        name: &str,
        sep: char,
        direction: impl Fn(&'a (String, String)) -> (&'a str, &'a str),
    ) -> String {
        let Some((head, last)) = name.rsplit_once(sep) else {
            return name.to_owned();
        };
        let mut candidates = self.entries.iter().map(direction).filter(|(from, _)| *from == last);
        let Some((_, to)) = candidates.next() else {
            return name.to_owned();
        };
        if candidates.next().is_some() {
            warn!(segment = last, chosen = to, "ambiguous data name abbreviation");
        }
        format!("{head}{sep}{to}")
    }
}

// ── Resolver ──────────────────────────────────────────────────────────────────

/// Borrowed view over the collaborators needed to resolve names.
pub struct Resolver<'a> {
    pub store: &'a dyn LogDataStore,
    pub model: &'a dyn ModelHost,
    pub names: &'a NameTable,
}

impl<'a> Resolver<'a> {
    pub fn new(store: &'a dyn LogDataStore, model: &'a dyn ModelHost, names: &'a NameTable) -> Self {
        Resolver { store, model, names }
    }

    /// Long store name for a user-typed base name (no generation suffix).
    pub fn long_variable_name(&self, base: &str) -> String {
        match self.model.full_name_from_alias(base) {
            Some(full) => full,
            None => self.names.to_long_name(base),
        }
    }

    /// Short names of stored variables matching `pattern`, decorated with
    /// one-based `@gen` suffixes when the pattern carries a specifier.
    pub fn matching_variables(&self, pattern: &str) -> Result<Vec<String>, String> {
        let (base, gen_text) = split_generation(pattern.trim());
        let generation = gen_text
            .map(parse_generation)
            .transpose()
            .map_err(|_| "Could not parse generation specifier".to_owned())?;

        let wanted = self.names.to_short_name(&self.long_variable_name(base));
        let filter = Pattern::wildcard(&wanted).map_err(|e| e.to_string())?;

        let store = self.store;
        let generation = match generation {
            Some(GenerationSpecifier::Lowest) => store.lowest_generation().map(GenerationSpecifier::Explicit),
            Some(GenerationSpecifier::Highest) => store.highest_generation().map(GenerationSpecifier::Explicit),
            other => other,
        };

        let mut out = Vec::new();
        for long in store.variable_names() {
            let short = self.names.to_short_name(&long);
            if !filter.matches(&short) {
                continue;
            }
            let gens = store.generations(&long);
            match (gen_text, generation) {
                (None, _) => out.push(short),
                // Lowest/Highest against an empty store.
                (Some(_), None) => {}
                (Some(_), Some(GenerationSpecifier::Explicit(g))) => {
                    if gens.contains(&g) {
                        out.push(format!("{short}@{}", g + 1));
                    }
                }
                (Some(_), Some(GenerationSpecifier::All)) => {
                    out.extend(gens.iter().map(|g| format!("{short}@{}", g + 1)));
                }
                (Some(_), Some(_)) => {
                    if let Some(g) = gens.last() {
                        out.push(format!("{short}@{}", g + 1));
                    }
                }
            }
        }
        Ok(out)
    }

    /// Resolve one name to a single stored vector.
    ///
    /// Returns the vector (if any) and a warning to print when the generation
    /// suffix was unparsable but the variable was still found.
    pub fn lookup_vector(&self, name: &str) -> (Option<VectorRef>, Option<String>) {
        let name = name.trim();
        let (base, gen_text) = split_generation(name);
        let (generation, mut warning) = match gen_text.map(parse_generation) {
            None => (None, None),
            Some(Ok(g)) => (Some(g), None),
            Some(Err(_)) => (
                None,
                Some(format!("Could not parse generation specifier in: {name}, choosing current")),
            ),
        };

        let long = self.long_variable_name(base);
        let gens = self.store.generations(&long);
        if gens.is_empty() {
            return (None, None);
        }
        let chosen = match generation {
            Some(GenerationSpecifier::Explicit(g)) => Some(g),
            Some(GenerationSpecifier::Lowest) => gens.first().copied(),
            Some(GenerationSpecifier::Highest | GenerationSpecifier::Latest) => gens.last().copied(),
            Some(GenerationSpecifier::All) | None => self
                .store
                .current_generation()
                .filter(|c| gens.contains(c))
                .or_else(|| gens.last().copied()),
        };
        let found = chosen.and_then(|g| self.store.get(&long, g));
        if found.is_none() {
            warning = None;
        }
        (found, warning)
    }

    // ── Parameters ────────────────────────────────────────────────────────────

    /// Display names of every model parameter: `Comp.par`, `Comp.Port.x`,
    /// system parameters, and aliases that point at a listed parameter.
    /// Component names containing spaces are quoted.
    pub fn all_parameters(&self) -> Vec<String> {
        let mut all: Vec<String> = self
            .model
            .parameter_names()
            .iter()
            .map(|long| {
                let (comp, rest) = long.split_once('#').unwrap_or((long.as_str(), ""));
                let short = self.names.to_short_name(&format!("_#{rest}"));
                format!("{}{}", quote_if_spaced(comp), &short[1..])
            })
            .collect();
        all.extend(self.model.system_parameter_names().iter().map(|s| quote_if_spaced(s)));
        for alias in self.model.alias_names() {
            if let Some(full) = self.model.full_name_from_alias(&alias) {
                if all.contains(&self.names.to_short_name(&full)) {
                    all.push(alias);
                }
            }
        }
        all
    }

    /// Parameter display names matching `pattern` (`*` wildcards).
    pub fn matching_parameters(&self, pattern: &str) -> Vec<String> {
        if !self.model.has_model() {
            return Vec::new();
        }
        match Pattern::wildcard(pattern.trim()) {
            Ok(p) => p.filter(&self.all_parameters()),
            Err(_) => Vec::new(),
        }
    }

    /// The long host name under which a parameter display name exists.
    pub fn parameter_long_name(&self, display: &str) -> Option<String> {
        let display = display.trim();
        if display.is_empty() {
            return None;
        }
        let translated = self.names.to_long_name(display);
        let literal = display.replace('.', "#").replace('"', "");
        let alias = self.model.full_name_from_alias(display);
        [Some(translated), Some(literal), alias]
            .into_iter()
            .flatten()
            .find(|long| self.model.parameter_value(long).is_some())
    }

    pub fn parameter_value(&self, display: &str) -> Option<String> {
        let long = self.parameter_long_name(display)?;
        self.model.parameter_value(&long)
    }
}

/// Wrap a name segment containing spaces in double quotes.
pub fn quote_if_spaced(name: &str) -> String {
    if name.contains(' ') {
        format!("\"{name}\"")
    } else {
        name.to_owned()
    }
}

/// Quote each dotted segment that contains a space.
pub fn quote_segments(name: &str) -> String {
    name.split('.').map(quote_if_spaced).collect::<Vec<_>>().join(".")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::{LogVector, MemoryLogStore, MemoryModel};

    #[test]
    fn generation_suffixes() {
        assert_eq!(split_generation("x@2"), ("x", Some("2")));
        assert_eq!(split_generation("a@b@h"), ("a@b", Some("h")));
        assert_eq!(split_generation("x"), ("x", None));
        assert_eq!(parse_generation("2"), Ok(GenerationSpecifier::Explicit(1)));
        assert_eq!(parse_generation("h"), Ok(GenerationSpecifier::Highest));
        assert_eq!(parse_generation("L"), Ok(GenerationSpecifier::Lowest));
        assert_eq!(parse_generation("*"), Ok(GenerationSpecifier::All));
        assert_eq!(parse_generation("0"), Ok(GenerationSpecifier::Latest));
        assert_eq!(parse_generation("-3"), Ok(GenerationSpecifier::Latest));
        assert!(parse_generation("zz").is_err());
    }

    #[test]
    fn short_long_translation_only_touches_last_segment() {
        let t = NameTable::with_defaults();
        assert_eq!(t.to_long_name("Mass.P1.x"), "Mass#P1#Position");
        assert_eq!(t.to_long_name("\"My mass\".P1.v"), "My mass#P1#Velocity");
        assert_eq!(t.to_long_name("x"), "x");
        assert_eq!(t.to_long_name("x.p.q"), "x#p#Flow");
        assert_eq!(t.to_short_name("Mass#P1#Position"), "Mass.P1.x");
        assert_eq!(t.to_short_name("Position"), "Position");
    }

    #[test]
    fn first_registration_wins() {
        let mut t = NameTable::with_defaults();
        t.register("x", "Displacement");
        assert_eq!(t.to_long_name("A.x"), "A#Position");
        assert_eq!(t.to_short_name("A#Displacement"), "A.x");
    }

    fn store() -> MemoryLogStore {
        let mut s = MemoryLogStore::new();
        for g in 0..3 {
            s.insert(LogVector::new("Mass#P1#Position", g, vec![g as f64]));
        }
        s.insert(LogVector::new("Mass#P1#Velocity", 1, vec![10.0]));
        s.insert(LogVector::new("time", 2, vec![0.0]));
        s
    }

    #[test]
    fn wildcard_matching_with_generations() {
        let (s, m, t) = (store(), MemoryModel::new(), NameTable::with_defaults());
        let r = Resolver::new(&s, &m, &t);
        assert_eq!(r.matching_variables("Mass.*").unwrap(), vec!["Mass.P1.x", "Mass.P1.v"]);
        assert_eq!(r.matching_variables("Mass.*@2").unwrap(), vec!["Mass.P1.x@2", "Mass.P1.v@2"]);
        assert_eq!(r.matching_variables("*@H").unwrap(), vec!["Mass.P1.x@3", "time@3"]);
        assert_eq!(r.matching_variables("Mass.P1.x@*").unwrap().len(), 3);
        assert_eq!(r.matching_variables("Mass.P1.v@0").unwrap(), vec!["Mass.P1.v@2"]);
        assert!(r.matching_variables("nothing*").unwrap().is_empty());
        assert!(r.matching_variables("Mass.*@bad").is_err());
    }

    #[test]
    fn lookup_picks_generation() {
        let (s, m, t) = (store(), MemoryModel::new(), NameTable::with_defaults());
        let r = Resolver::new(&s, &m, &t);
        let (v, w) = r.lookup_vector("Mass.P1.x");
        assert_eq!(v.unwrap().borrow().generation, 2);
        assert!(w.is_none());
        assert_eq!(r.lookup_vector("Mass.P1.x@1").0.unwrap().borrow().generation, 0);
        assert_eq!(r.lookup_vector("Mass.P1.x@l").0.unwrap().borrow().generation, 0);
        // not in the current generation: fall back to the variable's latest
        assert_eq!(r.lookup_vector("Mass.P1.v").0.unwrap().borrow().generation, 1);
        let (v, w) = r.lookup_vector("Mass.P1.x@what");
        assert!(v.is_some());
        assert!(w.unwrap().contains("choosing current"));
        assert!(r.lookup_vector("Mass.P1.x@9").0.is_none());
        let (v, w) = r.lookup_vector("nothing@what");
        assert!(v.is_none() && w.is_none());
    }

    #[test]
    fn parameters_by_display_name() {
        let m = MemoryModel::new()
            .with_component("Mass", "Mass", &[("m", "100"), ("P1#Position", "0.5")])
            .with_component("My spring", "Spring", &[("k", "1e4")])
            .with_system_parameter("g", "9.81");
        let (s, t) = (MemoryLogStore::new(), NameTable::with_defaults());
        let r = Resolver::new(&s, &m, &t);
        let all = r.all_parameters();
        assert!(all.contains(&"Mass.m".to_owned()));
        assert!(all.contains(&"Mass.P1.x".to_owned()));
        assert!(all.contains(&"\"My spring\".k".to_owned()));
        assert!(all.contains(&"g".to_owned()));
        assert_eq!(r.matching_parameters("Mass.*").len(), 2);
        assert_eq!(r.parameter_value("Mass.P1.x").as_deref(), Some("0.5"));
        assert_eq!(r.parameter_value("\"My spring\".k").as_deref(), Some("1e4"));
        assert_eq!(r.parameter_value("g").as_deref(), Some("9.81"));
        assert_eq!(r.parameter_value("Mass.nope"), None);
    }

    #[test]
    fn segment_quoting() {
        assert_eq!(quote_segments("My mass.P1.x"), "\"My mass\".P1.x");
    }
}
