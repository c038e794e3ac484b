//! Keyword filter on tender subjects.
//!
//! Subjects and keywords are compared after lowercasing and folding Latin
//! accents, so `Équipement` matches `equipement`.

use tenderflow_shared::FilterConfig;

/// Excludes tenders whose subject contains any denylisted keyword.
#[derive(Debug, Clone, Default)]
pub struct SubjectFilter {
    /// `(original, folded)` pairs; empty keywords are dropped.
    keywords: Vec<(String, String)>,
}

impl SubjectFilter {
    pub fn new<I, S>(keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let keywords = keywords
            .into_iter()
            .filter_map(|k| {
                let original = k.as_ref().trim().to_string();
                let folded = fold(&original);
                (!folded.is_empty()).then_some((original, folded))
            })
            .collect();
        Self { keywords }
    }

    pub fn from_config(config: &FilterConfig) -> Self {
        Self::new(&config.excluded_keywords)
    }

    /// The first keyword found in `subject`, if any.
    pub fn matched_keyword(&self, subject: &str) -> Option<&str> {
        let subject = fold(subject);
        self.keywords
            .iter()
            .find(|(_, folded)| subject.contains(folded.as_str()))
            .map(|(original, _)| original.as_str())
    }

    pub fn is_excluded(&self, subject: &str) -> bool {
        self.matched_keyword(subject).is_some()
    }

    pub fn len(&self) -> usize {
        self.keywords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
    }
}

/// Lowercase and strip the accents found in French tender subjects.
pub fn fold(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars().flat_map(char::to_lowercase) {
        match c {
            'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => out.push('a'),
            'ç' => out.push('c'),
            'è' | 'é' | 'ê' | 'ë' => out.push('e'),
            'ì' | 'í' | 'î' | 'ï' => out.push('i'),
            'ñ' => out.push('n'),
            'ò' | 'ó' | 'ô' | 'õ' | 'ö' => out.push('o'),
            'ù' | 'ú' | 'û' | 'ü' => out.push('u'),
            'ý' | 'ÿ' => out.push('y'),
            'œ' => out.push_str("oe"),
            'æ' => out.push_str("ae"),
            '\u{2019}' => out.push('\''),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_list_excludes_supply_tenders() {
        let filter = SubjectFilter::from_config(&FilterConfig::default());
        assert_eq!(filter.matched_keyword("Fourniture de matériel"), Some("fourniture"));
        assert!(filter.is_excluded("TRAVAUX d'aménagement"));
        assert!(filter.is_excluded("Acquisition de véhicules"));
        assert!(!filter.is_excluded("Etude de faisabilité du schéma directeur"));
        assert!(!filter.is_excluded("Assistance technique et conseil"));
    }

    #[test]
    fn accents_are_ignored_both_ways() {
        let filter = SubjectFilter::new(["équipement", "Recrutement"]);
        assert!(filter.is_excluded("Equipement informatique"));
        assert!(filter.is_excluded("ÉQUIPEMENT des salles"));
        assert!(filter.is_excluded("recrutement d'un expert"));
        assert!(filter.is_excluded("Lot 2 : Équipements"));
    }

    #[test]
    fn blank_keywords_never_match_everything() {
        let filter = SubjectFilter::new(["", "   "]);
        assert!(filter.is_empty());
        assert!(!filter.is_excluded("anything"));
    }

    #[test]
    fn fold_handles_ligatures() {
        assert_eq!(fold("Œuvre Élève"), "oeuvre eleve");
        assert_eq!(fold("l\u{2019}État"), "l'etat");
    }
}
