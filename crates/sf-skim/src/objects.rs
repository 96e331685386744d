//! Object-quality selections ("good muons", "good electrons", ...).

use serde::{Deserialize, Serialize};

/// A per-object quality selection over one object family.
///
/// Applying it defines three kinds of columns on the event stream:
///
/// - `mask`: per-object boolean, `selection` evaluated element-wise;
/// - `<name>_<attr>` for each attribute: `<family>_<attr>[mask]`;
/// - `count`: number of selected objects, `Sum(mask)`.
///
/// Tiers (e.g. "good" and "tight") are independent selections; nothing
/// assumes one is a subset of the other.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ObjectSelection {
    /// Prefix of the derived columns (e.g. `GoodMuon`).
    pub name: String,
    /// Object family in the input (e.g. `Muon`).
    pub family: String,
    /// Name of the mask column (e.g. `good_mu_mask`).
    pub mask: String,
    /// Per-object predicate (e.g. `Muon_pt > 15 && abs(Muon_eta) < 2.4`).
    pub selection: String,
    /// Attributes to slice (e.g. `pt`, `eta`).
    #[serde(default = "default_attributes")]
    pub attributes: Vec<String>,
    /// Count column name; defaults to `n<name>`.
    #[serde(default)]
    pub count: Option<String>,
}

fn default_attributes() -> Vec<String> {
    vec!["pt".into(), "eta".into()]
}

impl ObjectSelection {
    /// Selection slicing `pt` and `eta`.
    pub fn new(
        name: impl Into<String>,
        family: impl Into<String>,
        mask: impl Into<String>,
        selection: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            family: family.into(),
            mask: mask.into(),
            selection: selection.into(),
            attributes: default_attributes(),
            count: None,
        }
    }

    /// Replace the sliced attributes.
    pub fn with_attributes<S: Into<String>>(mut self, attrs: impl IntoIterator<Item = S>) -> Self {
        self.attributes = attrs.into_iter().map(Into::into).collect();
        self
    }

    /// Muons with pT > 15 and |eta| < 2.4.
    pub fn good_muons() -> Self {
        Self::new("GoodMuon", "Muon", "good_mu_mask", "Muon_pt > 15 && abs(Muon_eta) < 2.4")
    }

    /// Electrons with pT > 15 and |eta| < 2.4.
    pub fn good_electrons() -> Self {
        Self::new(
            "GoodElectron",
            "Electron",
            "good_ele_mask",
            "Electron_pt > 15 && abs(Electron_eta) < 2.4",
        )
    }

    /// Default object selections: good muons, then good electrons.
    pub fn defaults() -> Vec<Self> {
        vec![Self::good_muons(), Self::good_electrons()]
    }

    /// Name of the count column.
    pub fn count_column(&self) -> String {
        self.count.clone().unwrap_or_else(|| format!("n{}", self.name))
    }

    /// `(derived, source)` column names for each sliced attribute.
    pub fn sliced_columns(&self) -> Vec<(String, String)> {
        self.attributes
            .iter()
            .map(|a| (format!("{}_{a}", self.name), format!("{}_{a}", self.family)))
            .collect()
    }

    /// Columns registered for output: slices, then the count.
    pub fn output_columns(&self) -> Vec<String> {
        let mut out: Vec<String> = self.sliced_columns().into_iter().map(|(d, _)| d).collect();
        out.push(self.count_column());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_names() {
        let m = ObjectSelection::good_muons();
        assert_eq!(m.count_column(), "nGoodMuon");
        assert_eq!(
            m.sliced_columns(),
            vec![
                ("GoodMuon_pt".to_string(), "Muon_pt".to_string()),
                ("GoodMuon_eta".to_string(), "Muon_eta".to_string())
            ]
        );
        assert_eq!(m.output_columns(), vec!["GoodMuon_pt", "GoodMuon_eta", "nGoodMuon"]);
    }

    #[test]
    fn yaml_defaults() {
        let yaml = "name: TightMuon\nfamily: Muon\nmask: tight_mu_mask\nselection: Muon_pt > 30\ncount: nTight\n";
        let o: ObjectSelection = serde_yaml_ng::from_str(yaml).unwrap();
        assert_eq!(o.attributes, vec!["pt", "eta"]);
        assert_eq!(o.count_column(), "nTight");
        let o = o.with_attributes(["pt", "phi", "charge"]);
        assert_eq!(o.output_columns().len(), 4);
    }
}
