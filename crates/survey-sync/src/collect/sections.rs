//! The catalogue of survey sections and how each one is named locally and
//! remotely.

use crate::storage::keys::{complete_key, data_key};

/// One logical part of the survey.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Local key stem: `<stem>_data`, `<stem>_complete`.
    pub local_stem: String,
    /// Remote column stem: `<stem>_data`, `<stem>_complete`.
    pub remote_stem: String,
    /// Older local stems still found in long-lived browsers.
    pub legacy_stems: Vec<String>,
}

impl Section {
    fn same(stem: &str) -> Self {
        Self {
            local_stem: stem.to_string(),
            remote_stem: stem.to_string(),
            legacy_stems: Vec::new(),
        }
    }

    pub fn local_data_key(&self) -> String {
        data_key(&self.local_stem)
    }

    pub fn local_complete_key(&self) -> String {
        complete_key(&self.local_stem)
    }

    /// Local data keys in lookup order: canonical first, then legacy.
    pub fn local_data_keys(&self) -> Vec<String> {
        std::iter::once(&self.local_stem)
            .chain(self.legacy_stems.iter())
            .map(|s| data_key(s))
            .collect()
    }

    pub fn local_complete_keys(&self) -> Vec<String> {
        std::iter::once(&self.local_stem)
            .chain(self.legacy_stems.iter())
            .map(|s| complete_key(s))
            .collect()
    }

    pub fn data_column(&self) -> String {
        data_key(&self.remote_stem)
    }

    pub fn complete_column(&self) -> String {
        complete_key(&self.remote_stem)
    }
}

pub const FIRMOGRAPHICS: &str = "firmographics";
pub const DIMENSION_COUNT: usize = 13;

/// Every known section, in survey order.
pub fn all_sections() -> Vec<Section> {
    let mut sections = vec![
        Section::same(FIRMOGRAPHICS),
        Section::same("general_benefits"),
        Section::same("current_support"),
    ];
    sections.extend((1..=DIMENSION_COUNT).map(|n| Section::same(&format!("dimension{n}"))));
    sections.push(Section::same("cross_dimensional"));
    sections.push(Section {
        local_stem: "employee-impact-assessment".to_string(),
        remote_stem: "employee_impact".to_string(),
        legacy_stems: vec!["employee_impact".to_string()],
    });
    sections
}

/// Look a section up by its remote data column (`dimension3_data`).
pub fn section_for_column(column: &str) -> Option<Section> {
    all_sections().into_iter().find(|s| s.data_column() == column)
}
