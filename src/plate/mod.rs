// Plate layout - well identifiers and operator-assigned well names
//
// Wells are addressed by the instrument's native coordinates ("A1".."H3" on
// the 8x3 plate). Operators rename wells during plate setup; the resulting
// identifier -> name table is immutable for the lifetime of a calibration run.

pub mod roles;

pub use roles::{ControlRole, ControlRoles};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

/// Native well identifiers of the 8x3 plate, row-major
pub const DEFAULT_WELL_MATRIX: [[&str; 3]; 8] = [
    ["A1", "A2", "A3"],
    ["B1", "B2", "B3"],
    ["C1", "C2", "C3"],
    ["D1", "D2", "D3"],
    ["E1", "E2", "E3"],
    ["F1", "F2", "F3"],
    ["G1", "G2", "G3"],
    ["H1", "H2", "H3"],
];

/// Mapping from well identifier to operator-assigned display name
///
/// Display names are not required to be unique. Lookups of unknown
/// identifiers fall back to the identifier itself.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WellNameMap {
    names: HashMap<String, String>,
}

impl WellNameMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the mapping from a matrix of user names laid out like
    /// [`DEFAULT_WELL_MATRIX`]
    ///
    /// Cells outside the 8x3 grid are ignored; cells the user matrix does not
    /// cover stay unnamed.
    pub fn from_matrix<R, S>(user_matrix: &[R]) -> Self
    where
        R: AsRef<[S]>,
        S: AsRef<str>,
    {
        let mut map = Self::new();
        for (row, user_row) in user_matrix.iter().enumerate() {
            let Some(default_row) = DEFAULT_WELL_MATRIX.get(row) else {
                break;
            };
            for (col, name) in user_row.as_ref().iter().enumerate() {
                if let Some(well) = default_row.get(col) {
                    map.insert(*well, name.as_ref());
                }
            }
        }
        map
    }

    pub fn insert(&mut self, well: impl Into<String>, name: impl Into<String>) {
        self.names.insert(well.into(), name.into());
    }

    /// Display name for a well, or the identifier when unnamed
    pub fn display_name<'a>(&'a self, well: &'a str) -> &'a str {
        self.names.get(well).map(String::as_str).unwrap_or(well)
    }

    /// Whether any well carries this display name
    pub fn contains_name(&self, name: &str) -> bool {
        self.names.values().any(|n| n == name)
    }

    /// All identifiers carrying this display name, sorted
    pub fn wells_named(&self, name: &str) -> Vec<&str> {
        let mut wells: Vec<&str> = self
            .names
            .iter()
            .filter(|(_, n)| n.as_str() == name)
            .map(|(w, _)| w.as_str())
            .collect();
        wells.sort_unstable();
        wells
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(w, n)| (w.as_str(), n.as_str()))
    }
}

impl<K, V> FromIterator<(K, V)> for WellNameMap
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut map = Self::new();
        for (well, name) in iter {
            map.insert(well, name);
        }
        map
    }
}

/// Probe (fluorescence channel) name encoded in an export file name
///
/// Exports are named `<a>_<b>_<c>_<probe>_<rest>`: the directory is dropped,
/// everything from the fourth underscore on is cut, then the first three
/// underscore-delimited fields are removed.
pub fn probe_from_path<P: AsRef<Path>>(path: P) -> String {
    let raw = path.as_ref().to_string_lossy();
    let file_name = match raw.rfind(['\\', '/']) {
        Some(idx) => &raw[idx + 1..],
        None => &raw[..],
    };

    let mut stem = file_name;
    if let Some((idx, _)) = file_name.match_indices('_').nth(3) {
        stem = &file_name[..idx];
    }

    for _ in 0..3 {
        match stem.find('_') {
            Some(idx) => stem = &stem[idx + 1..],
            None => break,
        }
    }
    stem.to_string()
}
