//! HS4 product-code → product-name lookup.

use super::decode::read_table;
use super::error::{require_input, DataError};
use std::collections::BTreeMap;
use std::path::Path;
use tracing::{info, warn};

pub const CODE_COLUMN: &str = "product_id_hs4";
pub const NAME_COLUMN: &str = "product_name_hs4";

/// Product names keyed by 4-character code. Codes stay strings so leading
/// zeros (`0101`) survive.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProductNames {
    names: BTreeMap<String, String>,
}

impl ProductNames {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a mapping; the first name seen for a code is kept.
    /// Returns false if the code was already present.
    pub fn insert(&mut self, code: impl Into<String>, name: impl Into<String>) -> bool {
        let code = code.into();
        if self.names.contains_key(&code) {
            return false;
        }
        self.names.insert(code, name.into());
        true
    }

    pub fn get(&self, code: &str) -> Option<&str> {
        self.names.get(code).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.names.iter().map(|(c, n)| (c.as_str(), n.as_str()))
    }

    /// Load the two-column reference table.
    pub fn load(path: &Path) -> Result<Self, DataError> {
        require_input(path)?;
        let table = read_table(path)?;
        let idx = table.require_columns(&[CODE_COLUMN, NAME_COLUMN], &path.display().to_string())?;
        let (code_idx, name_idx) = (idx[0], idx[1]);

        let mut names = Self::new();
        let mut collisions = 0usize;
        for row in &table.rows {
            let code = row.get(code_idx).unwrap_or("").trim();
            if code.is_empty() {
                continue;
            }
            let name = row.get(name_idx).unwrap_or("").trim();
            if !names.insert(code, name) {
                collisions += 1;
            }
        }
        if collisions > 0 {
            warn!(path = %path.display(), collisions, "duplicate product codes in lookup, first name kept");
        }
        info!(path = %path.display(), codes = names.len(), "loaded product names");
        Ok(names)
    }
}

impl<C: Into<String>, N: Into<String>> FromIterator<(C, N)> for ProductNames {
    fn from_iter<I: IntoIterator<Item = (C, N)>>(iter: I) -> Self {
        let mut names = Self::new();
        for (code, name) in iter {
            names.insert(code, name);
        }
        names
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn temp_file(contents: &[u8]) -> (TempDir, PathBuf) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("code_hs4.csv");
        std::fs::write(&path, contents).unwrap();
        (dir, path)
    }

    #[test]
    fn load_keeps_leading_zeros_and_first_duplicate() {
        let (_dir, path) = temp_file(
            b"product_id_hs4,product_name_hs4\n0101,Horses\n8404,Boilers\n0101,Ponies\n,blank\n",
        );
        let names = ProductNames::load(&path).unwrap();

        assert_eq!(names.len(), 2);
        assert_eq!(names.get("0101"), Some("Horses"));
        assert_eq!(names.get("8404"), Some("Boilers"));
        assert_eq!(names.get("101"), None);
    }

    #[test]
    fn load_rejects_wrong_columns() {
        let (_dir, path) = temp_file(b"code,name\n0101,Horses\n");
        let err = ProductNames::load(&path).unwrap_err();
        assert!(matches!(err, DataError::SchemaMismatch { .. }));
    }

    #[test]
    fn load_missing_file_is_input_missing() {
        let err = ProductNames::load(Path::new("/no/such/code_hs4.csv")).unwrap_err();
        assert!(matches!(err, DataError::InputMissing(_)));
    }
}
