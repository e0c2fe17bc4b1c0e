use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Direction of a trade flow, seen from the reporting economy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TradeFlow {
    Export,
    Import,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown trade flow '{0}'")]
pub struct UnknownFlow(pub String);

impl TradeFlow {
    /// Canonical spelling, also the only spelling accepted in submissions.
    pub fn as_str(&self) -> &'static str {
        match self {
            TradeFlow::Export => "Export",
            TradeFlow::Import => "Import",
        }
    }

    /// Lowercase form used in file names (`USA_2021_export.csv`).
    pub fn file_tag(&self) -> &'static str {
        match self {
            TradeFlow::Export => "export",
            TradeFlow::Import => "import",
        }
    }

    /// Single-letter flow code used in comtrade file names (`X` / `M`).
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "X" | "x" => Some(TradeFlow::Export),
            "M" | "m" => Some(TradeFlow::Import),
            _ => None,
        }
    }
}

impl FromStr for TradeFlow {
    type Err = UnknownFlow;

    /// Lenient parse for source data. Submission checking compares against
    /// [`TradeFlow::as_str`] instead, since it must be case-sensitive.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "export" | "exports" | "x" => Ok(TradeFlow::Export),
            "import" | "imports" | "m" => Ok(TradeFlow::Import),
            _ => Err(UnknownFlow(s.to_string())),
        }
    }
}

impl fmt::Display for TradeFlow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_source_spellings() {
        assert_eq!("Exports".parse::<TradeFlow>().unwrap(), TradeFlow::Export);
        assert_eq!(" import ".parse::<TradeFlow>().unwrap(), TradeFlow::Import);
        assert_eq!("M".parse::<TradeFlow>().unwrap(), TradeFlow::Import);
        assert!("Re-export".parse::<TradeFlow>().is_err());
    }

    #[test]
    fn file_codes() {
        assert_eq!(TradeFlow::from_code("X"), Some(TradeFlow::Export));
        assert_eq!(TradeFlow::from_code("M"), Some(TradeFlow::Import));
        assert_eq!(TradeFlow::from_code("R"), None);
        assert_eq!(TradeFlow::Import.file_tag(), "import");
    }
}
