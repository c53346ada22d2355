//! Plan documents: TOML, JSON and XML codecs.

pub mod emit;
pub mod format;
pub mod parser;
pub mod xml;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use thiserror::Error;

pub use emit::{SerializeError, serialize, to_document};
pub use format::PlanDocument;
pub use parser::{ParseError, from_document, parse};
pub use xml::XmlError;

/// On-disk syntax of a plan document.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum Format {
    #[default]
    Toml,
    Json,
    Xml,
}

impl Format {
    /// Infer the format from a file extension. Unknown extensions give
    /// `None`.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?;
        ext.parse().ok()
    }

    pub fn extension(self) -> &'static str {
        match self {
            Self::Toml => "toml",
            Self::Json => "json",
            Self::Xml => "xml",
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for Format {
    type Err = FormatParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "toml" => Ok(Self::Toml),
            "json" => Ok(Self::Json),
            "xml" => Ok(Self::Xml),
            _ => Err(FormatParseError(s.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Format`] string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid document format: {0:?} (expected toml, json or xml)")]
pub struct FormatParseError(pub String);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn format_from_path() {
        assert_eq!(Format::from_path(Path::new("plan.toml")), Some(Format::Toml));
        assert_eq!(Format::from_path(Path::new("dir/PLAN.JSON")), Some(Format::Json));
        assert_eq!(Format::from_path(Path::new("plan.xml")), Some(Format::Xml));
        assert_eq!(Format::from_path(Path::new("plan.yaml")), None);
        assert_eq!(Format::from_path(Path::new("plan")), None);
    }
}
