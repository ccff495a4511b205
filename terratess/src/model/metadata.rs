//! Model metadata.
//!
//! The metadata block names the attributes stored at every profile node
//! (with their units), carries the reference shape and a free-text
//! description, and records which software wrote the model and when.

use thiserror::Error;

use crate::earth::EarthShape;

/// Problems assembling a metadata block.
#[derive(Debug, Error)]
pub enum MetadataError {
    #[error("attribute names ({names}) and units ({units}) differ in length")]
    AttributeLengthMismatch { names: usize, units: usize },

    #[error("a model must define at least one attribute")]
    NoAttributes,

    #[error("attribute name or unit '{text}' may not contain ';'")]
    ReservedSeparator { text: String },
}

/// Names, units, provenance and shape information for one model.
#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    description: String,
    attribute_names: Vec<String>,
    attribute_units: Vec<String>,
    earth_shape: EarthShape,
    software_version: String,
    generation_date: String,
}

impl Metadata {
    /// Create metadata for the given attributes, stamped with this build's
    /// version and the current time.
    pub fn new(
        names: Vec<String>,
        units: Vec<String>,
    ) -> Result<Metadata, MetadataError> {
        if names.is_empty() {
            return Err(MetadataError::NoAttributes);
        }
        if names.len() != units.len() {
            return Err(MetadataError::AttributeLengthMismatch {
                names: names.len(),
                units: units.len(),
            });
        }
        let clean = |v: Vec<String>| -> Result<Vec<String>, MetadataError> {
            v.into_iter()
                .map(|s| {
                    let s = s.trim().to_owned();
                    if s.contains(';') {
                        Err(MetadataError::ReservedSeparator { text: s })
                    } else {
                        Ok(s)
                    }
                })
                .collect()
        };
        Ok(Metadata {
            description: String::new(),
            attribute_names: clean(names)?,
            attribute_units: clean(units)?,
            earth_shape: EarthShape::default(),
            software_version: format!("terratess.{}", crate::VERSION),
            generation_date: chrono::Utc::now().to_rfc3339(),
        })
    }

    /// Convenience constructor from string slices.
    pub fn with_attributes(names: &[&str], units: &[&str]) -> Result<Metadata, MetadataError> {
        Metadata::new(
            names.iter().map(|s| s.to_string()).collect(),
            units.iter().map(|s| s.to_string()).collect(),
        )
    }

    /// Rebuild from the `;`-joined strings recorded in files.
    pub(crate) fn from_strings(names: &str, units: &str) -> Result<Metadata, MetadataError> {
        Metadata::new(
            names.split(';').map(|s| s.trim().to_owned()).collect(),
            units.split(';').map(|s| s.trim().to_owned()).collect(),
        )
    }

    pub fn attribute_count(&self) -> usize {
        self.attribute_names.len()
    }

    pub fn attribute_names(&self) -> &[String] {
        &self.attribute_names
    }

    pub fn attribute_units(&self) -> &[String] {
        &self.attribute_units
    }

    pub fn attribute_name(&self, index: usize) -> &str {
        &self.attribute_names[index]
    }

    pub fn attribute_unit(&self, index: usize) -> &str {
        &self.attribute_units[index]
    }

    /// Index of the named attribute, if the model stores it.
    pub fn attribute_index(&self, name: &str) -> Option<usize> {
        self.attribute_names.iter().position(|n| n == name)
    }

    /// `;`-joined attribute names, the on-disk representation.
    pub fn names_string(&self) -> String {
        self.attribute_names.join(";")
    }

    /// `;`-joined attribute units, the on-disk representation.
    pub fn units_string(&self) -> String {
        self.attribute_units.join(";")
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn earth_shape(&self) -> EarthShape {
        self.earth_shape
    }

    pub fn set_earth_shape(&mut self, shape: EarthShape) {
        self.earth_shape = shape;
    }

    pub fn software_version(&self) -> &str {
        &self.software_version
    }

    pub fn set_software_version(&mut self, version: impl Into<String>) {
        self.software_version = version.into();
    }

    pub fn generation_date(&self) -> &str {
        &self.generation_date
    }

    pub fn set_generation_date(&mut self, date: impl Into<String>) {
        self.generation_date = date.into();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_attribute_lookup() {
        let md = Metadata::with_attributes(&["vp", "vs", "density"], &["km/s", "km/s", "g/cc"])
            .unwrap();
        assert_eq!(md.attribute_count(), 3);
        assert_eq!(md.attribute_index("vs"), Some(1));
        assert_eq!(md.attribute_index("qp"), None);
        assert_eq!(md.attribute_unit(2), "g/cc");
    }

    #[test]
    fn test_strings_round_trip() {
        let md = Metadata::with_attributes(&["vp", "vs"], &["km/s", "km/s"]).unwrap();
        let back = Metadata::from_strings(&md.names_string(), &md.units_string()).unwrap();
        assert_eq!(back.attribute_names(), md.attribute_names());
        assert_eq!(back.attribute_units(), md.attribute_units());
    }

    #[test]
    fn test_names_are_trimmed() {
        let md = Metadata::from_strings(" vp ; vs", "km/s ;km/s").unwrap();
        assert_eq!(md.attribute_name(0), "vp");
        assert_eq!(md.attribute_name(1), "vs");
    }

    #[test]
    fn test_rejects_mismatched_lengths() {
        let err = Metadata::with_attributes(&["vp", "vs"], &["km/s"]).unwrap_err();
        assert!(matches!(
            err,
            MetadataError::AttributeLengthMismatch { names: 2, units: 1 }
        ));
    }

    #[test]
    fn test_rejects_empty_and_reserved() {
        assert!(matches!(
            Metadata::with_attributes(&[], &[]),
            Err(MetadataError::NoAttributes)
        ));
        assert!(matches!(
            Metadata::with_attributes(&["a;b"], &["x"]),
            Err(MetadataError::ReservedSeparator { .. })
        ));
    }

    #[test]
    fn test_provenance_is_stamped() {
        let md = Metadata::with_attributes(&["vp"], &["km/s"]).unwrap();
        assert!(md.software_version().starts_with("terratess."));
        assert!(!md.generation_date().is_empty());
    }
}
