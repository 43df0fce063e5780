//! Catalog records: the films, series and books that get indexed.
//!
//! Field names on the wire follow the catalog service (`baslik`, `tur`,
//! `aciklama`, ...). English names are accepted on input as aliases.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// Kind of catalog entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    Film,
    Series,
    Book,
}

#[derive(Debug, thiserror::Error)]
#[error("unknown category '{0}', expected one of: film, dizi, kitap")]
pub struct UnknownCategory(pub String);

impl Category {
    /// Label used on the wire and in the searchable text.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Film => "film",
            Category::Series => "dizi",
            Category::Book => "kitap",
        }
    }

    /// Human readable label, used as the prefix of a result reason.
    pub fn label(&self) -> &'static str {
        match self {
            Category::Film => "Film",
            Category::Series => "Series",
            Category::Book => "Book",
        }
    }

    /// Parse an optional filter value. Blank input means "no filter".
    pub fn parse_filter(value: Option<&str>) -> Result<Option<Self>, UnknownCategory> {
        match value.map(str::trim) {
            None | Some("") => Ok(None),
            Some(value) => value.parse().map(Some),
        }
    }
}

impl FromStr for Category {
    type Err = UnknownCategory;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "film" => Ok(Category::Film),
            "dizi" | "series" => Ok(Category::Series),
            "kitap" | "book" => Ok(Category::Book),
            _ => Err(UnknownCategory(s.to_string())),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}

/// A single catalog entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContentItem {
    pub id: i64,

    #[serde(rename = "baslik", alias = "title")]
    pub title: String,

    #[serde(rename = "tur", alias = "category")]
    pub category: Category,

    #[serde(rename = "aciklama", alias = "description", default)]
    pub description: String,

    #[serde(rename = "yil", alias = "year", default)]
    pub year: Option<i32>,

    #[serde(rename = "posterUrl", alias = "poster_url", default)]
    pub poster_url: Option<String>,

    #[serde(rename = "puan", alias = "rating", default)]
    pub rating: Option<f32>,
}

/// Catalog document as accepted by the `index` command: either a bare array
/// or the `{"contents": [...]}` body used by the HTTP endpoint.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CatalogDocument {
    Bare(Vec<ContentItem>),
    Wrapped { contents: Vec<ContentItem> },
}

pub fn parse_catalog(bytes: &[u8]) -> serde_json::Result<Vec<ContentItem>> {
    let document: CatalogDocument = serde_json::from_slice(bytes)?;
    Ok(match document {
        CatalogDocument::Bare(items) => items,
        CatalogDocument::Wrapped { contents } => contents,
    })
}
