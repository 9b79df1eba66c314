use serde::{Deserialize, Serialize};

use crate::storage::{Document, Fields, StoreError, encode};

pub const DEFAULT_LEGEND_COLOR: &str = "#d3d3d3";
pub const PLACEHOLDER_NAME: &str = "?";
pub const PLACEHOLDER_COLOR: &str = "#ccc";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Legend {
    #[serde(skip)]
    pub id: String,
    pub name: String,
    pub color: String,
}

impl Legend {
    pub fn new(name: &str, color: &str) -> Self {
        Self {
            id: String::new(),
            name: name.trim().to_string(),
            color: color.to_string(),
        }
    }

    /// Stand-in for events whose legend no longer exists.
    pub fn placeholder() -> Self {
        Self {
            id: String::new(),
            name: PLACEHOLDER_NAME.to_string(),
            color: PLACEHOLDER_COLOR.to_string(),
        }
    }

    pub fn is_placeholder(&self) -> bool {
        self.id.is_empty() && self.name == PLACEHOLDER_NAME
    }

    pub fn from_document(doc: &Document) -> Result<Self, serde_json::Error> {
        let mut legend: Legend = doc.decode()?;
        legend.id = doc.id.clone();
        Ok(legend)
    }

    pub fn to_fields(&self) -> Result<Fields, StoreError> {
        encode(self)
    }
}
