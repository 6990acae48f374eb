use serde::{Deserialize, Serialize};

/// A persisted recipe.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct Recipe {
    /// Row id. `0` asks the store to assign one on insert.
    pub id: i64,
    pub name: String,
    /// Comma separated ingredient list.
    pub ingredients: String,
    pub guide: String,
    /// Bundled artwork id, `0` when the recipe has none.
    #[serde(default)]
    pub image: i64,
    /// Reference to an imported photo (path or `file://` URI).
    #[serde(default)]
    pub image_path: Option<String>,
    #[serde(default)]
    pub is_favorite: bool,
    #[serde(default)]
    pub is_viewed: bool,
}

impl Recipe {
    pub fn new(name: impl Into<String>, ingredients: impl Into<String>, guide: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ingredients: ingredients.into(),
            guide: guide.into(),
            ..Default::default()
        }
    }

    /// Ingredients split on commas, trimmed, with blanks dropped.
    pub fn ingredient_list(&self) -> Vec<&str> {
        self.ingredients
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// A managed image file that could not be removed.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of one orphan image reclaim pass.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq, Default)]
pub struct DeletionResult {
    /// Managed image files found in the directory.
    pub inspected: usize,
    pub deleted: usize,
    /// Files kept because a recipe references them.
    pub retained: usize,
    #[serde(default)]
    pub failures: Vec<FileFailure>,
}

impl DeletionResult {
    pub fn failed(&self) -> usize {
        self.failures.len()
    }
}
