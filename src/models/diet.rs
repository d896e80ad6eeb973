use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MealCategory {
    Breakfast,
    Snack,
    Lunch,
    Dinner,
    #[serde(other)]
    Other,
}

impl Default for MealCategory {
    fn default() -> Self {
        Self::Other
    }
}

impl MealCategory {
    /// Maps a free-form meal label (Spanish source text) to a category.
    /// Anything unrecognized is `Other`.
    pub fn from_label(label: &str) -> Self {
        let v = label.to_lowercase();
        if v.contains("desayuno") {
            Self::Breakfast
        } else if v.contains("colación") || v.contains("colacion") || v.contains("snack") {
            Self::Snack
        } else if v.contains("comida") || v.contains("almuerzo") {
            Self::Lunch
        } else if v.contains("cena") {
            Self::Dinner
        } else {
            Self::Other
        }
    }
}

/// One scheduled diet item. `time` is a display label and may be composite
/// ("DÍA 1 · Desayuno").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Meal {
    pub time: String,
    pub dish: String,
    pub description: String,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub category: MealCategory,
    #[serde(default)]
    pub completed: bool,
}

/// The full schedule. Wholesale-replaced on each parse/import; individual
/// meals are toggled in place and the whole plan re-persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DietPlan {
    pub name: String,
    pub schedule: Vec<Meal>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}
