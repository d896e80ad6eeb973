use std::sync::OnceLock;

use regex::Regex;

use crate::models::diet::{DietPlan, Meal, MealCategory};

/// Labels that open a meal block in prescribed diet text.
const MEAL_KEYWORDS: &[&str] = &[
    "desayuno", "comida", "cena", "colación", "colacion", "snack", "almuerzo",
];

fn day_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)D[IÍ]A\s*\d+").expect("valid day-header pattern"))
}

fn decorative_header() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)^⚡|^🔥|^SEMANA").expect("valid header pattern"))
}

fn is_meal_label(line: &str) -> bool {
    let normalized = line.replace(':', "");
    let normalized = normalized.trim().to_lowercase();
    MEAL_KEYWORDS
        .iter()
        .any(|k| normalized == *k || normalized.starts_with(&format!("{k} ")))
}

fn flush_meal(schedule: &mut Vec<Meal>, day: &str, label: &mut String, lines: &mut Vec<String>) {
    if label.is_empty() || lines.is_empty() {
        return;
    }
    let description = lines
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let dish = lines.first().cloned().unwrap_or_else(|| description.clone());
    let ingredients: Vec<String> = description
        .split([',', '+'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    let time = if day.is_empty() {
        label.clone()
    } else {
        format!("{day} · {label}")
    };
    schedule.push(Meal {
        time,
        dish,
        description: description.clone(),
        category: MealCategory::from_label(label),
        ingredients: if ingredients.is_empty() {
            vec![description]
        } else {
            ingredients
        },
        completed: false,
    });

    label.clear();
    lines.clear();
}

/// Deterministic parser for structured plain-text diets of the
/// "DÍA n / Desayuno: ..." form. Returns `None` when nothing recognizable is
/// found, letting the caller fall back to the generative parser.
pub fn parse_structured_diet(text: &str) -> Option<DietPlan> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.is_empty() {
        return None;
    }

    let mut schedule = Vec::new();
    let mut current_day = String::new();
    let mut current_label = String::new();
    let mut current_lines: Vec<String> = Vec::new();

    for line in lines {
        if let Some(day) = day_header().find(line) {
            flush_meal(&mut schedule, &current_day, &mut current_label, &mut current_lines);
            current_day = day.as_str().to_uppercase();
            continue;
        }

        if is_meal_label(line) {
            flush_meal(&mut schedule, &current_day, &mut current_label, &mut current_lines);
            current_label = line.replace(':', "").trim().to_string();
            continue;
        }

        // Week banners and decorative separators end the current block.
        if decorative_header().is_match(line) {
            flush_meal(&mut schedule, &current_day, &mut current_label, &mut current_lines);
            continue;
        }

        if !current_label.is_empty() {
            current_lines.push(line.to_string());
        }
    }

    flush_meal(&mut schedule, &current_day, &mut current_label, &mut current_lines);

    if schedule.is_empty() {
        return None;
    }

    Some(DietPlan {
        name: "Plan nutricional personalizado".into(),
        schedule,
        recommendations: vec![
            "Mantén buena hidratación durante el día.".into(),
            "Ajusta porciones con tu especialista según evolución.".into(),
        ],
    })
}
