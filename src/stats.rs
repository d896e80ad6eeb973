use std::collections::HashMap;

use crate::models::diary::DiaryEntry;
use crate::models::diet::DietPlan;

/// How often each emotion word appears across the diary, most frequent
/// first, capped at `top_n`. The `emotions` field is free text; words are
/// split on commas and whitespace, and short connectives are skipped.
pub fn emotion_frequencies(entries: &[DiaryEntry], top_n: usize) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for entry in entries {
        for word in entry.emotions.split([',', ' ']) {
            let word = word.trim().to_lowercase();
            if word.chars().count() > 2 {
                *counts.entry(word).or_insert(0) += 1;
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(top_n);
    ranked
}

/// Completed and total meal counts for the current plan.
pub fn meal_completion(plan: &DietPlan) -> (usize, usize) {
    let completed = plan.schedule.iter().filter(|m| m.completed).count();
    (completed, plan.schedule.len())
}
