use std::time::Duration;

use serde_json::{json, Value};

use crate::error::{AppError, AppResult};
use crate::models::diary::DiaryEntry;
use crate::models::diet::{DietPlan, Meal, MealCategory};
use crate::parser::parse_structured_diet;

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";

const INSIGHT_SYSTEM_INSTRUCTION: &str = "You are a warm, supportive psychologist specializing \
     in Cognitive Behavioral Therapy. Keep insights under 100 words.";

const INSIGHT_FALLBACK: &str = "Gracias por compartir esto conmigo. Estoy aquí para escucharte.";

/// Client for the generative text service: parses free-text diet
/// prescriptions into structured plans and enriches diary entries with a
/// short supportive insight.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
}

impl GeminiClient {
    pub fn new(api_key: String, model: String) -> AppResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            api_key,
            model,
            base_url: GEMINI_BASE_URL.to_string(),
        })
    }

    /// Overrides the base URL (for testing with wiremock).
    #[cfg(test)]
    pub fn with_base_url(mut self, url: String) -> Self {
        self.base_url = url;
        self
    }

    async fn generate(&self, body: Value) -> AppResult<String> {
        let url = format!(
            "{}/v1beta/models/{}:generateContent",
            self.base_url, self.model
        );
        let response = self
            .http
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;

        let text = response["candidates"][0]["content"]["parts"][0]["text"]
            .as_str()
            .unwrap_or("")
            .to_string();
        Ok(text)
    }

    /// Turns free-form prescribed diet text into a structured plan.
    ///
    /// Standard "DÍA n / Desayuno: ..." layouts are handled by the
    /// deterministic parser without a network call; only sparse or unusual
    /// text goes to the model. An unusable model response is the one error
    /// the user sees directly — they retry with clearer input.
    pub async fn parse_diet_text(&self, text: &str) -> AppResult<DietPlan> {
        if let Some(plan) = parse_structured_diet(text) {
            if plan.schedule.len() > 5 {
                return Ok(plan);
            }
        }

        let prompt = format!(
            "Analyze this doctor-prescribed diet text and organize it into a structured meal \
             schedule with dishes and ingredients. Assign a 'category' to each meal (breakfast, \
             snack, lunch, dinner, or other). If some information is missing, use your expert \
             knowledge to suggest balanced dishes that align with the provided guidelines.\n\n\
             Text: {text}"
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": {
                    "type": "OBJECT",
                    "properties": {
                        "name": { "type": "STRING" },
                        "schedule": {
                            "type": "ARRAY",
                            "items": {
                                "type": "OBJECT",
                                "properties": {
                                    "time": { "type": "STRING" },
                                    "dish": { "type": "STRING" },
                                    "description": { "type": "STRING" },
                                    "category": {
                                        "type": "STRING",
                                        "description": "Must be one of: breakfast, snack, lunch, dinner, other"
                                    },
                                    "ingredients": { "type": "ARRAY", "items": { "type": "STRING" } }
                                },
                                "required": ["time", "dish", "description", "category"]
                            }
                        },
                        "recommendations": { "type": "ARRAY", "items": { "type": "STRING" } }
                    },
                    "required": ["name", "schedule"]
                }
            }
        });

        let raw = self.generate(body).await?;
        let parsed: Value = serde_json::from_str(&raw).map_err(|e| {
            tracing::error!(error = %e, "Diet response was not valid JSON");
            AppError::DietParse(
                "intenta pegarla con un formato más claro (ej: Desayuno: ...)".into(),
            )
        })?;
        Ok(normalize_plan(&parsed))
    }

    /// Produces a brief, empathetic insight for a diary entry. Runs after the
    /// optimistic local save, so the entry is visible before this resolves.
    pub async fn diary_insight(&self, entry: &DiaryEntry) -> AppResult<String> {
        let prompt = format!(
            "As a supportive psychological companion, analyze this diary entry (in Spanish) and \
             provide a brief, warm, and empathetic insight. Focus on helping the user identify \
             cognitive distortions in their automatic thoughts.\n\n\
             Situación: {}\nEmociones: {}\nPensamientos: {}",
            entry.situation, entry.emotions, entry.automatic_thoughts
        );
        let body = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
            "systemInstruction": { "parts": [{ "text": INSIGHT_SYSTEM_INSTRUCTION }] }
        });

        let text = self.generate(body).await?;
        if text.trim().is_empty() {
            return Ok(INSIGHT_FALLBACK.to_string());
        }
        Ok(text)
    }
}

/// Normalizes a model-produced plan, filling defaults for whatever the model
/// left out rather than rejecting the response.
fn normalize_plan(parsed: &Value) -> DietPlan {
    let schedule = parsed["schedule"]
        .as_array()
        .map(|meals| meals.iter().map(normalize_meal).collect())
        .unwrap_or_default();
    let recommendations = parsed["recommendations"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    DietPlan {
        name: parsed["name"]
            .as_str()
            .unwrap_or("Plan nutricional generado")
            .to_string(),
        schedule,
        recommendations,
    }
}

/// The model is asked for English category names, but occasionally echoes the
/// source text's Spanish labels back; accept either before giving up.
fn parse_category(label: &str) -> MealCategory {
    match serde_json::from_value(Value::String(label.to_lowercase())) {
        Ok(category) if category != MealCategory::Other => category,
        _ => MealCategory::from_label(label),
    }
}

fn normalize_meal(meal: &Value) -> Meal {
    let dish = meal["dish"].as_str().unwrap_or("Comida sugerida").to_string();
    let ingredients: Vec<String> = meal["ingredients"]
        .as_array()
        .map(|items| {
            items
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default();
    Meal {
        time: meal["time"].as_str().unwrap_or("Sin horario").to_string(),
        description: meal["description"]
            .as_str()
            .map(str::to_string)
            .unwrap_or_else(|| dish.clone()),
        category: meal["category"]
            .as_str()
            .map(parse_category)
            .unwrap_or_default(),
        ingredients: if ingredients.is_empty() {
            vec![if dish.is_empty() {
                "Ingrediente no especificado".to_string()
            } else {
                dish.clone()
            }]
        } else {
            ingredients
        },
        dish,
        completed: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> GeminiClient {
        GeminiClient::new("test-key".into(), "test-model".into())
            .unwrap()
            .with_base_url(server.uri())
    }

    fn gemini_reply(text: &str) -> Value {
        json!({
            "candidates": [{
                "content": { "parts": [{ "text": text }] }
            }]
        })
    }

    #[tokio::test]
    async fn structured_text_never_reaches_the_model() {
        let server = MockServer::start().await;
        // No mocks mounted: any request would 404 and surface as an error.
        let text = "DÍA 1\nDesayuno\nAvena, leche\nColación\nManzana\nComida\nPollo, arroz\n\
                    Cena\nSopa\nDÍA 2\nDesayuno\nHuevos\nComida\nPescado";
        let plan = client(&server).parse_diet_text(text).await.unwrap();
        assert!(plan.schedule.len() > 5);
        assert_eq!(plan.schedule[0].category, MealCategory::Breakfast);
    }

    #[tokio::test]
    async fn sparse_text_is_parsed_by_the_model() {
        let server = MockServer::start().await;
        let reply = json!({
            "name": "Plan ligero",
            "schedule": [
                { "time": "08:00", "dish": "Avena", "description": "Avena con fruta",
                  "category": "breakfast", "ingredients": ["Avena", "fruta"] },
                { "time": "14:00", "dish": "Pollo", "category": "brunch" }
            ],
            "recommendations": ["Hidratación"]
        });
        Mock::given(method("POST"))
            .and(path("/v1beta/models/test-model:generateContent"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply(&reply.to_string())),
            )
            .mount(&server)
            .await;

        let plan = client(&server)
            .parse_diet_text("come sano y ligero")
            .await
            .unwrap();
        assert_eq!(plan.name, "Plan ligero");
        assert_eq!(plan.schedule.len(), 2);
        assert_eq!(plan.schedule[0].category, MealCategory::Breakfast);
        // Missing fields filled with defaults, unknown category mapped to Other.
        assert_eq!(plan.schedule[1].category, MealCategory::Other);
        assert_eq!(plan.schedule[1].description, "Pollo");
        assert_eq!(plan.schedule[1].ingredients, vec!["Pollo"]);
        assert_eq!(plan.recommendations, vec!["Hidratación"]);
    }

    #[tokio::test]
    async fn unparseable_model_output_is_a_user_facing_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("sorry, no JSON here")),
            )
            .mount(&server)
            .await;

        let err = client(&server)
            .parse_diet_text("come sano")
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::DietParse(_)));
    }

    #[tokio::test]
    async fn diary_insight_returns_model_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(gemini_reply("Una lectura más amable.")),
            )
            .mount(&server)
            .await;

        let entry = DiaryEntry::new("2024-01-01", "examen", "nervios", "voy a fallar");
        let insight = client(&server).diary_insight(&entry).await.unwrap();
        assert_eq!(insight, "Una lectura más amable.");
    }

    #[tokio::test]
    async fn empty_insight_falls_back_to_a_supportive_default() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(gemini_reply("  ")))
            .mount(&server)
            .await;

        let entry = DiaryEntry::new("2024-01-01", "s", "e", "t");
        let insight = client(&server).diary_insight(&entry).await.unwrap();
        assert_eq!(insight, INSIGHT_FALLBACK);
    }
}
