//! Simulated student personas and the preset sets used for calibration.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Ability marker for the pure-guessing baseline persona.
pub const RANDOM_BASELINE_THETA: f64 = -999.0;

#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("unknown persona set: {0}")]
    UnknownSet(String),
    #[error("persona has an empty id")]
    EmptyId,
    #[error("duplicate persona id: {0}")]
    DuplicateId(String),
    #[error("persona {id}: temperature {temperature} outside [0, 2]")]
    Temperature { id: String, temperature: f32 },
    #[error("persona {0}: empty system prompt")]
    EmptyPrompt(String),
    #[error("persona set {0} has no personas")]
    EmptySet(String),
    #[error("invalid persona category: {0}")]
    Category(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersonaCategory {
    AbilityBased,
    Kli,
    Misconception,
    Custom,
}

impl PersonaCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            PersonaCategory::AbilityBased => "ability_based",
            PersonaCategory::Kli => "kli",
            PersonaCategory::Misconception => "misconception",
            PersonaCategory::Custom => "custom",
        }
    }
}

impl FromStr for PersonaCategory {
    type Err = PersonaError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ability_based" => Ok(PersonaCategory::AbilityBased),
            "kli" => Ok(PersonaCategory::Kli),
            "misconception" => Ok(PersonaCategory::Misconception),
            "custom" => Ok(PersonaCategory::Custom),
            other => Err(PersonaError::Category(other.to_string())),
        }
    }
}

impl fmt::Display for PersonaCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_temperature() -> f32 {
    0.3
}

fn default_category() -> PersonaCategory {
    PersonaCategory::Custom
}

/// A simulated student profile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Persona {
    pub id: String,
    pub name: String,
    /// IRT-style ability, roughly -3..+3. [`RANDOM_BASELINE_THETA`] marks the
    /// random-guessing baseline.
    pub theta: f64,
    #[serde(default)]
    pub description: Option<String>,
    pub system_prompt: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_category")]
    pub category: PersonaCategory,
}

impl Persona {
    pub fn is_random_baseline(&self) -> bool {
        self.theta == RANDOM_BASELINE_THETA
    }

    pub fn validate(&self) -> Result<(), PersonaError> {
        if self.id.trim().is_empty() {
            return Err(PersonaError::EmptyId);
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(PersonaError::Temperature {
                id: self.id.clone(),
                temperature: self.temperature,
            });
        }
        if self.system_prompt.trim().is_empty() {
            return Err(PersonaError::EmptyPrompt(self.id.clone()));
        }
        Ok(())
    }

    /// Persona whose prompt describes a knowledge state.
    pub fn knowledge_state(
        id: impl Into<String>,
        name: impl Into<String>,
        theta: f64,
        mastered: &[&str],
        confused: &[&str],
        unknown: &[&str],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            theta,
            description: None,
            system_prompt: knowledge_state_prompt(mastered, confused, unknown),
            temperature: 0.5,
            category: PersonaCategory::Kli,
        }
    }

    /// Persona whose prompt lists incorrect beliefs it should act on.
    pub fn misconception(
        id: impl Into<String>,
        name: impl Into<String>,
        theta: f64,
        beliefs: &[Misconception],
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            theta,
            description: None,
            system_prompt: misconception_prompt(beliefs),
            temperature: 0.5,
            category: PersonaCategory::Misconception,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Misconception {
    pub concept: String,
    pub incorrect_belief: String,
}

const ANSWER_FORMAT: &str = "Provide your answer as a single letter (A, B, C, or D).";

/// System prompt for a knowledge-state persona. Empty lists are omitted.
pub fn knowledge_state_prompt(mastered: &[&str], confused: &[&str], unknown: &[&str]) -> String {
    let mut prompt = String::from("You are a student with the following knowledge state:\n\n");

    if !mastered.is_empty() {
        prompt.push_str(&format!(
            "You UNDERSTAND these concepts well: {}\n",
            mastered.join(", ")
        ));
    }
    if !confused.is_empty() {
        prompt.push_str(&format!(
            "You are CONFUSED about these concepts and often make mistakes with them: {}\n",
            confused.join(", ")
        ));
    }
    if !unknown.is_empty() {
        prompt.push_str(&format!(
            "You have NOT LEARNED these concepts yet: {}\n",
            unknown.join(", ")
        ));
    }

    prompt.push_str(
        "\nAnswer the question based on your current knowledge state. \
         If you don't know something, make your best guess. ",
    );
    prompt.push_str(ANSWER_FORMAT);
    prompt
}

pub fn misconception_prompt(beliefs: &[Misconception]) -> String {
    let mut prompt = String::from(
        "You are a student who has some incorrect beliefs. You believe the following:\n\n",
    );
    for m in beliefs {
        prompt.push_str(&format!("- About {}: {}\n", m.concept, m.incorrect_belief));
    }
    prompt.push_str(
        "\nAnswer the question based on your beliefs, even if they lead you to the wrong answer. ",
    );
    prompt.push_str(ANSWER_FORMAT);
    prompt
}

// =============================================================================
// PRESETS
// =============================================================================

struct Preset {
    id: &'static str,
    name: &'static str,
    theta: f64,
    description: &'static str,
    system_prompt: &'static str,
    temperature: f32,
}

const ABILITY_PRESETS: &[Preset] = &[
    Preset {
        id: "expert",
        name: "Expert",
        theta: 2.5,
        description: "Deep understanding, rarely makes mistakes",
        system_prompt: "You are an expert with deep understanding of this subject. \
            Answer this multiple choice question correctly. Think step-by-step, \
            then provide your answer as a single letter (A, B, C, or D).",
        temperature: 0.1,
    },
    Preset {
        id: "proficient",
        name: "Proficient",
        theta: 1.0,
        description: "Good student, occasional careless errors",
        system_prompt: "You are a good student who usually understands the material well. \
            You occasionally make careless mistakes or have small gaps in knowledge. \
            Answer this question based on your understanding. \
            Provide your answer as a single letter (A, B, C, or D).",
        temperature: 0.3,
    },
    Preset {
        id: "developing",
        name: "Developing",
        theta: 0.0,
        description: "Average student, struggles with harder material",
        system_prompt: "You are an average student. You understand the basics but struggle \
            with harder concepts. You sometimes confuse similar ideas or forget details. \
            Answer this question as best you can. \
            Provide your answer as a single letter (A, B, C, or D).",
        temperature: 0.5,
    },
    Preset {
        id: "struggling",
        name: "Struggling",
        theta: -1.0,
        description: "Significant knowledge gaps, common misconceptions",
        system_prompt: "You are a struggling student with significant gaps in your knowledge. \
            You often misremember facts and frequently fall for common misconceptions. \
            Pick the answer that seems most right to you. \
            Provide your answer as a single letter (A, B, C, or D).",
        temperature: 0.7,
    },
    Preset {
        id: "novice",
        name: "Novice",
        theta: -2.0,
        description: "Beginner, mostly guessing",
        system_prompt: "You are a complete beginner who just started learning this topic. \
            You have minimal knowledge and often have to guess based on what sounds \
            familiar or makes intuitive sense. Make your best guess. \
            Provide your answer as a single letter (A, B, C, or D).",
        temperature: 0.9,
    },
    Preset {
        id: "random",
        name: "Random Baseline",
        theta: RANDOM_BASELINE_THETA,
        description: "Pure random guessing (25% expected)",
        system_prompt: "Select one answer at random: A, B, C, or D. Do not think or reason. \
            Just pick one randomly.",
        temperature: 1.0,
    },
];

impl From<&Preset> for Persona {
    fn from(p: &Preset) -> Self {
        Persona {
            id: p.id.to_string(),
            name: p.name.to_string(),
            theta: p.theta,
            description: Some(p.description.to_string()),
            system_prompt: p.system_prompt.to_string(),
            temperature: p.temperature,
            category: PersonaCategory::AbilityBased,
        }
    }
}

/// All built-in ability personas, strongest first, random baseline last.
pub fn ability_personas() -> Vec<Persona> {
    ABILITY_PRESETS.iter().map(Persona::from).collect()
}

pub fn preset_persona(id: &str) -> Option<Persona> {
    ABILITY_PRESETS.iter().find(|p| p.id == id).map(Persona::from)
}

/// A named group of personas swept together.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonaSet {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub personas: Vec<Persona>,
}

impl PersonaSet {
    pub fn validate(&self) -> Result<(), PersonaError> {
        if self.personas.is_empty() {
            return Err(PersonaError::EmptySet(self.id.clone()));
        }
        let mut seen = HashSet::new();
        for p in &self.personas {
            p.validate()?;
            if !seen.insert(p.id.as_str()) {
                return Err(PersonaError::DuplicateId(p.id.clone()));
            }
        }
        Ok(())
    }

    /// Load a custom set from JSON: either a full set object or a bare array
    /// of personas.
    pub fn from_json(json: &str) -> Result<Self, PersonaError> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Shape {
            Set(PersonaSet),
            List(Vec<Persona>),
        }

        let set = match serde_json::from_str::<Shape>(json)? {
            Shape::Set(s) => s,
            Shape::List(personas) => PersonaSet {
                id: "custom".to_string(),
                name: "Custom".to_string(),
                description: String::new(),
                personas,
            },
        };
        set.validate()?;
        Ok(set)
    }
}

pub const PERSONA_SET_IDS: [&str; 3] = ["standard-ability", "full-ability", "minimal"];

pub fn persona_set(id: &str) -> Result<PersonaSet, PersonaError> {
    let all = ability_personas();
    let (name, description, personas): (&str, &str, Vec<Persona>) = match id {
        "standard-ability" => (
            "Standard Ability Levels",
            "5 personas from expert to novice based on IRT ability parameter",
            all.into_iter().filter(|p| !p.is_random_baseline()).collect(),
        ),
        "full-ability" => (
            "Full Ability Set with Random Baseline",
            "6 personas including random guessing baseline for validation",
            all,
        ),
        "minimal" => (
            "Minimal Test Set",
            "3 personas (expert, developing, novice) for quick calibration",
            all.into_iter()
                .filter(|p| matches!(p.id.as_str(), "expert" | "developing" | "novice"))
                .collect(),
        ),
        other => return Err(PersonaError::UnknownSet(other.to_string())),
    };

    Ok(PersonaSet {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        personas,
    })
}

/// `(id, name, persona count)` for every preset set.
pub fn list_persona_sets() -> Vec<(String, String, usize)> {
    PERSONA_SET_IDS
        .iter()
        .filter_map(|id| persona_set(id).ok())
        .map(|s| (s.id, s.name, s.personas.len()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(set: &PersonaSet) -> Vec<&str> {
        set.personas.iter().map(|p| p.id.as_str()).collect()
    }

    #[test]
    fn preset_sets() {
        let standard = persona_set("standard-ability").unwrap();
        assert_eq!(
            ids(&standard),
            vec!["expert", "proficient", "developing", "struggling", "novice"]
        );

        let full = persona_set("full-ability").unwrap();
        assert_eq!(full.personas.len(), 6);
        assert!(full.personas[5].is_random_baseline());

        let minimal = persona_set("minimal").unwrap();
        assert_eq!(ids(&minimal), vec!["expert", "developing", "novice"]);

        assert!(matches!(
            persona_set("nope"),
            Err(PersonaError::UnknownSet(_))
        ));
    }

    #[test]
    fn preset_parameters() {
        let expert = preset_persona("expert").unwrap();
        assert_eq!(expert.theta, 2.5);
        assert!((expert.temperature - 0.1).abs() < 1e-6);
        let novice = preset_persona("novice").unwrap();
        assert_eq!(novice.theta, -2.0);
        assert!((novice.temperature - 0.9).abs() < 1e-6);
        assert!(ability_personas().iter().all(|p| p.validate().is_ok()));
    }

    #[test]
    fn list_sets_counts() {
        let sets = list_persona_sets();
        let counts: Vec<usize> = sets.iter().map(|s| s.2).collect();
        assert_eq!(counts, vec![5, 6, 3]);
    }

    #[test]
    fn knowledge_state_prompt_omits_empty_sections() {
        let p = knowledge_state_prompt(&["loops", "recursion"], &[], &["closures"]);
        assert!(p.contains("You UNDERSTAND these concepts well: loops, recursion\n"));
        assert!(!p.contains("CONFUSED"));
        assert!(p.contains("NOT LEARNED these concepts yet: closures"));
        assert!(p.ends_with("(A, B, C, or D)."));

        let persona = Persona::knowledge_state("k1", "KLI", 0.0, &["a"], &["b"], &[]);
        assert_eq!(persona.category, PersonaCategory::Kli);
        assert!(persona.validate().is_ok());
    }

    #[test]
    fn misconception_prompt_lists_beliefs() {
        let p = misconception_prompt(&[Misconception {
            concept: "division".into(),
            incorrect_belief: "dividing always makes numbers smaller".into(),
        }]);
        assert!(p.contains("- About division: dividing always makes numbers smaller\n"));
    }

    #[test]
    fn custom_set_from_json() {
        let json = r#"[
            {"id": "a", "name": "A", "theta": 1.0, "system_prompt": "be a"},
            {"id": "b", "name": "B", "theta": -1.0, "system_prompt": "be b", "temperature": 1.5, "category": "kli"}
        ]"#;
        let set = PersonaSet::from_json(json).unwrap();
        assert_eq!(set.id, "custom");
        assert!((set.personas[0].temperature - 0.3).abs() < 1e-6);
        assert_eq!(set.personas[0].category, PersonaCategory::Custom);
        assert_eq!(set.personas[1].category, PersonaCategory::Kli);
    }

    #[test]
    fn custom_set_validation() {
        let hot = r#"[{"id": "a", "name": "A", "theta": 0, "system_prompt": "x", "temperature": 2.5}]"#;
        assert!(matches!(
            PersonaSet::from_json(hot),
            Err(PersonaError::Temperature { .. })
        ));

        let dup = r#"{"id": "s", "name": "S", "personas": [
            {"id": "a", "name": "A", "theta": 0, "system_prompt": "x"},
            {"id": "a", "name": "A2", "theta": 1, "system_prompt": "y"}
        ]}"#;
        assert!(matches!(
            PersonaSet::from_json(dup),
            Err(PersonaError::DuplicateId(_))
        ));

        assert!(matches!(
            PersonaSet::from_json("[]"),
            Err(PersonaError::EmptySet(_))
        ));
    }
}
