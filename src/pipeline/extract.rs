use serde::Deserialize;
use tracing::{debug, info};

use super::{complete_step, PipelineError, Step};
use crate::annotate::{annotate, LabeledPhrase, Segment};
use crate::llm::ChatBackend;
use crate::state::RunConfig;

/// Placeholder the extraction prompt asks the model to use for unknown fields.
const UNKNOWN: &str = "None";

/// JSON keys recognised on an event object, English and French.
const EVENT_KEYS: &[&str] = &["type", "location", "lieu", "date", "actor", "acteur"];

/// An event extracted from a report. Fields keep the model's text verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Event {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(alias = "lieu", default)]
    pub location: Option<String>,
    #[serde(default)]
    pub date: Option<String>,
    #[serde(alias = "acteur", default)]
    pub actor: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventField {
    Kind,
    Location,
    Date,
    Actor,
}

impl EventField {
    pub const ALL: [EventField; 4] = [
        EventField::Kind,
        EventField::Location,
        EventField::Date,
        EventField::Actor,
    ];

    /// Tag attached to annotated spans.
    pub fn label(self) -> &'static str {
        match self {
            EventField::Kind => "Event-type",
            EventField::Location => "Location",
            EventField::Date => "Date",
            EventField::Actor => "Actor",
        }
    }

    /// Column heading in the events table.
    pub fn heading(self) -> &'static str {
        match self {
            EventField::Kind => "Event type",
            EventField::Location => "Location",
            EventField::Date => "Date",
            EventField::Actor => "Actor",
        }
    }
}

impl Event {
    pub fn field(&self, field: EventField) -> Option<&str> {
        let value = match field {
            EventField::Kind => &self.kind,
            EventField::Location => &self.location,
            EventField::Date => &self.date,
            EventField::Actor => &self.actor,
        };
        value.as_deref()
    }

    /// Field value when it names something that can be found in the text.
    pub fn known(&self, field: EventField) -> Option<&str> {
        self.field(field)
            .map(str::trim)
            .filter(|v| !v.is_empty() && !v.eq_ignore_ascii_case(UNKNOWN))
    }
}

/// Outcome of an extraction run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extraction {
    pub events: Vec<Event>,
    pub segments: Vec<Segment>,
}

pub fn extraction_prompt(report: &str) -> String {
    format!(
        "Extraire les événements et leurs attributs suivants du texte : {report}\n\
         Veuillez fournir la sortie au format JSON valide avec des guillemets doubles. \
         Format JSON attendu : [{{\"type\": \"...\", \"lieu\": \"...\", \"date\": \"...\", \"acteur\": \"...\"}}]\n\
         Utilisez la chaîne \"{unknown}\" pour tout attribut inconnu. \
         Recopiez chaque attribut exactement tel qu'il apparaît dans le texte, sans reformuler. \
         Ne répondez qu'avec le tableau JSON.",
        report = report,
        unknown = UNKNOWN,
    )
}

/// Drop one surrounding markdown code fence, if the model added one.
fn strip_code_fence(response: &str) -> &str {
    let trimmed = response.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Skip the info string (e.g. "json") on the opening line.
    let body = rest.split_once('\n').map_or("", |(_, body)| body);
    body.trim_end().strip_suffix("```").unwrap_or(body).trim()
}

/// Parse the model's reply into events. The reply must be a JSON array whose
/// elements are objects carrying at least one of the event keys.
pub fn parse_events(response: &str) -> Result<Vec<Event>, PipelineError> {
    let body = strip_code_fence(response);
    let values: Vec<serde_json::Value> = serde_json::from_str(body).map_err(|e| {
        PipelineError::ExtractionParse(format!("response is not a JSON array: {}", e))
    })?;

    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| {
            let has_key = value
                .as_object()
                .is_some_and(|obj| EVENT_KEYS.iter().any(|k| obj.contains_key(*k)));
            if !has_key {
                return Err(PipelineError::ExtractionParse(format!(
                    "event {} lacks the expected keys: {}",
                    i + 1,
                    value
                )));
            }
            serde_json::from_value(value).map_err(|e| {
                PipelineError::ExtractionParse(format!("event {}: {}", i + 1, e))
            })
        })
        .collect()
}

/// Labeled phrases for every known field, event by event in column order.
pub fn event_phrases(events: &[Event]) -> Vec<LabeledPhrase> {
    events
        .iter()
        .flat_map(|event| {
            EventField::ALL.into_iter().filter_map(move |field| {
                event
                    .known(field)
                    .map(|value| LabeledPhrase::new(value, field.label()))
            })
        })
        .collect()
}

/// Ask the model for the report's events, then annotate the report with them.
pub async fn extract<B: ChatBackend>(
    backend: &B,
    report: &str,
    config: &RunConfig,
) -> Result<Extraction, PipelineError> {
    let prompt = extraction_prompt(report);
    let response = complete_step(
        backend,
        Step::Extraction,
        &prompt,
        Some(0.0),
        config.call_timeout(),
    )
    .await?;
    debug!(response_len = response.len(), "Extraction response received");

    let events = parse_events(&response)?;
    let phrases = event_phrases(&events);
    let segments = annotate(report, &phrases);

    info!(
        events = events.len(),
        phrases = phrases.len(),
        labeled = segments.iter().filter(|s| s.label().is_some()).count(),
        "Extraction complete"
    );
    Ok(Extraction { events, segments })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::testing::FakeBackend;

    const REPORT: &str = "Le 03-01-2024, des militaires taïwanais ont été arrêtés à Chiaotou.";

    #[test]
    fn test_parse_french_keys() {
        let events = parse_events(
            r#"[{"type": "arrestation", "lieu": "Chiaotou", "date": "03-01-2024", "acteur": "militaires taïwanais"}]"#,
        )
        .unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].location.as_deref(), Some("Chiaotou"));
        assert_eq!(events[0].actor.as_deref(), Some("militaires taïwanais"));
    }

    #[test]
    fn test_parse_english_keys_and_fence() {
        let response = "```json\n[{\"type\": \"patrol\", \"location\": \"Kinmen\", \"date\": null}]\n```";
        let events = parse_events(response).unwrap();
        assert_eq!(events[0].kind.as_deref(), Some("patrol"));
        assert_eq!(events[0].location.as_deref(), Some("Kinmen"));
        assert_eq!(events[0].date, None);
        assert_eq!(events[0].actor, None);
    }

    #[test]
    fn test_parse_empty_array() {
        assert!(parse_events("[]").unwrap().is_empty());
    }

    #[test]
    fn test_parse_rejects_prose() {
        let err = parse_events("Voici les événements : aucun.").unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionParse(_)));
        assert!(err.to_string().contains("not a JSON array"));
    }

    #[test]
    fn test_parse_rejects_object_without_keys() {
        let err = parse_events(r#"[{"evenement": "x"}]"#).unwrap_err();
        assert!(err.to_string().contains("event 1 lacks the expected keys"));
    }

    #[test]
    fn test_parse_rejects_non_string_field() {
        let err = parse_events(r#"[{"type": "tir", "date": 2024}]"#).unwrap_err();
        assert!(err.to_string().contains("event 1"));
    }

    #[test]
    fn test_phrases_skip_unknown_fields() {
        let events = vec![
            Event {
                kind: Some("arrestation".to_string()),
                location: Some("None".to_string()),
                date: Some("  ".to_string()),
                actor: Some("garde-côtes".to_string()),
            },
            Event {
                location: Some("Kinmen".to_string()),
                ..Event::default()
            },
        ];
        assert_eq!(
            event_phrases(&events),
            vec![
                LabeledPhrase::new("arrestation", "Event-type"),
                LabeledPhrase::new("garde-côtes", "Actor"),
                LabeledPhrase::new("Kinmen", "Location"),
            ]
        );
    }

    #[test]
    fn test_prompt_embeds_report() {
        let prompt = extraction_prompt(REPORT);
        assert!(prompt.contains(REPORT));
        assert!(prompt.contains("\"None\""));
        assert!(prompt.contains("[{\"type\": \"...\""));
    }

    #[tokio::test]
    async fn test_extract_annotates_report() {
        let backend = FakeBackend::new(|_| {
            Ok(r#"[{"type": "arrestation", "lieu": "Chiaotou", "date": "03-01-2024", "acteur": "Militaires taïwanais"}]"#.to_string())
        });

        let extraction = extract(&backend, REPORT, &RunConfig::default()).await.unwrap();

        assert_eq!(extraction.events.len(), 1);
        assert_eq!(*backend.temperatures.lock().unwrap(), vec![Some(0.0)]);

        let labeled: Vec<(&str, &str)> = extraction
            .segments
            .iter()
            .filter_map(|s| s.label().map(|l| (s.text(), l)))
            .collect();
        // "arrestation" never appears verbatim and is dropped.
        assert_eq!(
            labeled,
            vec![
                ("03-01-2024", "Date"),
                ("militaires taïwanais", "Actor"),
                ("Chiaotou", "Location"),
            ]
        );
        let joined: String = extraction.segments.iter().map(Segment::text).collect();
        assert_eq!(joined, REPORT);
    }

    #[tokio::test]
    async fn test_extract_parse_failure() {
        let backend = FakeBackend::new(|_| Ok("Désolé, je ne peux pas.".to_string()));
        let err = extract(&backend, REPORT, &RunConfig::default()).await.unwrap_err();
        assert!(matches!(err, PipelineError::ExtractionParse(_)));
    }
}
