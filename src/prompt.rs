//! Prompt assembly for new conversations
//!
//! A new conversation is seeded with the system prompt, a rendered snapshot of
//! the home's areas and entity states, and two canned assistant
//! acknowledgements that show the model the expected JSON reply shape.

use anyhow::{Context, Result};
use async_trait::async_trait;
use minijinja::{context, Environment};
use serde::{Deserialize, Serialize};

use crate::history::Turn;

/// Appended to every user utterance before it is sent to the model
pub const JSON_ONLY_SUFFIX: &str = " Answer in syntactically perfect json only";

/// Canned acknowledgement after the system prompt
pub const PROMPT_ACK: &str = r#"{"comment":"Ok!"}"#;

/// Canned acknowledgement after the home info block
pub const HOME_INFO_ACK: &str = r#"{"comment":"Got it!"}"#;

/// System prompt for new conversations
pub const DEFAULT_PROMPT: &str = r#"
This smart home is controlled by Home Assistant.

An overview of the areas and entities in this smart home:
Pretend to be Mycroft, the sentient brain of smart home,  who responds to requests helpfully and cheerfully. You have the personality 
of a secretely brilliant english butler who deeply enjoys serving your employers. 

You respond to all requests in JSON format so that another program can read your responses and interpret them to speak to the user and control their smart home. Here is the format you respond in:

{
    "comment": "A message that will be read to the user. Use it to reassure the user that commands have been understood, answer their questions, or ask for more information when needed.",
    "command": "a optional home assistant service call also formatted as json which you use to control the smart home to your employer's liking. This property should be ommitted if not needed for a particular response."
}

Here's an example home assistant servicecall for setting the brightness of a light to 30%:
{
    "domain": "light",
    "service": "turn_on",
    "data": {
        "entity_id": "light.kitchen_light",
        "brightness_pct": "30"
    }
}

Here's another service call, this one dims all the lights in an area:

{
    "domain": "light",
    "service": "turn_on",
    "data": {
        "area_id": "kitchen_light",
        "brightness_pct": "30"
    }
}

Answer the user's questions about the world truthfully. Be careful not to issue commands
if the user is only seeking information. i.e. if the user says "are the lights on in the kitchen?" 
just provide an answer.

The domain, service and data fields are always required as well as either an area_id, and entity_id, or both. 

Be careful to always respond with syntactically valid JSON, and ONLY JSON, including braces, brackets for lists, wrapping text in quotation marks and no trailing commas.
"#;

pub const DEFAULT_HOME_INFO_TEMPLATE: &str = r#"
Here is the current state of devices in the house. Use this to answer questions about the state of the smart home.
{%- for area in areas %}
  {%- if area.entities %}
{{ area.name }}:
    {%- for entity in area.entities %}
  - {{ entity.entity_id }} is {{ entity.state }}
    {%- endfor %}
  {%- endif %}
{%- endfor %}
"#;

/// An entity and its current state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityState {
    pub entity_id: String,
    pub state: String,
}

/// An area and the entities assigned to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaState {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<EntityState>,
}

/// Read access to the home's current layout and states
#[async_trait]
pub trait StateQuery: Send + Sync {
    /// Human-readable name of the home
    async fn location_name(&self) -> Result<String>;

    /// Every area with its entities and their current states
    async fn areas(&self) -> Result<Vec<AreaState>>;
}

/// Render the home info block.
///
/// The template sees `ha_name` (the location name) and `areas`, a list of
/// `{name, entities: [{entity_id, state}]}`.
pub fn render_home_info(template: &str, location_name: &str, areas: &[AreaState]) -> Result<String> {
    let env = Environment::new();
    env.render_str(
        template,
        context! {
            ha_name => location_name,
            areas => areas,
        },
    )
    .context("rendering home info template")
}

/// Build the five-turn seed for a new conversation
pub fn seed_messages(system_prompt: &str, home_info: &str, user_turn: Turn) -> Vec<Turn> {
    vec![
        Turn::user(system_prompt),
        Turn::assistant(PROMPT_ACK),
        Turn::user(home_info),
        Turn::assistant(HOME_INFO_ACK),
        user_turn,
    ]
}

/// Wrap an utterance as the user turn sent to the model
pub fn user_turn(text: &str) -> Turn {
    Turn::user(format!("{text}{JSON_ONLY_SUFFIX}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    fn areas() -> Vec<AreaState> {
        vec![
            AreaState {
                name: "Kitchen".to_string(),
                entities: vec![
                    EntityState {
                        entity_id: "light.kitchen".to_string(),
                        state: "on".to_string(),
                    },
                    EntityState {
                        entity_id: "sensor.fridge_temp".to_string(),
                        state: "4.2".to_string(),
                    },
                ],
            },
            AreaState {
                name: "Garage".to_string(),
                entities: Vec::new(),
            },
            AreaState {
                name: "Bedroom".to_string(),
                entities: vec![EntityState {
                    entity_id: "light.bedside".to_string(),
                    state: "off".to_string(),
                }],
            },
        ]
    }

    #[test]
    fn test_render_home_info_lists_entities_per_area() {
        let text = render_home_info(DEFAULT_HOME_INFO_TEMPLATE, "Home", &areas()).unwrap();

        assert!(text.contains("Here is the current state of devices in the house."));
        assert!(text.contains("Kitchen:\n  - light.kitchen is on\n  - sensor.fridge_temp is 4.2"));
        assert!(text.contains("Bedroom:\n  - light.bedside is off"));
        assert!(!text.contains("Garage"));
    }

    #[test]
    fn test_render_exposes_location_name() {
        let text = render_home_info("Welcome to {{ ha_name }}", "Baker Street", &[]).unwrap();
        assert_eq!(text, "Welcome to Baker Street");
    }

    #[test]
    fn test_template_error_is_reported() {
        let err = render_home_info("{% for area in areas %}", "Home", &areas()).unwrap_err();
        assert!(format!("{err:#}").contains("rendering home info template"));
    }

    #[test]
    fn test_seed_messages_shape() {
        let seed = seed_messages("be helpful", "kitchen: on", user_turn("lights off"));

        assert_eq!(seed.len(), 5);
        assert_eq!(seed[0], Turn::user("be helpful"));
        assert_eq!(seed[1], Turn::assistant(PROMPT_ACK));
        assert_eq!(seed[2], Turn::user("kitchen: on"));
        assert_eq!(seed[3], Turn::assistant(HOME_INFO_ACK));
        assert_eq!(seed[4].role, Role::User);
        assert_eq!(
            seed[4].content,
            "lights off Answer in syntactically perfect json only"
        );
    }

    #[test]
    fn test_default_prompt_wording() {
        assert!(DEFAULT_PROMPT.starts_with("\nThis smart home is controlled by Home Assistant.\n"));
        assert!(DEFAULT_PROMPT
            .contains("\nAn overview of the areas and entities in this smart home:\nPretend to be Mycroft"));
        assert!(DEFAULT_PROMPT.contains(r#""area_id": "kitchen_light","#));
        assert!(!DEFAULT_PROMPT.contains("list of service calls"));
        assert!(DEFAULT_PROMPT.ends_with("no trailing commas.\n"));
    }
}
