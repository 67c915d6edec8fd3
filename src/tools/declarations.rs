//! The fixed list of callable tool specifications.
//!
//! These are passed verbatim into the duplex connection's setup message;
//! the session core never interprets them.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// One callable tool: name, description, and a typed parameter schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDeclaration {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

fn decl(name: &str, description: &str, parameters: Value) -> ToolDeclaration {
    ToolDeclaration {
        name: name.to_string(),
        description: description.to_string(),
        parameters,
    }
}

/// The assistant's built-in tool surface.
pub fn default_declarations() -> Vec<ToolDeclaration> {
    vec![
        decl(
            "performGoogleSearch",
            "Gets up-to-date information from web search for queries about recent events, news, or trending information.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "query": {"type": "STRING", "description": "The search query."}
                },
                "required": ["query"]
            }),
        ),
        decl(
            "findPlacesOnMap",
            "Finds places on a map based on a query. Useful for geography or place-related questions.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "query": {"type": "STRING", "description": "The query to search for (e.g., \"good italian restaurants\")."}
                },
                "required": ["query"]
            }),
        ),
        decl(
            "performComplexTask",
            "Handles complex queries requiring advanced reasoning, coding, math, or STEM knowledge using a powerful model with an extended thinking budget.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "prompt": {"type": "STRING", "description": "The complex prompt or question to process."}
                },
                "required": ["prompt"]
            }),
        ),
        decl(
            "performSimpleTask",
            "Handles simple tasks that require a very fast, low-latency response, such as quick summarizations or simple Q&A.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "prompt": {"type": "STRING", "description": "The simple prompt for a quick task."}
                },
                "required": ["prompt"]
            }),
        ),
        decl(
            "setReminder",
            "Sets a reminder for the user. The assistant will speak the reminder text back after the specified duration.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "duration": {"type": "NUMBER", "description": "The amount of time until the reminder."},
                    "unit": {"type": "STRING", "description": "The unit of time (\"seconds\", \"minutes\", \"hours\")."},
                    "reminderText": {"type": "STRING", "description": "The text of the reminder to speak."}
                },
                "required": ["duration", "unit", "reminderText"]
            }),
        ),
        decl(
            "getCurrentTime",
            "Gets the current local time.",
            json!({"type": "OBJECT", "properties": {}, "required": []}),
        ),
        decl(
            "setReminderAtTime",
            "Sets a reminder for the user at a specific time of day, in 24-hour HH:MM format.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "time": {"type": "STRING", "description": "The time in 24-hour HH:MM format (e.g., \"14:30\")."},
                    "reminderText": {"type": "STRING", "description": "The text of the reminder to speak."}
                },
                "required": ["time", "reminderText"]
            }),
        ),
        decl(
            "openApplication",
            "Opens an application installed on the user's device.",
            json!({
                "type": "OBJECT",
                "properties": {
                    "appName": {"type": "STRING", "description": "The name of the application to open."}
                },
                "required": ["appName"]
            }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declarations_cover_the_builtin_surface() {
        let names: Vec<String> = default_declarations().into_iter().map(|d| d.name).collect();
        for expected in [
            "performGoogleSearch",
            "findPlacesOnMap",
            "performComplexTask",
            "performSimpleTask",
            "setReminder",
            "getCurrentTime",
            "setReminderAtTime",
            "openApplication",
        ] {
            assert!(names.contains(&expected.to_string()), "missing {expected}");
        }
    }

    #[test]
    fn declarations_serialize_camel_case() {
        let v = serde_json::to_value(default_declarations()).unwrap();
        assert!(v[0]["parameters"]["properties"]["query"].is_object());
        assert_eq!(v[0]["name"], "performGoogleSearch");
    }
}
