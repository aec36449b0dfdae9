//! Externally owned records read by the router
//!
//! Actions, magic items and the watch configuration live in the local
//! datastore; pipelines and push actions come from the home server. The router
//! only reads them to build replies and service calls.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

use crate::wire::{Content, Value};

// ----------------------------------------------------------------------------
// Actions and Magic Items
// ----------------------------------------------------------------------------

/// User-configured action shortcut
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Action {
    pub id: String,
    pub name: String,
    pub server_id: String,
}

/// Kind of a magic item
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MagicItemKind {
    Action,
    Script,
    Scene,
    Entity,
    Folder,
}

impl MagicItemKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MagicItemKind::Action => "action",
            MagicItemKind::Script => "script",
            MagicItemKind::Scene => "scene",
            MagicItemKind::Entity => "entity",
            MagicItemKind::Folder => "folder",
        }
    }
}

impl FromStr for MagicItemKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "action" => Ok(MagicItemKind::Action),
            "script" => Ok(MagicItemKind::Script),
            "scene" => Ok(MagicItemKind::Scene),
            "entity" => Ok(MagicItemKind::Entity),
            "folder" => Ok(MagicItemKind::Folder),
            other => Err(format!("unknown magic item type '{}'", other)),
        }
    }
}

impl fmt::Display for MagicItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Shortcut invokable from the watch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicItem {
    pub id: String,
    pub server_id: String,
    pub kind: MagicItemKind,
}

/// Display information derived for a magic item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagicItemInfo {
    pub id: String,
    pub name: String,
    pub icon_name: String,
    pub icon_color: Option<String>,
}

/// Assist settings of the watch configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssistConfig {
    pub show_assist: bool,
    pub server_id: Option<String>,
    pub pipeline_id: Option<String>,
}

/// Watch configuration record
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchConfig {
    pub id: String,
    pub assist: AssistConfig,
    pub items: Vec<MagicItem>,
}

// ----------------------------------------------------------------------------
// Server-side Records
// ----------------------------------------------------------------------------

/// Conversation pipeline configured on the home server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: String,
    pub name: String,
}

/// Pipelines available on a server plus the preferred one
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineListing {
    pub pipelines: Vec<Pipeline>,
    pub preferred_pipeline: String,
}

/// Notification action relayed from the watch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushActionInfo {
    pub identifier: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub text_input: Option<String>,
    #[serde(default)]
    pub user_info: serde_json::Map<String, serde_json::Value>,
}

// ----------------------------------------------------------------------------
// Service Calls
// ----------------------------------------------------------------------------

/// Device that issued a service call to the home server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CallSource {
    /// Watch calling the server directly while the phone is unreachable
    Watch,
    /// Phone relaying a watch press
    Phone,
}

/// A remote service invocation `domain.service(data)`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceCall {
    pub domain: String,
    pub service: String,
    pub data: Content,
    pub source: CallSource,
}

impl ServiceCall {
    pub fn new(domain: impl Into<String>, service: impl Into<String>, source: CallSource) -> Self {
        Self {
            domain: domain.into(),
            service: service.into(),
            data: Content::new(),
            source,
        }
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    /// Firing a configured action
    pub fn for_action(action: &Action, source: CallSource) -> Self {
        Self::new("ios", "action_fired", source)
            .with("actionID", action.id.as_str())
            .with("actionName", action.name.as_str())
            .with("triggerSource", "watch")
    }

    /// Service call for a non-action magic item. Folders are containers and
    /// actions need their stored record, so both yield `None`.
    pub fn for_magic_item(kind: MagicItemKind, item_id: &str, source: CallSource) -> Option<Self> {
        match kind {
            MagicItemKind::Script => {
                let object_id = item_id.strip_prefix("script.").unwrap_or(item_id);
                Some(Self::new("script", object_id, source))
            }
            MagicItemKind::Scene => {
                Some(Self::new("scene", "turn_on", source).with("entity_id", item_id))
            }
            MagicItemKind::Entity => {
                let domain = item_id.split('.').next().unwrap_or(item_id);
                let service = match domain {
                    "button" | "input_button" => "press",
                    _ => "toggle",
                };
                Some(Self::new(domain, service, source).with("entity_id", item_id))
            }
            MagicItemKind::Action | MagicItemKind::Folder => None,
        }
    }
}

impl fmt::Display for ServiceCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.domain, self.service)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_strips_domain_prefix() {
        let call =
            ServiceCall::for_magic_item(MagicItemKind::Script, "script.goodnight", CallSource::Watch)
                .unwrap();
        assert_eq!(call.domain, "script");
        assert_eq!(call.service, "goodnight");
        assert!(call.data.is_empty());
    }

    #[test]
    fn test_entity_service_depends_on_domain() {
        let light =
            ServiceCall::for_magic_item(MagicItemKind::Entity, "light.kitchen", CallSource::Watch)
                .unwrap();
        assert_eq!(light.to_string(), "light.toggle");
        assert_eq!(light.data["entity_id"], Value::from("light.kitchen"));

        let button =
            ServiceCall::for_magic_item(MagicItemKind::Entity, "button.doorbell", CallSource::Watch)
                .unwrap();
        assert_eq!(button.to_string(), "button.press");
    }

    #[test]
    fn test_scene_and_folder() {
        let scene =
            ServiceCall::for_magic_item(MagicItemKind::Scene, "scene.movie", CallSource::Watch)
                .unwrap();
        assert_eq!(scene.to_string(), "scene.turn_on");
        assert!(ServiceCall::for_magic_item(MagicItemKind::Folder, "f1", CallSource::Watch).is_none());
    }

    #[test]
    fn test_action_call_shape() {
        let action = Action {
            id: "a1".into(),
            name: "Lights off".into(),
            server_id: "home".into(),
        };
        let call = ServiceCall::for_action(&action, CallSource::Watch);
        assert_eq!(call.to_string(), "ios.action_fired");
        assert_eq!(call.data["actionID"], Value::from("a1"));
        assert_eq!(call.data["triggerSource"], Value::from("watch"));
    }

    #[test]
    fn test_magic_item_kind_parse() {
        assert_eq!("scene".parse::<MagicItemKind>().unwrap(), MagicItemKind::Scene);
        assert!("widget".parse::<MagicItemKind>().is_err());
    }
}
