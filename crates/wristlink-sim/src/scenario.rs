//! Simulated home: the records the phone stores and what the server knows

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use wristlink_core::memory::{MemoryHomeServer, MemoryStore};
use wristlink_core::{
    Action, AssistConfig, AssistEvent, MagicItem, MagicItemInfo, Pipeline, PipelineListing,
    WatchConfig,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Scenario {
    pub server_id: String,
    pub pipelines: Vec<Pipeline>,
    pub preferred_pipeline: String,
    pub actions: Vec<Action>,
    pub magic_items: Vec<MagicItem>,
    /// What the user says and what Assist answers
    pub transcript: Option<(String, String)>,
}

impl Default for Scenario {
    fn default() -> Self {
        Self {
            server_id: "home".into(),
            pipelines: vec![Pipeline {
                id: "default".into(),
                name: "Home Assistant".into(),
            }],
            preferred_pipeline: "default".into(),
            actions: vec![Action {
                id: "goodnight".into(),
                name: "Goodnight".into(),
                server_id: "home".into(),
            }],
            magic_items: vec![
                MagicItem {
                    id: "script.morning".into(),
                    server_id: "home".into(),
                    kind: wristlink_core::MagicItemKind::Script,
                },
                MagicItem {
                    id: "light.kitchen".into(),
                    server_id: "home".into(),
                    kind: wristlink_core::MagicItemKind::Entity,
                },
            ],
            transcript: Some(("turn off the kitchen light".into(), "Turned off the light".into())),
        }
    }
}

impl Scenario {
    pub fn from_toml(source: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(source)?)
    }

    pub fn store(&self) -> MemoryStore {
        let config = WatchConfig {
            id: "sim-watch".into(),
            assist: AssistConfig {
                show_assist: self.transcript.is_some(),
                server_id: Some(self.server_id.clone()),
                pipeline_id: Some(self.preferred_pipeline.clone()),
            },
            items: self.magic_items.clone(),
        };
        let store = self
            .actions
            .iter()
            .cloned()
            .fold(MemoryStore::new().with_config(config), MemoryStore::with_action);
        self.magic_items.iter().fold(store, |store, item| {
            store.with_info(MagicItemInfo {
                id: item.id.clone(),
                name: item.id.clone(),
                icon_name: item.kind.to_string(),
                icon_color: None,
            })
        })
    }

    pub fn server(&self) -> Arc<MemoryHomeServer> {
        let script = match &self.transcript {
            Some((heard, answer)) => vec![
                AssistEvent::SpeechToText(heard.clone()),
                AssistEvent::IntentEnd(answer.clone()),
            ],
            None => vec![AssistEvent::Error {
                code: "no_intent".into(),
                message: "Nothing configured to answer".into(),
            }],
        };
        Arc::new(
            MemoryHomeServer::new()
                .with_pipelines(PipelineListing {
                    pipelines: self.pipelines.clone(),
                    preferred_pipeline: self.preferred_pipeline.clone(),
                })
                .with_assist_script(script),
        )
    }
}
