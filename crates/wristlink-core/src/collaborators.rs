//! Collaborator interfaces consumed by the router
//!
//! The home server API client, the local datastore and the platform's
//! background-execution facilities are owned elsewhere. The router only sees
//! them through these traits so that tests can substitute in-memory fakes.

use alloc::sync::Arc;
use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::assist::{AssistEvent, AssistRequest};
use crate::errors::{ServiceError, TransportError};
use crate::records::{Action, MagicItem, MagicItemInfo, PipelineListing, PushActionInfo, ServiceCall, WatchConfig};
use crate::wire::WireMessage;

// ----------------------------------------------------------------------------
// Home Server
// ----------------------------------------------------------------------------

/// Remote home-automation server reachable from the phone
#[async_trait]
pub trait HomeServer: Send + Sync {
    /// Invoke `domain.service` with the given data
    async fn call_service(&self, call: ServiceCall) -> Result<(), ServiceError>;

    /// Deliver a notification action chosen on the watch
    async fn handle_push_action(&self, info: PushActionInfo) -> Result<(), ServiceError>;

    /// List conversation pipelines; `Ok(None)` when the server returned nothing
    async fn fetch_pipelines(&self) -> Result<Option<PipelineListing>, ServiceError>;

    /// Run an assist pipeline over recorded audio, streaming its events
    async fn run_assist(
        &self,
        request: AssistRequest,
    ) -> Result<BoxStream<'static, AssistEvent>, ServiceError>;
}

/// Resolves server identifiers to connected servers
pub trait ServerDirectory: Send + Sync {
    fn server(&self, server_id: &str) -> Option<Arc<dyn HomeServer>>;
}

// ----------------------------------------------------------------------------
// Local Store
// ----------------------------------------------------------------------------

/// Synchronous reads from the local datastore
pub trait LocalStore: Send + Sync {
    fn watch_config(&self) -> Option<WatchConfig>;

    fn action(&self, action_id: &str) -> Option<Action>;

    /// Display information for an item, `None` when it cannot be resolved
    fn magic_item_info(&self, item: &MagicItem) -> Option<MagicItemInfo>;
}

// ----------------------------------------------------------------------------
// Outbound Delivery
// ----------------------------------------------------------------------------

/// Fire-and-forget delivery to the paired device
#[async_trait]
pub trait MessageSink: Send + Sync {
    async fn deliver(&self, message: WireMessage) -> Result<(), TransportError>;
}

// ----------------------------------------------------------------------------
// Platform Background Execution
// ----------------------------------------------------------------------------

/// OS-provided background task handle. Consuming `self` makes completion
/// happen exactly once per task instance.
pub trait BackgroundTask: Send {
    fn set_task_completed(self: Box<Self>, snapshot_refreshed: bool);

    /// Human-readable label for logging
    fn label(&self) -> &str {
        "background-task"
    }
}

/// Marker held while a named background activity is in progress; dropping it
/// ends the activity.
pub trait ActivityToken: Send {}

/// Keeps the process alive while work started from a message completes
pub trait BackgroundActivity: Send + Sync {
    fn begin(&self, name: &str) -> Box<dyn ActivityToken>;
}

/// Background activity provider for hosts without such a facility
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopActivity;

struct NoopToken;

impl ActivityToken for NoopToken {}

impl BackgroundActivity for NoopActivity {
    fn begin(&self, _name: &str) -> Box<dyn ActivityToken> {
        Box::new(NoopToken)
    }
}
