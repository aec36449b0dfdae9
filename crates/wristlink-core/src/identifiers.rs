//! Message identifier registry
//!
//! Maps wire-level identifier strings to typed enumeration cases for inbound
//! requests, their responses, and fire-and-forget notifications. Parsing is
//! total in the sense that every string resolves to exactly one case or to
//! `None`; callers treat `None` as unroutable and drop the message.

use core::fmt;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

/// Error returned when an identifier string is not registered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unregistered message identifier '{0}'")]
pub struct UnknownIdentifier(pub String);

macro_rules! identifier_enum {
    (
        $(#[$meta:meta])*
        pub enum $name:ident {
            $($(#[$vmeta:meta])* $variant:ident => $wire:literal,)+
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $($(#[$vmeta])* $variant,)+
        }

        impl $name {
            /// Every registered case
            pub const ALL: &'static [$name] = &[$($name::$variant,)+];

            /// The wire string for this case
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire,)+
                }
            }
        }

        impl FromStr for $name {
            type Err = UnknownIdentifier;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    other => Err(UnknownIdentifier(other.to_string())),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

identifier_enum! {
    /// Inbound request-with-reply identifiers handled by the phone
    pub enum RequestIdentifier {
        Ping => "ping",
        WatchConfig => "watchConfig",
        ActionRowPressed => "actionRowPressed",
        PushAction => "pushAction",
        AssistPipelinesFetch => "assistPipelinesFetch",
        AssistAudioDataChunked => "assistAudioDataChunked",
        MagicItemPressed => "magicItemPressed",
    }
}

identifier_enum! {
    /// Reply identifiers, each answering exactly one request identifier
    pub enum ResponseIdentifier {
        Pong => "pong",
        WatchConfigResponse => "watchConfigResponse",
        EmptyWatchConfigResponse => "emptyWatchConfigResponse",
        ActionRowPressedResponse => "actionRowPressedResponse",
        PushActionResponse => "pushActionResponse",
        AssistPipelinesFetchResponse => "assistPipelinesFetchResponse",
        AssistAudioChunkAck => "assistAudioChunkAck",
        MagicItemRowPressedResponse => "magicItemRowPressedResponse",
    }
}

identifier_enum! {
    /// Fire-and-forget identifiers
    pub enum NotificationIdentifier {
        /// Single-shot audio submission, watch to phone
        AssistAudioData => "assistAudioData",
        AssistSttResponse => "assistSTTResponse",
        AssistIntentEndResponse => "assistIntentEndResponse",
        AssistTtsResponse => "assistTTSResponse",
        AssistError => "assistError",
    }
}

impl RequestIdentifier {
    /// Responses a handler for this request may legally produce
    pub fn responses(&self) -> &'static [ResponseIdentifier] {
        use ResponseIdentifier as R;
        match self {
            RequestIdentifier::Ping => &[R::Pong],
            RequestIdentifier::WatchConfig => &[R::WatchConfigResponse, R::EmptyWatchConfigResponse],
            RequestIdentifier::ActionRowPressed => &[R::ActionRowPressedResponse],
            RequestIdentifier::PushAction => &[R::PushActionResponse],
            RequestIdentifier::AssistPipelinesFetch => &[R::AssistPipelinesFetchResponse],
            RequestIdentifier::AssistAudioDataChunked => &[R::AssistAudioChunkAck],
            RequestIdentifier::MagicItemPressed => &[R::MagicItemRowPressedResponse],
        }
    }

    /// Whether `response` is a legal reply to this request
    pub fn accepts(&self, response: ResponseIdentifier) -> bool {
        self.responses().contains(&response)
    }
}

impl ResponseIdentifier {
    /// The request this response answers
    pub fn request(&self) -> RequestIdentifier {
        use RequestIdentifier as Q;
        match self {
            ResponseIdentifier::Pong => Q::Ping,
            ResponseIdentifier::WatchConfigResponse
            | ResponseIdentifier::EmptyWatchConfigResponse => Q::WatchConfig,
            ResponseIdentifier::ActionRowPressedResponse => Q::ActionRowPressed,
            ResponseIdentifier::PushActionResponse => Q::PushAction,
            ResponseIdentifier::AssistPipelinesFetchResponse => Q::AssistPipelinesFetch,
            ResponseIdentifier::AssistAudioChunkAck => Q::AssistAudioDataChunked,
            ResponseIdentifier::MagicItemRowPressedResponse => Q::MagicItemPressed,
        }
    }
}
