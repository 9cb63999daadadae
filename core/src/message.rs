use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One button on a choice menu: what the user sees and the machine
/// token the platform posts back when it is tapped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct MenuButton {
    pub label: String,
    pub token: String,
}

impl MenuButton {
    pub fn new(label: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            token: token.into(),
        }
    }
}

/// A platform-agnostic outbound message. The dispatcher and the flow
/// engines only ever produce these; rendering to the concrete platform
/// payload happens in the messenger client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Plain text.
    Text { text: String },
    /// A titled prompt with tappable choices.
    Menu {
        title: String,
        body: String,
        buttons: Vec<MenuButton>,
    },
}

impl OutboundMessage {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn menu(
        title: impl Into<String>,
        body: impl Into<String>,
        buttons: Vec<MenuButton>,
    ) -> Self {
        Self::Menu {
            title: title.into(),
            body: body.into(),
            buttons,
        }
    }
}
