use serde::{Deserialize, Serialize};
use std::fmt;

/// Task identifier used when no task was selected.
pub const CUSTOM_TASK: &str = "custom";

/// Which backend path a generation goes through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiMode {
    /// One call to the direct endpoint, no retry.
    #[default]
    Direct,
    /// The same call wrapped in exponential backoff.
    Resilient,
}

impl ApiMode {
    pub fn as_str(&self) -> &str {
        match self {
            ApiMode::Direct => "direct",
            ApiMode::Resilient => "resilient",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "direct" => Some(ApiMode::Direct),
            "resilient" => Some(ApiMode::Resilient),
            _ => None,
        }
    }
}

impl fmt::Display for ApiMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body sent to the generation endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationRequest {
    pub image_data_url: String,
    pub prompt: String,
    pub task: String,
}

impl GenerationRequest {
    pub fn new(
        image_data_url: impl Into<String>,
        prompt: impl Into<String>,
        task: impl Into<String>,
    ) -> Self {
        Self {
            image_data_url: image_data_url.into(),
            prompt: prompt.into(),
            task: task.into(),
        }
    }

    /// All three fields must be present for the backend to accept the call.
    pub fn is_complete(&self) -> bool {
        !self.image_data_url.is_empty() && !self.prompt.is_empty() && !self.task.is_empty()
    }
}

/// One finished generation, as returned by the backend and stored in history.
///
/// Field names on the wire and in storage follow the backend's camelCase
/// shape (`imageUrl`, `originalImageUrl`, `createdAt`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRecord {
    pub id: String,
    #[serde(rename = "imageUrl")]
    pub result_image: String,
    #[serde(
        rename = "originalImageUrl",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub source_image: Option<String>,
    pub prompt: String,
    pub task: String,
    #[serde(rename = "createdAt")]
    pub created_at: String,
}

impl GenerationRecord {
    /// A record is valid when every required field is a non-empty string.
    pub fn is_valid(&self) -> bool {
        !self.id.is_empty()
            && !self.result_image.is_empty()
            && !self.prompt.is_empty()
            && !self.task.is_empty()
            && !self.created_at.is_empty()
    }
}

/// A selectable edit task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TaskOption {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

/// The edit tasks offered to users. Anything else is sent as [`CUSTOM_TASK`].
pub const TASK_OPTIONS: &[TaskOption] = &[
    TaskOption {
        id: "change-colors",
        label: "Change Colors",
        description: "Modify specific colors or overall color palette",
    },
    TaskOption {
        id: "face-editing",
        label: "Face Editing",
        description: "Edit facial features and expressions",
    },
    TaskOption {
        id: "change-background",
        label: "Change Background",
        description: "Replace or modify the background of your image",
    },
    TaskOption {
        id: "lighting-effects",
        label: "Lighting Effects",
        description: "Adjust lighting, shadows, and highlights",
    },
    TaskOption {
        id: "remove-object",
        label: "Remove Object",
        description: "Remove unwanted objects or people from your image",
    },
    TaskOption {
        id: "style-transfer",
        label: "Style Transfer",
        description: "Apply artistic styles to your image",
    },
    TaskOption {
        id: "add-elements",
        label: "Add Elements",
        description: "Add new objects or elements to your image",
    },
];

/// Look up a known task by id.
pub fn find_task(id: &str) -> Option<&'static TaskOption> {
    TASK_OPTIONS.iter().find(|t| t.id == id)
}
