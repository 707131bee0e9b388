use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::WeftError;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn from_string(s: impl Into<String>) -> Self {
                Self(s.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

string_id!(
    /// Unique workflow identifier.
    WorkflowId
);
string_id!(
    /// Unique run identifier.
    RunId
);
string_id!(
    /// Identifier of the invoking user.
    UserId
);
string_id!(
    /// Identifier of a permanently stored generated image.
    ImageId
);

/// Node ids are unique within one workflow and chosen by the editor.
pub type NodeId = String;

// ---------------------------------------------------------------------------
// Workflow definition
// ---------------------------------------------------------------------------

/// The kind of step a node performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NodeKind {
    ImageUpload,
    TextInput,
    ImageGen,
    AiAgent,
}

impl NodeKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::ImageUpload => "imageUpload",
            NodeKind::TextInput => "textInput",
            NodeKind::ImageGen => "imageGen",
            NodeKind::AiAgent => "aiAgent",
        }
    }

    /// Whether this kind produces an image rather than text.
    pub fn produces_image(&self) -> bool {
        matches!(self, NodeKind::ImageUpload | NodeKind::ImageGen)
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type-specific node configuration, stored in the editor's `data` object.
///
/// Which fields matter depends on [`NodeKind`]. The cached fields
/// (`generated_image`, `output`) hold the last value the node produced.
/// Unknown editor fields are preserved in `extra`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    /// imageUpload: the uploaded image payload.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// textInput: the static text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    /// imageGen: cached last-generated image.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generated_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_prompt_template: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    /// aiAgent: cached last-generated text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

/// Editor layout position. Irrelevant to execution.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub x: f64,
    pub y: f64,
}

/// One step of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub kind: NodeKind,
    #[serde(default)]
    pub data: NodeData,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub position: Option<Position>,
}

impl Node {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            data: NodeData::default(),
            position: None,
        }
    }

    /// An imageUpload node carrying `image` as its payload.
    pub fn image_upload(id: impl Into<String>, image: impl Into<String>) -> Self {
        let mut node = Self::new(id, NodeKind::ImageUpload);
        node.data.image_url = Some(image.into());
        node
    }

    /// A textInput node with static `text`.
    pub fn text_input(id: impl Into<String>, text: impl Into<String>) -> Self {
        let mut node = Self::new(id, NodeKind::TextInput);
        node.data.text = Some(text.into());
        node
    }

    /// An imageGen node.
    pub fn image_gen(
        id: impl Into<String>,
        model: impl Into<String>,
        prompt: impl Into<String>,
    ) -> Self {
        let mut node = Self::new(id, NodeKind::ImageGen);
        node.data.model = Some(model.into());
        node.data.prompt = Some(prompt.into());
        node
    }

    /// An aiAgent node with a user-prompt template.
    pub fn ai_agent(
        id: impl Into<String>,
        model: impl Into<String>,
        template: impl Into<String>,
    ) -> Self {
        let mut node = Self::new(id, NodeKind::AiAgent);
        node.data.model = Some(model.into());
        node.data.user_prompt_template = Some(template.into());
        node
    }

    pub fn with_negative_prompt(mut self, negative: impl Into<String>) -> Self {
        self.data.negative_prompt = Some(negative.into());
        self
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.data.system_prompt = Some(prompt.into());
        self
    }

    pub fn with_generated_image(mut self, image: impl Into<String>) -> Self {
        self.data.generated_image = Some(image.into());
        self
    }

    pub fn with_output(mut self, text: impl Into<String>) -> Self {
        self.data.output = Some(text.into());
        self
    }

    /// The value cached directly on this node's configuration, if any.
    ///
    /// textInput always has a value: a missing text field reads as "".
    /// For every other kind an empty string counts as no value.
    pub fn cached_output(&self) -> Option<NodeValue> {
        let present = |v: &Option<String>| v.clone().filter(|s| !s.is_empty());
        match self.kind {
            NodeKind::ImageUpload => present(&self.data.image_url).map(NodeValue::Image),
            NodeKind::ImageGen => present(&self.data.generated_image).map(NodeValue::Image),
            NodeKind::TextInput => Some(NodeValue::Text(
                self.data.text.clone().unwrap_or_default(),
            )),
            NodeKind::AiAgent => present(&self.data.output).map(NodeValue::Text),
        }
    }
}

/// One of the three labeled input slots of a target node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum InputSlot {
    #[serde(rename = "input-0")]
    Input0,
    #[serde(rename = "input-1")]
    Input1,
    #[serde(rename = "input-2")]
    Input2,
}

impl InputSlot {
    pub fn index(&self) -> usize {
        match self {
            InputSlot::Input0 => 0,
            InputSlot::Input1 => 1,
            InputSlot::Input2 => 2,
        }
    }
}

/// A data dependency: `source`'s output feeds `target`'s input slot.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub id: String,
    pub source: NodeId,
    pub target: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_handle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_handle: Option<InputSlot>,
}

impl Edge {
    /// Create an edge into the given input slot.
    pub fn new(source: impl Into<String>, target: impl Into<String>, slot: InputSlot) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("e-{}-{}-{}", source, target, slot.index()),
            source,
            target,
            source_handle: Some("output".to_string()),
            target_handle: Some(slot),
        }
    }
}

/// A user-authored graph of generation steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workflow {
    pub id: WorkflowId,
    pub user_id: UserId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default)]
    pub edges: Vec<Edge>,
    #[serde(default)]
    pub is_template: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Workflow {
    pub fn new(user_id: UserId, name: impl Into<String>, nodes: Vec<Node>, edges: Vec<Edge>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::new(),
            user_id,
            name: name.into(),
            description: String::new(),
            nodes,
            edges,
            is_template: false,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// Edges whose target is `node_id`, in definition order.
    pub fn incoming<'a>(&'a self, node_id: &'a str) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.iter().filter(move |e| e.target == node_id)
    }

    /// Copy completed results back onto each node's cached output fields.
    ///
    /// Only imageGen and aiAgent nodes carry a cache. Returns how many nodes
    /// were updated.
    pub fn absorb_results(&mut self, results: &HashMap<NodeId, NodeResult>) -> usize {
        let mut updated = 0;
        for node in &mut self.nodes {
            let Some(result) = results.get(&node.id) else {
                continue;
            };
            if result.status != NodeStatus::Completed {
                continue;
            }
            match node.kind {
                NodeKind::ImageGen => {
                    if let Some(image) = &result.image_data {
                        node.data.generated_image = Some(image.clone());
                        updated += 1;
                    }
                }
                NodeKind::AiAgent => {
                    if let Some(text) = &result.text {
                        node.data.output = Some(text.clone());
                        updated += 1;
                    }
                }
                NodeKind::ImageUpload | NodeKind::TextInput => {}
            }
        }
        if updated > 0 {
            self.updated_at = Utc::now();
        }
        updated
    }
}

// ---------------------------------------------------------------------------
// Values flowing between nodes
// ---------------------------------------------------------------------------

/// A value produced by one node and consumed by another.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum NodeValue {
    Image(String),
    Text(String),
}

impl NodeValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            NodeValue::Text(t) => Some(t),
            NodeValue::Image(_) => None,
        }
    }

    /// The payload if this value is image-shaped (data URI or URL).
    pub fn as_image(&self) -> Option<&str> {
        match self {
            NodeValue::Image(i) if is_image_payload(i) => Some(i),
            _ => None,
        }
    }
}

/// Image payloads are base64 data URIs or http(s) URLs.
pub fn is_image_payload(s: &str) -> bool {
    s.starts_with("data:image/") || s.starts_with("http")
}

/// A resolved input for one node: which slot it arrived on and from where.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeInput {
    pub source: NodeId,
    pub slot: Option<InputSlot>,
    pub value: NodeValue,
}

// ---------------------------------------------------------------------------
// Runs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl NodeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeStatus::Pending => "pending",
            NodeStatus::Running => "running",
            NodeStatus::Completed => "completed",
            NodeStatus::Failed => "failed",
        }
    }
}

impl std::str::FromStr for NodeStatus {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(NodeStatus::Pending),
            "running" => Ok(NodeStatus::Running),
            "completed" => Ok(NodeStatus::Completed),
            "failed" => Ok(NodeStatus::Failed),
            other => Err(WeftError::Database(format!("unknown node status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Running => "running",
            RunStatus::Completed => "completed",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    /// Terminal statuses stamp `completed_at` and freeze the run.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, RunStatus::Running)
    }
}

impl std::str::FromStr for RunStatus {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "running" => Ok(RunStatus::Running),
            "completed" => Ok(RunStatus::Completed),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(WeftError::Database(format!("unknown run status: {}", other))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    Full,
    Partial,
}

impl ExecutionMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Full => "full",
            ExecutionMode::Partial => "partial",
        }
    }
}

impl std::str::FromStr for ExecutionMode {
    type Err = WeftError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "full" => Ok(ExecutionMode::Full),
            "partial" => Ok(ExecutionMode::Partial),
            other => Err(WeftError::Database(format!("unknown execution mode: {}", other))),
        }
    }
}

/// Outcome of one node within a run (or of a single-node execution).
///
/// `text` may be `Some("")`: an empty produced text is a value, not an absence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeResult {
    pub status: NodeStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_data: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_id: Option<ImageId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub generation_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl NodeResult {
    fn with_status(status: NodeStatus) -> Self {
        Self {
            status,
            image_data: None,
            image_id: None,
            text: None,
            error: None,
            generation_time_ms: None,
            completed_at: None,
        }
    }

    pub fn running() -> Self {
        Self::with_status(NodeStatus::Running)
    }

    pub fn completed_image(image_data: impl Into<String>, image_id: Option<ImageId>) -> Self {
        Self {
            image_data: Some(image_data.into()),
            image_id,
            completed_at: Some(Utc::now()),
            ..Self::with_status(NodeStatus::Completed)
        }
    }

    pub fn completed_text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            completed_at: Some(Utc::now()),
            ..Self::with_status(NodeStatus::Completed)
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            completed_at: Some(Utc::now()),
            ..Self::with_status(NodeStatus::Failed)
        }
    }

    pub fn with_generation_time(mut self, ms: u64) -> Self {
        self.generation_time_ms = Some(ms);
        self
    }

    pub fn is_completed(&self) -> bool {
        self.status == NodeStatus::Completed
    }

    /// The value a downstream node sees: text wins over image when both exist.
    pub fn output(&self) -> Option<NodeValue> {
        if let Some(text) = &self.text {
            return Some(NodeValue::Text(text.clone()));
        }
        self.image_data.clone().map(NodeValue::Image)
    }

    /// Merge a partial update: status always moves, other fields only when present.
    pub fn merge(&mut self, patch: &NodeResult) {
        self.status = patch.status;
        if patch.image_data.is_some() {
            self.image_data = patch.image_data.clone();
        }
        if patch.image_id.is_some() {
            self.image_id = patch.image_id.clone();
        }
        if patch.text.is_some() {
            self.text = patch.text.clone();
        }
        if patch.error.is_some() {
            self.error = patch.error.clone();
        }
        if patch.generation_time_ms.is_some() {
            self.generation_time_ms = patch.generation_time_ms;
        }
        if patch.completed_at.is_some() {
            self.completed_at = patch.completed_at;
        }
    }
}

/// One persisted execution attempt of a workflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Run {
    pub id: RunId,
    pub workflow_id: WorkflowId,
    pub user_id: UserId,
    pub status: RunStatus,
    pub execution_mode: ExecutionMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_id: Option<NodeId>,
    #[serde(default)]
    pub node_results: HashMap<NodeId, NodeResult>,
    pub started_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}

impl Run {
    pub fn result(&self, node_id: &str) -> Option<&NodeResult> {
        self.node_results.get(node_id)
    }

    /// Ids of nodes whose result is `failed`, sorted.
    pub fn failed_nodes(&self) -> Vec<&str> {
        let mut failed: Vec<&str> = self
            .node_results
            .iter()
            .filter(|(_, r)| r.status == NodeStatus::Failed)
            .map(|(id, _)| id.as_str())
            .collect();
        failed.sort_unstable();
        failed
    }
}

// ---------------------------------------------------------------------------
// Generated images
// ---------------------------------------------------------------------------

/// Settings recorded alongside a generated image.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageSettings {
    pub input_images_count: usize,
    pub has_input_images: bool,
}

/// A generated image about to be stored as a new permanent record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewGeneratedImage {
    pub user_id: UserId,
    pub prompt: String,
    pub model_id: String,
    pub image_data: String,
    #[serde(default)]
    pub negative_prompt: String,
    #[serde(default)]
    pub settings: ImageSettings,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

/// A stored generated image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedImageRecord {
    pub id: ImageId,
    #[serde(flatten)]
    pub image: NewGeneratedImage,
    #[serde(default)]
    pub is_favorite: bool,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Provider requests
// ---------------------------------------------------------------------------

/// Image-generation call parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRequest {
    pub model: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negative_prompt: Option<String>,
    #[serde(default)]
    pub input_images: Vec<String>,
}

/// Image-generation result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageResponse {
    pub image_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

/// Role in a conversation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A single chat message.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
        }
    }
}

/// Non-streaming chat-completion call parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub system_prompt: Option<String>,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Chat-completion result. `text` is `None` when the provider returned no content.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatResponse {
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<TokenUsage>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
}

// ---------------------------------------------------------------------------
// Personalization
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserInfo {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub expertise_level: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Behavior {
    #[serde(default)]
    pub tone: Option<String>,
    #[serde(default)]
    pub response_style: Option<String>,
}

/// Caller-supplied personalization folded into aiAgent system prompts.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub user_info: UserInfo,
    #[serde(default)]
    pub behavior: Behavior,
    #[serde(default)]
    pub custom_instructions: Option<String>,
}

impl Preferences {
    /// Render the "User preferences" block, or `None` when disabled or empty.
    pub fn prompt_block(&self) -> Option<String> {
        if !self.enabled {
            return None;
        }

        let fields = [
            ("Name", &self.user_info.name),
            ("Preferred language", &self.user_info.language),
            ("Expertise level", &self.user_info.expertise_level),
            ("Tone", &self.behavior.tone),
            ("Response style", &self.behavior.response_style),
            ("Custom instructions", &self.custom_instructions),
        ];

        let lines: Vec<String> = fields
            .iter()
            .filter_map(|(label, value)| {
                value
                    .as_deref()
                    .map(str::trim)
                    .filter(|v| !v.is_empty())
                    .map(|v| format!("- {}: {}", label, v))
            })
            .collect();

        if lines.is_empty() {
            return None;
        }
        Some(format!("## User preferences\n\n{}", lines.join("\n")))
    }
}

// ---------------------------------------------------------------------------
// Engine events
// ---------------------------------------------------------------------------

/// Progress events published while a run executes.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    RunStarted {
        run_id: RunId,
        workflow_id: WorkflowId,
        mode: ExecutionMode,
    },
    LayerStarted {
        run_id: RunId,
        index: usize,
        node_ids: Vec<NodeId>,
    },
    NodeStarted {
        run_id: RunId,
        node_id: NodeId,
    },
    NodeCompleted {
        run_id: RunId,
        node_id: NodeId,
        generation_time_ms: u64,
    },
    NodeFailed {
        run_id: RunId,
        node_id: NodeId,
        error: String,
    },
    RunCompleted {
        run_id: RunId,
        elapsed_ms: u64,
    },
    RunFailed {
        run_id: RunId,
        error: String,
    },
    RunCancelled {
        run_id: RunId,
    },
}

impl EngineEvent {
    pub fn run_id(&self) -> &RunId {
        match self {
            EngineEvent::RunStarted { run_id, .. }
            | EngineEvent::LayerStarted { run_id, .. }
            | EngineEvent::NodeStarted { run_id, .. }
            | EngineEvent::NodeCompleted { run_id, .. }
            | EngineEvent::NodeFailed { run_id, .. }
            | EngineEvent::RunCompleted { run_id, .. }
            | EngineEvent::RunFailed { run_id, .. }
            | EngineEvent::RunCancelled { run_id } => run_id,
        }
    }

    /// Whether this event ends a run.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            EngineEvent::RunCompleted { .. }
                | EngineEvent::RunFailed { .. }
                | EngineEvent::RunCancelled { .. }
        )
    }
}
