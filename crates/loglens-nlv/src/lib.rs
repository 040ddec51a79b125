//! Natural language query layer
//! turns a user question into a structured plan via the LLM, keeps
//! conversation memory, and runs the plan against the stores.

pub mod conversation;
pub mod gemini;
pub mod llm;
pub mod models;
pub mod orchestrator;
pub mod timeparse;

pub use conversation::{ConversationError, ConversationStore};
pub use gemini::GeminiClient;
pub use llm::{LlmClient, LlmError, PromptTurn};
pub use models::{
    ConversationTurn, FilterValue, Intent, LlmAnalysis, NlvQueryRequest, NlvQueryResponse,
    QueryFilter, TimeRange,
};
pub use orchestrator::NlvService;
pub use timeparse::{parse_time_flexible, parse_time_input, TimeParseError};
