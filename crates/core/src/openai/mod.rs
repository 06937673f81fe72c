mod chunks;
mod types;

pub use chunks::{completion_chunks, split_reply};
pub use types::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, ChatMessage, Choice,
    ChunkChoice, ContentPart, Delta, ErrorBody, ErrorDetail, ImageUrl, MessageContent, ModelInfo,
    ModelList, Role,
};
