//! `POST /v1/chat/completions`.
//!
//! The request history is sanitized and matched against stored
//! conversations. Only the messages Gemini has not seen yet are flattened into
//! a prompt and sent through a pooled client. The reply comes back either as
//! one JSON body or as `chat.completion.chunk` SSE frames ending in `[DONE]`.

use std::convert::Infallible;

use axum::{
    extract::State,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use chrono::Utc;
use gemproxy_core::conversation::{
    ensure_within_limit, normalize_reply, prepare_conversation, sanitize_assistant_messages,
    PreparedConversation, RequestError,
};
use gemproxy_core::gemini::{retry_backoff, GeminiError, ModelOutput};
use gemproxy_core::model::{map_openai_model, GeminiModel, MatchKind};
use gemproxy_core::openai::{completion_chunks, ChatCompletionRequest, ChatCompletionResponse};
use gemproxy_core::session::SessionMatch;
use uuid::Uuid;

use crate::{
    handlers::{auth::ApiKey, body::JsonBody, AppError},
    sessions::{find_reusable_session, store_conversation},
    state::AppState,
};

#[axum::debug_handler]
pub async fn chat_completions(
    State(state): State<AppState>,
    _key: ApiKey,
    JsonBody(request): JsonBody<ChatCompletionRequest>,
) -> Result<Response, AppError> {
    let messages = sanitize_assistant_messages(&request.messages);

    let matched = map_openai_model(&request.model);
    if matched.kind == MatchKind::Fallback {
        tracing::warn!(
            requested = %request.model,
            model = %matched.model,
            "Unknown model, using the default"
        );
    }
    let model = matched.model;

    let session = find_reusable_session(
        state.conversations.as_ref(),
        model.name(),
        &messages,
        &state.pool.credential_ids(),
    )
    .await;

    let prepared = match &session {
        Some(session) => prepare_conversation(&session.remaining),
        None => prepare_conversation(&messages),
    };
    for warning in &prepared.warnings {
        tracing::warn!("{warning}");
    }
    if prepared.prompt.trim().is_empty() && prepared.attachments.is_empty() {
        return Err(RequestError::EmptyConversation.into());
    }
    ensure_within_limit(&prepared.prompt, state.config.gemini.max_chars_per_request)?;

    tracing::info!(
        model = %model,
        stream = request.stream,
        messages = messages.len(),
        prompt_chars = prepared.prompt.chars().count(),
        attachments = prepared.attachments.len(),
        reused_session = session.is_some(),
        "Chat completion"
    );

    let (output, credential_id) =
        generate_with_retry(&state, &prepared, model, session.as_ref()).await?;
    let reply = normalize_reply(&output.text);

    if !output.text.trim().is_empty() {
        store_conversation(
            state.conversations.as_ref(),
            state.config.storage.max_entries,
            &credential_id,
            model.name(),
            &messages,
            &reply,
            output.metadata,
        )
        .await;
    }

    let id = format!("chatcmpl-{}", Uuid::new_v4().simple());
    let created = Utc::now().timestamp();

    if request.stream {
        Ok(stream_reply(&state, &id, created, &request.model, &reply).into_response())
    } else {
        Ok(Json(ChatCompletionResponse::assistant_reply(id, created, request.model, reply)).into_response())
    }
}

/// Sends the prompt, retrying on a fresh client after non-auth failures.
///
/// Returns the output together with the credential that produced it.
async fn generate_with_retry(
    state: &AppState,
    prepared: &PreparedConversation,
    model: GeminiModel,
    session: Option<&SessionMatch>,
) -> Result<(ModelOutput, String), GeminiError> {
    let max_attempts = state.pool.config().max_retries.max(1);
    let credential = session.map(|s| s.record.credential_id.as_str());
    let metadata = session.map(|s| &s.record.metadata);

    let mut attempt = 0;
    loop {
        let (error, client_id) = match state.pool.acquire(credential).await {
            Ok(lease) => {
                match lease
                    .backend
                    .generate(&prepared.prompt, &prepared.attachments, model, metadata)
                    .await
                {
                    Ok(output) => return Ok((output, lease.credential_id)),
                    Err(e) => (e, Some(lease.id)),
                }
            }
            Err(e) => (e, None),
        };

        attempt += 1;
        tracing::warn!(
            attempt,
            max_attempts,
            kind = error.kind(),
            error = %error,
            "Gemini request failed"
        );

        if error.is_auth() || attempt >= max_attempts {
            return Err(error);
        }

        if let Some(id) = client_id {
            state.pool.evict(&id).await;
        }
        tokio::time::sleep(retry_backoff(attempt - 1)).await;
    }
}

fn stream_reply(
    state: &AppState,
    id: &str,
    created: i64,
    model: &str,
    reply: &str,
) -> Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>> {
    let chunks = completion_chunks(id, created, model, reply, state.config.server.stream_chunk_chars);
    let delay = state.config.stream_delay();
    let mut shutdown_rx = state.subscribe_shutdown();

    let stream = async_stream::stream! {
        let last = chunks.len().saturating_sub(1);
        for (i, chunk) in chunks.into_iter().enumerate() {
            let data = serde_json::to_string(&chunk).unwrap_or_default();
            yield Ok(Event::default().data(data));

            if i < last && !delay.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = shutdown_rx.recv() => {
                        tracing::info!("Completion stream cut short by shutdown");
                        break;
                    }
                }
            }
        }

        yield Ok(Event::default().data("[DONE]"));
    };

    Sse::new(stream)
}
