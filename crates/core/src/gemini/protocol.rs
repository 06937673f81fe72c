use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::GeminiError;

pub const ORIGIN: &str = "https://gemini.google.com";
pub const INIT_URL: &str = "https://gemini.google.com/app";
pub const GENERATE_URL: &str = "https://gemini.google.com/_/BardChatUi/data/assistant.lamda.BardFrontendService/StreamGenerate";
pub const ROTATE_COOKIES_URL: &str = "https://accounts.google.com/RotateCookies";
pub const ROTATE_COOKIES_BODY: &str = r#"[000,"-0000000000000000000"]"#;
pub const UPLOAD_URL: &str = "https://content-push.googleapis.com/upload";
pub const UPLOAD_PUSH_ID: &str = "feeds/mcudyrk2a4khkz";

static ACCESS_TOKEN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#""SNlM0e":"(.*?)""#).expect("valid access token regex"));

/// Identifiers of an ongoing Gemini chat: conversation, reply and
/// reply-candidate ids.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMetadata {
    pub cid: Option<String>,
    pub rid: Option<String>,
    pub rcid: Option<String>,
}

impl ChatMetadata {
    pub fn is_empty(&self) -> bool {
        self.cid.is_none() && self.rid.is_none() && self.rcid.is_none()
    }

    /// Wire form: `[cid, rid, rcid]`.
    fn to_wire(&self) -> Value {
        json!([self.cid, self.rid, self.rcid])
    }
}

/// A file already pushed to the upload endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub id: String,
    pub file_name: String,
}

/// The first candidate of a Gemini reply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ModelOutput {
    pub text: String,
    pub thoughts: Option<String>,
    pub metadata: ChatMetadata,
}

/// Pulls the `SNlM0e` access token out of the app page.
pub fn extract_access_token(html: &str) -> Option<String> {
    ACCESS_TOKEN_RE
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Builds the `f.req` form value for `StreamGenerate`.
///
/// The inner request is JSON-encoded and then wrapped in a second JSON
/// array, as the web app does.
pub fn build_request_payload(
    prompt: &str,
    files: &[UploadedFile],
    metadata: Option<&ChatMetadata>,
) -> String {
    let message = if files.is_empty() {
        json!([prompt])
    } else {
        let files: Vec<Value> = files
            .iter()
            .map(|f| json!([[f.id], f.file_name]))
            .collect();
        json!([prompt, 0, null, files])
    };

    let metadata = metadata
        .filter(|m| !m.is_empty())
        .map(ChatMetadata::to_wire)
        .unwrap_or(Value::Null);

    let inner = json!([message, null, metadata]).to_string();
    json!([null, inner]).to_string()
}

fn at<'a>(value: &'a Value, path: &[usize]) -> Option<&'a Value> {
    path.iter().try_fold(value, |v, &i| v.get(i))
}

fn string_at(value: &Value, path: &[usize]) -> Option<String> {
    at(value, path).and_then(Value::as_str).map(str::to_string)
}

fn classify_error_code(code: Option<i64>) -> GeminiError {
    match code {
        Some(1037) => GeminiError::UsageLimitExceeded(
            "Failed to generate contents. Usage limit of the model has been exceeded. Please try switching to another model.".to_string(),
        ),
        Some(1050) => GeminiError::ModelInvalid(
            "Failed to generate contents. The specified model is inconsistent with the chat history. Please make sure to pass the same model or start a new chat.".to_string(),
        ),
        Some(1052) => GeminiError::ModelInvalid(
            "Failed to generate contents. The specified model is not available.".to_string(),
        ),
        Some(1060) => GeminiError::TemporarilyBlocked(
            "Failed to generate contents. Your IP address is temporarily blocked by Google. Please try using a proxy or waiting for a while.".to_string(),
        ),
        _ => GeminiError::Api(
            "Failed to generate contents. Invalid response data received.".to_string(),
        ),
    }
}

/// Finds the reply body inside one response frame.
fn find_body(frame: &Value) -> Option<Value> {
    frame.as_array()?.iter().find_map(|part| {
        let inner: Value = serde_json::from_str(part.get(2)?.as_str()?).ok()?;
        let has_candidates = inner
            .get(4)
            .and_then(Value::as_array)
            .is_some_and(|c| !c.is_empty());
        has_candidates.then_some(inner)
    })
}

/// Parses a `StreamGenerate` response body.
///
/// The body starts with the `)]}'` guard followed by newline separated JSON
/// frames. The first part whose inner JSON carries candidates is the reply.
/// Without one, the error code found at `[0][5][2][0][1][0]` of the first
/// frame selects the error.
pub fn parse_generate_response(body: &str) -> Result<ModelOutput, GeminiError> {
    let frames: Vec<Value> = body
        .trim_start_matches(")]}'")
        .lines()
        .filter_map(|line| serde_json::from_str::<Value>(line.trim()).ok())
        .filter(Value::is_array)
        .collect();

    let Some(reply) = frames.iter().find_map(find_body) else {
        let code = frames
            .first()
            .and_then(|f| at(f, &[0, 5, 2, 0, 1, 0]))
            .and_then(Value::as_i64);
        return Err(classify_error_code(code));
    };

    let candidate = at(&reply, &[4, 0]).ok_or_else(|| classify_error_code(None))?;

    let text = string_at(candidate, &[1, 0]).unwrap_or_default();
    let thoughts = string_at(candidate, &[37, 0, 0]);

    Ok(ModelOutput {
        text,
        thoughts,
        metadata: ChatMetadata {
            cid: string_at(&reply, &[1, 0]),
            rid: string_at(&reply, &[1, 1]),
            rcid: string_at(candidate, &[0]),
        },
    })
}

/// Extracts the value of cookie `name` from `Set-Cookie` header values.
pub fn extract_cookie<'a, I>(set_cookie_headers: I, name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    set_cookie_headers.into_iter().find_map(|header| {
        let pair = header.split(';').next()?.trim();
        let (key, value) = pair.split_once('=')?;
        (key == name && !value.is_empty()).then(|| value.to_string())
    })
}

/// The upload endpoint answers with the file id as plain text.
pub fn parse_upload_response(body: &str) -> Result<String, GeminiError> {
    let id = body.trim();
    if id.is_empty() {
        return Err(GeminiError::Api(
            "File upload returned an empty identifier".to_string(),
        ));
    }
    Ok(id.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response_with(inner: Value) -> String {
        let frame = json!([["wrb.fr", null, inner.to_string()]]);
        format!(")]}}'\n\n{frame}\n25\n[[\"di\",42]]\n")
    }

    #[test]
    fn test_extract_access_token() {
        let html = r#"<script>WIZ_global_data = {"SNlM0e":"AFx_token:123","other":"x"};</script>"#;
        assert_eq!(extract_access_token(html), Some("AFx_token:123".to_string()));
        assert_eq!(extract_access_token("<html></html>"), None);
    }

    #[test]
    fn test_payload_without_files_or_metadata() {
        let payload = build_request_payload("hello", &[], None);
        let outer: Value = serde_json::from_str(&payload).unwrap();

        assert!(outer[0].is_null());
        let inner: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        assert_eq!(inner, json!([["hello"], null, null]));
    }

    #[test]
    fn test_payload_with_files_and_metadata() {
        let files = vec![UploadedFile {
            id: "/contrib_service/abc".to_string(),
            file_name: "image_1.png".to_string(),
        }];
        let metadata = ChatMetadata {
            cid: Some("c_1".to_string()),
            rid: Some("r_1".to_string()),
            rcid: Some("rc_1".to_string()),
        };

        let payload = build_request_payload("look", &files, Some(&metadata));
        let outer: Value = serde_json::from_str(&payload).unwrap();
        let inner: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();

        assert_eq!(
            inner,
            json!([
                ["look", 0, null, [[["/contrib_service/abc"], "image_1.png"]]],
                null,
                ["c_1", "r_1", "rc_1"]
            ])
        );
    }

    #[test]
    fn test_empty_metadata_is_sent_as_null() {
        let payload = build_request_payload("x", &[], Some(&ChatMetadata::default()));
        let outer: Value = serde_json::from_str(&payload).unwrap();
        let inner: Value = serde_json::from_str(outer[1].as_str().unwrap()).unwrap();
        assert!(inner[2].is_null());
    }

    #[test]
    fn test_parse_reply() {
        let mut candidate = vec![Value::Null; 38];
        candidate[0] = json!("rc_9");
        candidate[1] = json!(["Hello there"]);
        candidate[37] = json!([["pondering"]]);
        let inner = json!([null, ["c_9", "r_9"], null, null, [candidate]]);

        let output = parse_generate_response(&response_with(inner)).unwrap();

        assert_eq!(output.text, "Hello there");
        assert_eq!(output.thoughts.as_deref(), Some("pondering"));
        assert_eq!(
            output.metadata,
            ChatMetadata {
                cid: Some("c_9".to_string()),
                rid: Some("r_9".to_string()),
                rcid: Some("rc_9".to_string()),
            }
        );
    }

    #[test]
    fn test_parse_skips_parts_without_candidates() {
        let empty = json!([null, null, null, null, []]).to_string();
        let good = json!([null, ["c", "r"], null, null, [["rc", ["second"]]]]).to_string();
        let frame = json!([
            ["wrb.fr", null, empty],
            ["wrb.fr", null, "not json"],
            ["wrb.fr", null, good]
        ]);
        let body = format!(")]}}'\n\n{frame}\n");

        let output = parse_generate_response(&body).unwrap();
        assert_eq!(output.text, "second");
        assert_eq!(output.thoughts, None);
    }

    #[test]
    fn test_parse_error_codes() {
        for (code, expected) in [
            (1037, "usage_limit_exceeded"),
            (1050, "model_invalid"),
            (1052, "model_invalid"),
            (1060, "temporarily_blocked"),
            (9999, "api_error"),
        ] {
            let frame = json!([[
                "wrb.fr",
                null,
                null,
                null,
                null,
                [null, null, [["x", [code]]]]
            ]]);
            let body = format!(")]}}'\n\n{frame}\n");

            let err = parse_generate_response(&body).unwrap_err();
            assert_eq!(err.kind(), expected, "code {code}");
        }
    }

    #[test]
    fn test_parse_garbage_is_api_error() {
        let err = parse_generate_response("<html>oops</html>").unwrap_err();
        assert!(matches!(err, GeminiError::Api(_)));
    }

    #[test]
    fn test_extract_cookie() {
        let headers = [
            "NID=abc; Path=/",
            "__Secure-1PSIDTS=sidts-new; Domain=.google.com; Secure; HttpOnly",
        ];
        assert_eq!(
            extract_cookie(headers, "__Secure-1PSIDTS"),
            Some("sidts-new".to_string())
        );
        assert_eq!(extract_cookie(headers, "__Secure-1PSID"), None);
    }

    #[test]
    fn test_parse_upload_response() {
        assert_eq!(parse_upload_response(" /contrib/x \n").unwrap(), "/contrib/x");
        assert!(parse_upload_response("  ").is_err());
    }
}
