//! Server-sent event framing for streamed completions.

use futures_util::StreamExt;

use mojarung_shared::{MojarungError, Result};

/// Upper bound on buffered, not yet framed bytes.
const MAX_SSE_BUFFER_BYTES: usize = 4 * 1024 * 1024;

fn find_sse_event_boundary(buffer: &[u8]) -> Option<(usize, usize)> {
    let lf = buffer.windows(2).position(|w| w == b"\n\n");
    let crlf = buffer.windows(4).position(|w| w == b"\r\n\r\n");
    match (lf, crlf) {
        (Some(a), Some(b)) => Some(if a <= b { (a, 2) } else { (b, 4) }),
        (Some(a), None) => Some((a, 2)),
        (None, Some(b)) => Some((b, 4)),
        (None, None) => None,
    }
}

fn drain_next_sse_event(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
    let (pos, delim_len) = find_sse_event_boundary(buffer)?;
    let event = buffer[..pos].to_vec();
    buffer.drain(..pos + delim_len);
    Some(event)
}

fn extract_sse_data(event: &str) -> Option<String> {
    let mut data = String::new();
    let mut found = false;

    for line in event.lines() {
        let line = line.strip_suffix('\r').unwrap_or(line);

        if let Some(mut rest) = line.strip_prefix("data:") {
            if let Some(stripped) = rest.strip_prefix(' ') {
                rest = stripped;
            }

            if found {
                data.push('\n');
            }
            data.push_str(rest);
            found = true;
        }
    }

    if found { Some(data) } else { None }
}

/// What one event contributes to the reply.
#[derive(Debug, PartialEq)]
enum Delta {
    Text(String),
    Skip,
    Done,
}

fn parse_event(event: &[u8]) -> Delta {
    let Ok(event) = std::str::from_utf8(event) else {
        tracing::warn!("skipping non UTF-8 SSE event");
        return Delta::Skip;
    };
    let Some(data) = extract_sse_data(event) else {
        return Delta::Skip;
    };
    if data.trim() == "[DONE]" {
        return Delta::Done;
    }

    match serde_json::from_str::<serde_json::Value>(&data) {
        Ok(json) => match json["choices"][0]["delta"]["content"].as_str() {
            Some(text) if !text.is_empty() => Delta::Text(text.to_string()),
            _ => Delta::Skip,
        },
        Err(e) => {
            tracing::debug!(%e, "skipping malformed SSE payload");
            Delta::Skip
        }
    }
}

/// Read a streamed completion to the end and concatenate its content deltas.
pub(crate) async fn collect_stream(response: reqwest::Response) -> Result<String> {
    let mut stream = response.bytes_stream();
    let mut buffer: Vec<u8> = Vec::new();
    let mut reply = String::new();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MojarungError::Llm(format!("stream interrupted: {e}")))?;
        buffer.extend_from_slice(&chunk);

        if buffer.len() > MAX_SSE_BUFFER_BYTES {
            return Err(MojarungError::Llm(
                "SSE buffer exceeded maximum size (4 MiB)".into(),
            ));
        }

        while let Some(event) = drain_next_sse_event(&mut buffer) {
            match parse_event(&event) {
                Delta::Text(text) => reply.push_str(&text),
                Delta::Skip => {}
                Delta::Done => return Ok(reply),
            }
        }
    }

    // Trailing event without a blank line after it
    if let Delta::Text(text) = parse_event(&buffer) {
        reply.push_str(&text);
    }
    Ok(reply)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drains_lf_and_crlf_events() {
        let mut buffer = b"data: a\r\n\r\ndata: b\n\nrest".to_vec();
        assert_eq!(drain_next_sse_event(&mut buffer), Some(b"data: a".to_vec()));
        assert_eq!(drain_next_sse_event(&mut buffer), Some(b"data: b".to_vec()));
        assert_eq!(drain_next_sse_event(&mut buffer), None);
        assert_eq!(buffer, b"rest");
    }

    #[test]
    fn multi_line_data_is_joined() {
        assert_eq!(
            extract_sse_data("event: x\ndata: one\ndata:two"),
            Some("one\ntwo".to_string())
        );
        assert_eq!(extract_sse_data(": comment"), None);
    }

    #[test]
    fn event_classification() {
        assert_eq!(parse_event(b"data: [DONE]"), Delta::Done);
        assert_eq!(parse_event(b"data: {oops"), Delta::Skip);
        assert_eq!(
            parse_event(br#"data: {"choices":[{"delta":{"content":"hi"}}]}"#),
            Delta::Text("hi".into())
        );
        assert_eq!(
            parse_event(br#"data: {"choices":[{"delta":{}}]}"#),
            Delta::Skip
        );
    }
}
