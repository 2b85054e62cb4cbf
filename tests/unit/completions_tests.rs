//! Unit tests for the completions event stream.

use std::sync::Mutex;

use bytes::BytesMut;
use serde_json::json;
use tokio_util::codec::Decoder;

use cody_agent::chat::completions::{
    fold_events, parse_event_block, CompletionEvent, CompletionParameters, EventStreamCodec,
    PromptMessage,
};
use cody_agent::chat::transcript::Speaker;
use cody_agent::AppError;

const STREAM: &str = "event: completion\ndata: {\"completion\":\"Hel\"}\n\n\
                      event: completion\ndata: {\"completion\":\"Hello\"}\n\n\
                      event: done\ndata: {}\n\n";

fn decode_all(chunks: &[&[u8]]) -> Vec<CompletionEvent> {
    let mut codec = EventStreamCodec::new();
    let mut buf = BytesMut::new();
    let mut events = Vec::new();
    for chunk in chunks {
        buf.extend_from_slice(chunk);
        while let Some(event) = codec.decode(&mut buf).expect("decode") {
            events.push(event);
        }
    }
    while let Some(event) = codec.decode_eof(&mut buf).expect("decode eof") {
        events.push(event);
    }
    events
}

#[test]
fn stream_decodes_into_events() {
    assert_eq!(
        decode_all(&[STREAM.as_bytes()]),
        vec![
            CompletionEvent::Completion("Hel".into()),
            CompletionEvent::Completion("Hello".into()),
            CompletionEvent::Done,
        ]
    );
}

#[test]
fn chunk_boundaries_do_not_matter() {
    let bytes = STREAM.as_bytes();
    let expected = decode_all(&[bytes]);
    for split in 0..=bytes.len() {
        let (head, tail) = bytes.split_at(split);
        assert_eq!(decode_all(&[head, tail]), expected, "split at {split}");
    }
}

#[test]
fn crlf_separated_events_are_accepted() {
    let raw = "event: completion\r\ndata: {\"completion\":\"ok\"}\r\n\r\nevent: done\r\ndata: {}\r\n\r\n";
    assert_eq!(
        decode_all(&[raw.as_bytes()]),
        vec![CompletionEvent::Completion("ok".into()), CompletionEvent::Done]
    );
}

#[test]
fn final_event_without_blank_line_is_flushed_at_eof() {
    let raw = "event: completion\ndata: {\"completion\":\"tail\"}";
    assert_eq!(
        decode_all(&[raw.as_bytes()]),
        vec![CompletionEvent::Completion("tail".into())]
    );
}

#[test]
fn malformed_completion_data_is_upstream_error() {
    let err = parse_event_block("event: completion\ndata: not-json").expect_err("must fail");
    assert!(matches!(err, AppError::Upstream(_)));
}

#[test]
fn fold_reports_every_partial_text_and_returns_the_last() {
    let seen = Mutex::new(Vec::new());
    let on_change = |text: &str| seen.lock().unwrap().push(text.to_owned());

    let text = fold_events(decode_all(&[STREAM.as_bytes()]), &on_change).expect("completes");

    assert_eq!(text, "Hello");
    assert_eq!(*seen.lock().unwrap(), vec!["Hel".to_owned(), "Hello".to_owned()]);
}

#[test]
fn fold_surfaces_error_event_as_upstream() {
    let events = vec![
        CompletionEvent::Completion("partial".into()),
        CompletionEvent::Error("rate limit exceeded".into()),
        CompletionEvent::Done,
    ];
    let err = fold_events(events, &|_: &str| {}).expect_err("must fail");
    assert_eq!(err, AppError::Upstream("rate limit exceeded".into()));
}

#[test]
fn fold_ignores_events_after_done() {
    let events = vec![
        CompletionEvent::Completion("final".into()),
        CompletionEvent::Done,
        CompletionEvent::Error("late".into()),
    ];
    assert_eq!(fold_events(events, &|_: &str| {}).expect("ok"), "final");
}

#[test]
fn request_body_uses_wire_field_names() {
    let params = CompletionParameters::chat(vec![PromptMessage {
        speaker: Speaker::Human,
        text: "hi".into(),
    }]);
    let value = serde_json::to_value(&params).expect("serialise");

    assert_eq!(value["messages"], json!([{"speaker": "human", "text": "hi"}]));
    assert_eq!(value["maxTokensToSample"], json!(1000));
    assert_eq!(value["topK"], json!(-1));
    assert_eq!(value["topP"], json!(-1));
}
