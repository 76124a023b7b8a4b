//! Combined-stream framing.
//!
//! A session opened for one stream receives bare payloads; a session opened
//! for several receives `{"stream": <name>, "data": <payload>}` envelopes.

use std::collections::BTreeSet;

use serde_json::Value;
use url::Url;

use crate::domain::id::StreamName;
use crate::error::{Error, Result};

/// Session URI for a stream set.
///
/// `{base}/ws/{name}` for a single stream, `{base}/stream?streams=a/b/c`
/// otherwise.
///
/// # Errors
///
/// Returns [`Error::InvalidArgument`] for an empty set and [`Error::Url`] if
/// the result does not parse.
pub fn session_uri(base: &Url, streams: &BTreeSet<StreamName>) -> Result<Url> {
    let base = base.as_str().trim_end_matches('/');
    let uri = match streams.len() {
        0 => return Err(Error::InvalidArgument("no streams to open".into())),
        1 => {
            let name = streams.iter().next().map(StreamName::as_str).unwrap_or_default();
            format!("{base}/ws/{name}")
        }
        _ => {
            let joined = streams
                .iter()
                .map(StreamName::as_str)
                .collect::<Vec<_>>()
                .join("/");
            format!("{base}/stream?streams={joined}")
        }
    };
    Ok(Url::parse(&uri)?)
}

/// Split one decoded frame into its stream name and payload.
///
/// `single` is the implicit stream of a single-stream session.
///
/// # Errors
///
/// Returns [`Error::Protocol`] when the frame is not an envelope and the
/// session has no implicit stream.
pub fn split_frame(mut frame: Value, single: Option<&StreamName>) -> Result<(StreamName, Value)> {
    if let Some(stream) = frame.get("stream").and_then(Value::as_str).map(StreamName::from) {
        if let Some(data) = frame.get_mut("data").map(Value::take) {
            return Ok((stream, data));
        }
    }

    match single {
        Some(name) => Ok((name.clone(), frame)),
        None => Err(Error::Protocol("frame has no stream name".into())),
    }
}
