//! Lazy decoding of streamed responses into text deltas
//!
//! Two flavours are provided. [`decode`] and [`decode_reader`] work over
//! blocking line sources and return an [`Iterator`]. [`decode_stream`] works
//! over an async HTTP body of arbitrary byte chunks and returns a
//! [`futures::Stream`]. Both pull exactly as much input as they need to
//! produce the next delta and stop for good after the first error.

use futures::stream::{self, Stream, StreamExt};
use std::collections::VecDeque;
use std::io::{self, BufRead};
use std::iter::FusedIterator;
use std::pin::Pin;
use std::time::Duration;
use tracing::debug;

use super::chunk::StreamChunk;
use super::lines::LineBuffer;
use super::StreamError;

/// What a single line means for a delta sequence
enum Step {
    Yield(String),
    Skip,
    Stop,
}

fn delta_step(line: &[u8]) -> Result<Step, StreamError> {
    match StreamChunk::parse(line)? {
        Some(StreamChunk::Delta { content }) => Ok(Step::Yield(content)),
        Some(StreamChunk::Done) => Ok(Step::Stop),
        Some(StreamChunk::Usage(usage)) => {
            debug!(
                prompt_tokens = ?usage.prompt_tokens,
                completion_tokens = ?usage.completion_tokens,
                "stream usage reported"
            );
            Ok(Step::Skip)
        }
        Some(StreamChunk::Data { .. }) | Some(StreamChunk::Unrecognized(_)) | None => {
            Ok(Step::Skip)
        }
    }
}

/// Iterator of text deltas over a source of raw lines
///
/// Yields `Ok(delta)` for every chat chunk, skipping blank, usage-only and
/// unrecognized lines. A malformed line or a read error is yielded once as
/// `Err` and ends the sequence.
#[derive(Debug)]
pub struct Deltas<I> {
    lines: I,
    finished: bool,
}

impl<I, L, E> Iterator for Deltas<I>
where
    I: Iterator<Item = Result<L, E>>,
    L: AsRef<[u8]>,
    E: Into<StreamError>,
{
    type Item = Result<String, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        loop {
            let line = match self.lines.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => {
                    self.finished = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.finished = true;
                    return None;
                }
            };

            match delta_step(line.as_ref()) {
                Ok(Step::Yield(text)) => return Some(Ok(text)),
                Ok(Step::Skip) => continue,
                Ok(Step::Stop) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<I, L, E> FusedIterator for Deltas<I>
where
    I: Iterator<Item = Result<L, E>>,
    L: AsRef<[u8]>,
    E: Into<StreamError>,
{
}

/// Decodes a sequence of raw lines into text deltas
pub fn decode<I, L, E>(lines: I) -> Deltas<I::IntoIter>
where
    I: IntoIterator<Item = Result<L, E>>,
    L: AsRef<[u8]>,
    E: Into<StreamError>,
{
    Deltas {
        lines: lines.into_iter(),
        finished: false,
    }
}

/// Decodes a blocking reader line by line
pub fn decode_reader<R: BufRead>(reader: R) -> Deltas<io::Split<R>> {
    decode(reader.split(b'\n'))
}

/// Returns the URL from the first line that carries a `data` field
///
/// Stops reading as soon as that line is seen. A stream that never carries
/// one yields `Ok(None)`.
pub fn decode_video<I, L, E>(lines: I) -> Result<Option<String>, StreamError>
where
    I: IntoIterator<Item = Result<L, E>>,
    L: AsRef<[u8]>,
    E: Into<StreamError>,
{
    for line in lines {
        let line = line.map_err(Into::into)?;
        match StreamChunk::parse(line.as_ref())? {
            Some(StreamChunk::Data { url }) => return Ok(url),
            Some(StreamChunk::Done) => break,
            _ => {}
        }
    }
    Ok(None)
}

/// Lines reassembled from an async body of byte chunks
struct BodyLines<S> {
    body: Pin<Box<S>>,
    buffer: LineBuffer,
    pending: VecDeque<Vec<u8>>,
    exhausted: bool,
}

impl<S, B, E> BodyLines<S>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
{
    fn new(body: S) -> Self {
        Self {
            body: Box::pin(body),
            buffer: LineBuffer::new(),
            pending: VecDeque::new(),
            exhausted: false,
        }
    }

    /// Reads body chunks until a complete line is available
    async fn next_line(&mut self) -> Option<Result<Vec<u8>, StreamError>> {
        loop {
            if let Some(line) = self.pending.pop_front() {
                return Some(Ok(line));
            }
            if self.exhausted {
                return None;
            }

            match self.body.next().await {
                Some(Ok(bytes)) => self.pending.extend(self.buffer.push(bytes.as_ref())),
                Some(Err(e)) => {
                    self.exhausted = true;
                    return Some(Err(e.into()));
                }
                None => {
                    self.exhausted = true;
                    self.pending.extend(self.buffer.finish());
                }
            }
        }
    }
}

/// Bounds the wait for each chunk of `body` by `idle`
///
/// The total duration is unbounded. If `idle` passes without a chunk, the
/// stream yields [`StreamError::Idle`] once and ends.
pub fn with_idle_timeout<S, B, E>(
    body: S,
    idle: Duration,
) -> impl Stream<Item = Result<B, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    E: Into<StreamError>,
{
    stream::unfold(Some(Box::pin(body)), move |state| async move {
        let Some(mut body) = state else {
            return None;
        };
        match tokio::time::timeout(idle, body.next()).await {
            Ok(Some(Ok(chunk))) => Some((Ok(chunk), Some(body))),
            Ok(Some(Err(e))) => Some((Err(e.into()), Some(body))),
            Ok(None) => None,
            Err(_) => {
                debug!(?idle, "stream stalled");
                Some((Err(StreamError::Idle(idle)), None))
            }
        }
    })
}

/// Decodes an async HTTP body into a stream of text deltas
///
/// Chunk boundaries need not line up with line boundaries. Termination
/// follows [`Deltas`]: end of body, `[DONE]`, or the first error.
pub fn decode_stream<S, B, E>(body: S) -> impl Stream<Item = Result<String, StreamError>>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
{
    stream::unfold(Some(BodyLines::new(body)), |state| async move {
        let Some(mut lines) = state else {
            return None;
        };
        loop {
            let line = match lines.next_line().await {
                Some(Ok(line)) => line,
                Some(Err(e)) => return Some((Err(e), None)),
                None => return None,
            };
            match delta_step(&line) {
                Ok(Step::Yield(text)) => return Some((Ok(text), Some(lines))),
                Ok(Step::Skip) => continue,
                Ok(Step::Stop) => return None,
                Err(e) => return Some((Err(e), None)),
            }
        }
    })
}

/// Async counterpart of [`decode_video`] over an HTTP body
pub async fn decode_video_stream<S, B, E>(body: S) -> Result<Option<String>, StreamError>
where
    S: Stream<Item = Result<B, E>>,
    B: AsRef<[u8]>,
    E: Into<StreamError>,
{
    let mut lines = BodyLines::new(body);
    while let Some(line) = lines.next_line().await {
        match StreamChunk::parse(&line?)? {
            Some(StreamChunk::Data { url }) => return Ok(url),
            Some(StreamChunk::Done) => break,
            _ => {}
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ok_lines<'a>(lines: &'a [&'a str]) -> impl Iterator<Item = io::Result<&'a str>> + 'a {
        lines.iter().copied().map(Ok)
    }

    #[test]
    fn test_decode_yields_deltas_in_order() {
        let lines = [
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
        ];

        let deltas: Vec<String> = decode(ok_lines(&lines))
            .collect::<Result<_, _>>()
            .expect("Valid lines should decode");

        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[test]
    fn test_decode_stops_after_malformed_line() {
        let lines = [
            r#"{"choices":[{"delta":{"content":"a"}}]}"#,
            "not json",
            r#"{"choices":[{"delta":{"content":"b"}}]}"#,
        ];
        let mut deltas = decode(ok_lines(&lines));

        assert_eq!(deltas.next().unwrap().unwrap(), "a");
        assert!(matches!(
            deltas.next(),
            Some(Err(StreamError::MalformedChunk { .. }))
        ));
        assert!(deltas.next().is_none());
        assert!(deltas.next().is_none());
    }

    #[test]
    fn test_decode_skips_usage_and_blank_lines() {
        let lines = [
            "",
            r#"{"choices":[{"delta":{"content":"x"}}]}"#,
            r#"{"usage":{"total_tokens":3}}"#,
            "data:",
            r#"{"choices":[{"delta":{}}]}"#,
        ];

        let deltas: Vec<String> = decode(ok_lines(&lines)).map(Result::unwrap).collect();

        assert_eq!(deltas, vec!["x", ""]);
    }

    #[test]
    fn test_decode_rejects_whitespace_only_line() {
        let lines = ["   ", "\t", r#"{"choices":[{"delta":{"content":"x"}}]}"#];
        let mut deltas = decode(ok_lines(&lines));

        assert!(matches!(
            deltas.next(),
            Some(Err(StreamError::MalformedChunk { .. }))
        ));
        assert!(deltas.next().is_none());
    }

    #[test]
    fn test_decode_stops_at_done_sentinel() {
        let lines = [
            r#"data: {"choices":[{"delta":{"content":"x"}}]}"#,
            "data: [DONE]",
            r#"data: {"choices":[{"delta":{"content":"never"}}]}"#,
        ];

        let deltas: Vec<String> = decode(ok_lines(&lines)).map(Result::unwrap).collect();

        assert_eq!(deltas, vec!["x"]);
    }

    #[test]
    fn test_decode_surfaces_read_error_once() {
        let lines: Vec<io::Result<&str>> = vec![
            Ok(r#"{"choices":[{"delta":{"content":"x"}}]}"#),
            Err(io::Error::new(io::ErrorKind::ConnectionReset, "reset")),
            Ok(r#"{"choices":[{"delta":{"content":"y"}}]}"#),
        ];
        let mut deltas = decode(lines);

        assert_eq!(deltas.next().unwrap().unwrap(), "x");
        assert!(matches!(deltas.next(), Some(Err(StreamError::Io(_)))));
        assert!(deltas.next().is_none());
    }

    #[test]
    fn test_decode_reader_handles_crlf() {
        let body = "{\"choices\":[{\"delta\":{\"content\":\"a\"}}]}\r\n\r\n{\"choices\":[{\"delta\":{\"content\":\"b\"}}]}";

        let deltas: Vec<String> = decode_reader(Cursor::new(body))
            .map(Result::unwrap)
            .collect();

        assert_eq!(deltas, vec!["a", "b"]);
    }

    #[test]
    fn test_decode_is_lazy() {
        let mut pulled = 0;
        let lines = std::iter::from_fn(|| {
            pulled += 1;
            Some(Ok::<_, io::Error>(r#"{"choices":[{"delta":{"content":"."}}]}"#))
        });

        let first_two: Vec<String> = decode(lines).take(2).map(Result::unwrap).collect();

        assert_eq!(first_two, vec![".", "."]);
        assert_eq!(pulled, 2);
    }

    #[test]
    fn test_decode_video_stops_at_first_data_line() {
        let lines = [
            r#"{"foo":1}"#,
            r#"{"data":[{"url":"http://x/video.mp4"}]}"#,
            r#"{"data":[{"url":"http://y"}]}"#,
        ];

        let url = decode_video(ok_lines(&lines)).expect("Should decode");

        assert_eq!(url.as_deref(), Some("http://x/video.mp4"));
    }

    #[test]
    fn test_decode_video_without_data_is_empty() {
        let lines = [r#"{"status":"queued"}"#, r#"{"status":"rendering"}"#];
        assert_eq!(decode_video(ok_lines(&lines)).unwrap(), None);
    }

    #[test]
    fn test_decode_video_does_not_read_past_answer() {
        let lines: Vec<io::Result<&str>> = vec![
            Ok(r#"{"data":[{"url":"http://x"}]}"#),
            Err(io::Error::new(io::ErrorKind::Other, "should not be read")),
        ];
        assert_eq!(decode_video(lines).unwrap().as_deref(), Some("http://x"));
    }

    #[tokio::test]
    async fn test_decode_stream_reassembles_split_lines() {
        let chunks: Vec<io::Result<&str>> = vec![
            Ok("{\"choices\":[{\"delta\":{\"con"),
            Ok("tent\":\"Hel\"}}]}\n{\"choices\":[{\"delta\":"),
            Ok("{\"content\":\"lo\"}}]}"),
        ];

        let deltas: Vec<String> = decode_stream(stream::iter(chunks))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(deltas, vec!["Hel", "lo"]);
    }

    #[tokio::test]
    async fn test_decode_stream_ends_after_malformed_chunk() {
        let chunks: Vec<io::Result<&str>> = vec![
            Ok("{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\nnot json\n"),
            Ok("{\"choices\":[{\"delta\":{\"content\":\"late\"}}]}\n"),
        ];

        let results: Vec<Result<String, StreamError>> =
            decode_stream(stream::iter(chunks)).collect().await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "ok");
        assert!(matches!(results[1], Err(StreamError::MalformedChunk { .. })));
    }

    #[tokio::test]
    async fn test_idle_body_ends_stream_with_error() {
        let chunks: Vec<io::Result<&str>> =
            vec![Ok("{\"choices\":[{\"delta\":{\"content\":\"ok\"}}]}\n")];
        let body = stream::iter(chunks).chain(stream::pending());

        let results: Vec<Result<String, StreamError>> =
            decode_stream(with_idle_timeout(body, Duration::from_millis(50)))
                .collect()
                .await;

        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap(), "ok");
        assert!(matches!(results[1], Err(StreamError::Idle(_))));
    }

    #[tokio::test]
    async fn test_idle_timeout_passes_prompt_chunks_through() {
        let chunks: Vec<io::Result<&str>> = vec![Ok("a"), Ok("b")];

        let passed: Vec<&str> = with_idle_timeout(stream::iter(chunks), Duration::from_secs(5))
            .map(Result::unwrap)
            .collect()
            .await;

        assert_eq!(passed, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_decode_video_stream_returns_first_url() {
        let chunks: Vec<io::Result<&str>> = vec![
            Ok("{\"foo\":1}\n{\"data\":[{\"url\":"),
            Ok("\"http://x/video.mp4\"}]}\n{\"data\":[{\"url\":\"http://y\"}]}\n"),
        ];

        let url = decode_video_stream(stream::iter(chunks)).await.unwrap();

        assert_eq!(url.as_deref(), Some("http://x/video.mp4"));
    }
}
