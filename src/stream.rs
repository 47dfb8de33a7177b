//! Streaming response decoder with usage accumulation.

use crate::error::Error;
use crate::sse::LineBuffer;
use crate::types::{Fragment, Usage};
use bytes::Bytes;
use futures::{ready, Stream};
use pin_project_lite::pin_project;
use smallvec::SmallVec;
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tracing::debug;

/// Text segments produced by one decoded unit, in order.
pub type Segments = SmallVec<[String; 2]>;

/// Outcome of decoding a single framed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Step {
    /// Text to forward to the consumer.
    Emit(Segments),
    /// Unit understood but carries no text (usage, framing, keep-alive).
    Continue,
    /// Unit could not be parsed; dropped without affecting the stream.
    Skip,
    /// Terminator seen; stop reading even if bytes remain buffered.
    Stop,
}

impl Step {
    /// Emit a single text segment, or continue if it is empty.
    pub fn text(text: String) -> Self {
        if text.is_empty() {
            Step::Continue
        } else {
            let mut segments = Segments::new();
            segments.push(text);
            Step::Emit(segments)
        }
    }
}

/// Provider-specific decoding of one line of a streamed response.
pub trait UnitDecoder: Send {
    /// Decode one line (line ending already removed), adding any token
    /// counts it carries to `usage`.
    ///
    /// Malformed input returns `Ok(Step::Skip)`. Only provider-reported
    /// errors are returned as `Err`.
    fn decode_line(&mut self, line: &str, usage: &mut Usage) -> Result<Step, Error>;

    /// Called once when the stream completes normally.
    fn finish(&mut self, _usage: &Usage) {}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Reading,
    Terminated,
    Done,
}

pin_project! {
    /// A streamed completion decoded into ordered fragments.
    ///
    /// Yields `Fragment::Text` items in decode order, then a single
    /// `Fragment::Done` on normal completion. Token usage accumulates as
    /// units are decoded and is read with [`FragmentStream::usage`].
    pub struct FragmentStream<S> {
        #[pin]
        inner: S,
        lines: LineBuffer,
        decoder: Box<dyn UnitDecoder + Send>,
        pending: VecDeque<String>,
        usage: Usage,
        state: State,
    }
}

impl<S> FragmentStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    /// Create a new fragment stream.
    pub fn new(inner: S, decoder: Box<dyn UnitDecoder + Send>) -> Self {
        Self {
            inner,
            lines: LineBuffer::new(),
            decoder,
            pending: VecDeque::new(),
            usage: Usage::default(),
            state: State::Reading,
        }
    }

    /// Usage accumulated so far.
    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// Check if the stream has yielded its last item.
    pub fn is_done(&self) -> bool {
        self.state == State::Done
    }
}

impl<S> Stream for FragmentStream<S>
where
    S: Stream<Item = Result<Bytes, reqwest::Error>>,
{
    type Item = Result<Fragment, Error>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let mut this = self.project();

        loop {
            if let Some(text) = this.pending.pop_front() {
                return Poll::Ready(Some(Ok(Fragment::Text(text))));
            }

            match *this.state {
                State::Done => return Poll::Ready(None),
                State::Terminated => {
                    *this.state = State::Done;
                    this.decoder.finish(this.usage);
                    return Poll::Ready(Some(Ok(Fragment::Done)));
                }
                State::Reading => {}
            }

            // Drain complete lines before asking for more bytes
            if let Some(line) = this.lines.next_line() {
                match apply_line(&line, this.decoder.as_mut(), this.usage, this.pending) {
                    Ok(false) => {}
                    Ok(true) => {
                        this.lines.clear();
                        *this.state = State::Terminated;
                    }
                    Err(e) => {
                        *this.state = State::Done;
                        return Poll::Ready(Some(Err(e)));
                    }
                }
                continue;
            }

            match ready!(this.inner.as_mut().poll_next(cx)) {
                Some(Ok(bytes)) => this.lines.feed(&bytes),
                Some(Err(e)) => {
                    *this.state = State::Done;
                    return Poll::Ready(Some(Err(Error::Http(e))));
                }
                None => {
                    // End of input without a terminator is a normal completion
                    if let Some(line) = this.lines.finish() {
                        if let Err(e) =
                            apply_line(&line, this.decoder.as_mut(), this.usage, this.pending)
                        {
                            *this.state = State::Done;
                            return Poll::Ready(Some(Err(e)));
                        }
                    }
                    *this.state = State::Terminated;
                }
            }
        }
    }
}

/// Decode one raw line. Returns `true` when the decoder asked to stop.
fn apply_line(
    line: &[u8],
    decoder: &mut (dyn UnitDecoder + Send),
    usage: &mut Usage,
    pending: &mut VecDeque<String>,
) -> Result<bool, Error> {
    if line.is_empty() {
        return Ok(false);
    }
    let Ok(line) = std::str::from_utf8(line) else {
        debug!(len = line.len(), "skipping line with invalid UTF-8");
        return Ok(false);
    };

    match decoder.decode_line(line, usage)? {
        Step::Emit(segments) => pending.extend(segments),
        Step::Continue => {}
        Step::Skip => debug!(line, "skipping malformed stream unit"),
        Step::Stop => return Ok(true),
    }
    Ok(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    struct TestDecoder;

    impl UnitDecoder for TestDecoder {
        fn decode_line(&mut self, line: &str, usage: &mut Usage) -> Result<Step, Error> {
            if let Some(text) = line.strip_prefix("text:") {
                Ok(Step::text(text.to_string()))
            } else if line == "usage" {
                usage.add_input(10);
                usage.add_output(5);
                Ok(Step::Continue)
            } else if line == "stop" {
                Ok(Step::Stop)
            } else if line == "fail" {
                Err(Error::Vendor("boom".into()))
            } else {
                Ok(Step::Skip)
            }
        }
    }

    fn chunks(parts: &[&'static str]) -> impl Stream<Item = Result<Bytes, reqwest::Error>> {
        futures::stream::iter(
            parts
                .iter()
                .map(|p| Ok(Bytes::from_static(p.as_bytes())))
                .collect::<Vec<_>>(),
        )
    }

    async fn collect<S>(mut stream: FragmentStream<S>) -> (Vec<Fragment>, Usage)
    where
        S: Stream<Item = Result<Bytes, reqwest::Error>> + Unpin,
    {
        let mut out = Vec::new();
        while let Some(item) = stream.next().await {
            out.push(item.unwrap());
        }
        (out, stream.usage())
    }

    #[tokio::test]
    async fn test_stream_accumulation() {
        let stream = FragmentStream::new(
            chunks(&["text:Hello\n", "\ntext: Wor", "ld\nusage\n"]),
            Box::new(TestDecoder),
        );

        let (fragments, usage) = collect(stream).await;
        assert_eq!(
            fragments,
            vec![
                Fragment::Text("Hello".into()),
                Fragment::Text(" World".into()),
                Fragment::Done,
            ]
        );
        assert_eq!(usage.input_tokens, 10);
        assert_eq!(usage.output_tokens, 5);
    }

    #[tokio::test]
    async fn test_stop_discards_buffered_bytes() {
        let stream = FragmentStream::new(
            chunks(&["text:a\nstop\ntext:leak\n", "text:late\n"]),
            Box::new(TestDecoder),
        );

        let (fragments, _) = collect(stream).await;
        assert_eq!(fragments, vec![Fragment::Text("a".into()), Fragment::Done]);
    }

    #[tokio::test]
    async fn test_trailing_line_without_newline() {
        let stream = FragmentStream::new(chunks(&["text:a\ntext:b"]), Box::new(TestDecoder));

        let (fragments, _) = collect(stream).await;
        assert_eq!(
            fragments,
            vec![
                Fragment::Text("a".into()),
                Fragment::Text("b".into()),
                Fragment::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_malformed_lines_are_skipped() {
        let body: Vec<Result<Bytes, reqwest::Error>> = vec![Ok(Bytes::from_static(
            b"garbage\ntext:a\n\xff\xfe\n{\"trunc\ntext:b\n",
        ))];
        let stream = FragmentStream::new(futures::stream::iter(body), Box::new(TestDecoder));

        let (fragments, _) = collect(stream).await;
        assert_eq!(
            fragments,
            vec![
                Fragment::Text("a".into()),
                Fragment::Text("b".into()),
                Fragment::Done
            ]
        );
    }

    #[tokio::test]
    async fn test_decoder_error_ends_stream() {
        let mut stream =
            FragmentStream::new(chunks(&["text:a\nfail\ntext:b\n"]), Box::new(TestDecoder));

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Fragment::Text("a".into())
        );
        assert!(matches!(stream.next().await, Some(Err(Error::Vendor(_)))));
        assert!(stream.next().await.is_none());
        assert!(stream.is_done());
    }

    #[tokio::test]
    async fn test_empty_body_completes() {
        let stream = FragmentStream::new(chunks(&[]), Box::new(TestDecoder));
        let (fragments, usage) = collect(stream).await;
        assert_eq!(fragments, vec![Fragment::Done]);
        assert!(usage.is_empty());
    }
}
