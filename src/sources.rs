//! Frame sources: lazy, ordered streams of tracker output.
//!
//! The counting core never talks to a detector or tracker directly. Instead it
//! pulls [`Frame`]s from anything implementing [`FrameSource`]; recordings on disk
//! (JSON lines or MessagePack), an in-memory list, or another source running on
//! a worker thread behind a bounded queue.

use std::{
    borrow::Cow,
    fs::File,
    io::{BufRead, BufReader, Read},
    path::Path,
    thread::{self, JoinHandle},
};

use crossbeam_channel::{Receiver, bounded};
use log::{debug, warn};

use crate::{error::SourceError, tracking::Frame};

pub trait FrameSource: Iterator<Item = Result<Frame, SourceError>> {
    /// Name recorded against the run result, usually the file name of the recording
    fn name(&self) -> &str;
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Python's `json` module writes non-finite floats as bare `NaN`, `Infinity`
/// and `-Infinity`, which are not JSON. Outside of strings they are read as `null`.
fn replace_non_finite_literals(line: &str) -> Cow<'_, str> {
    if !line.contains("NaN") && !line.contains("Infinity") {
        return Cow::Borrowed(line);
    }
    let mut out = String::with_capacity(line.len());
    let mut rest = line;
    let mut in_string = false;
    let mut escaped = false;
    while let Some(c) = rest.chars().next() {
        if !in_string {
            if let Some(literal) = ["-Infinity", "Infinity", "NaN"]
                .iter()
                .find(|literal| rest.starts_with(**literal))
            {
                out.push_str("null");
                rest = &rest[literal.len()..];
                continue;
            }
            in_string = c == '"';
        } else if escaped {
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == '"' {
            in_string = false;
        }
        out.push(c);
        rest = &rest[c.len_utf8()..];
    }
    Cow::Owned(out)
}

/// One JSON-encoded [`Frame`] per line; blank lines are ignored.
pub struct JsonLinesSource<R: BufRead> {
    name: String,
    lines: std::io::Lines<R>,
    line_number: usize,
    done: bool,
}

impl JsonLinesSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(JsonLinesSource::from_reader(&file_name(path), BufReader::new(file)))
    }
}

impl<R: BufRead> JsonLinesSource<R> {
    pub fn from_reader(name: &str, reader: R) -> Self {
        JsonLinesSource {
            name: String::from(name),
            lines: reader.lines(),
            line_number: 0,
            done: false,
        }
    }
}

impl<R: BufRead> Iterator for JsonLinesSource<R> {
    type Item = Result<Frame, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            self.line_number += 1;
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => {
                    self.done = true;
                    return Some(Err(SourceError::Io(e)));
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            let line = replace_non_finite_literals(&line);
            return Some(serde_json::from_str::<Frame>(&line).map_err(|source| {
                self.done = true;
                SourceError::Json {
                    line: self.line_number,
                    source,
                }
            }));
        }
    }
}

impl<R: BufRead> FrameSource for JsonLinesSource<R> {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Back-to-back MessagePack-encoded [`Frame`]s, written with named fields
/// (e.g. `rmp_serde::to_vec_named`).
pub struct MsgPackSource<R: Read> {
    name: String,
    reader: R,
    done: bool,
}

impl MsgPackSource<BufReader<File>> {
    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let file = File::open(path)?;
        Ok(MsgPackSource::from_reader(&file_name(path), BufReader::new(file)))
    }
}

impl<R: Read> MsgPackSource<R> {
    pub fn from_reader(name: &str, reader: R) -> Self {
        MsgPackSource {
            name: String::from(name),
            reader,
            done: false,
        }
    }
}

impl<R: Read> Iterator for MsgPackSource<R> {
    type Item = Result<Frame, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        match rmp_serde::from_read::<_, Frame>(&mut self.reader) {
            Ok(frame) => Some(Ok(frame)),
            // Running out of bytes exactly on a frame boundary is the normal end of the stream
            Err(rmp_serde::decode::Error::InvalidMarkerRead(e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(SourceError::MsgPack(e)))
            }
        }
    }
}

impl<R: Read> FrameSource for MsgPackSource<R> {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Frames already in memory
pub struct VecSource {
    name: String,
    frames: std::vec::IntoIter<Frame>,
}

impl VecSource {
    pub fn new(name: &str, frames: Vec<Frame>) -> Self {
        VecSource {
            name: String::from(name),
            frames: frames.into_iter(),
        }
    }
}

impl Iterator for VecSource {
    type Item = Result<Frame, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.frames.next().map(Ok)
    }
}

impl FrameSource for VecSource {
    fn name(&self) -> &str {
        &self.name
    }
}

/// Runs another source on its own thread, handing frames over through a
/// bounded channel. The single channel keeps frames in production order; a
/// full queue blocks the producer.
pub struct ThreadedSource {
    name: String,
    rx: Receiver<Result<Frame, SourceError>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadedSource {
    pub fn spawn<S>(source: S, capacity: usize) -> Self
    where
        S: FrameSource + Send + 'static,
    {
        let name = String::from(source.name());
        let (tx, rx) = bounded(capacity.max(1));

        let handle = thread::spawn(move || {
            for item in source {
                if tx.send(item).is_err() {
                    debug!("Frame consumer hung up; stopping producer");
                    break;
                }
            }
        });

        ThreadedSource {
            name,
            rx,
            handle: Some(handle),
        }
    }
}

impl Iterator for ThreadedSource {
    type Item = Result<Frame, SourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.rx.recv() {
            Ok(item) => Some(item),
            Err(_) => {
                // Channel closed: either the producer finished or it panicked
                let handle = self.handle.take()?;
                match handle.join() {
                    Ok(()) => None,
                    Err(_) => {
                        warn!("Frame producer thread panicked");
                        Some(Err(SourceError::ProducerGone))
                    }
                }
            }
        }
    }
}

impl FrameSource for ThreadedSource {
    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::Detection;
    use std::io::Cursor;

    fn frames(n: u64) -> Vec<Frame> {
        (0..n)
            .map(|i| {
                Frame::new(
                    i,
                    640,
                    480,
                    vec![Detection::centred(1, (100., 10. * i as f32), 20., 20.)],
                )
            })
            .collect()
    }

    #[test]
    fn test_json_lines() {
        let text = "{\"index\":0,\"width\":640,\"height\":480,\"detections\":[{\"id\":1,\"bbox\":[0,0,10,10]}]}\n\n{\"index\":1,\"width\":640,\"height\":480}\n";
        let mut source = JsonLinesSource::from_reader("clip.jsonl", Cursor::new(text));
        assert_eq!(source.name(), "clip.jsonl");
        assert_eq!(source.next().unwrap().unwrap().detections.len(), 1);
        let second = source.next().unwrap().unwrap();
        assert_eq!(second.index, 1);
        assert!(second.detections.is_empty());
        assert!(source.next().is_none());
    }

    #[test]
    fn test_json_lines_bad_line_ends_stream() {
        let text = "{\"index\":0,\"width\":640,\"height\":480}\nnot json\n{\"index\":2,\"width\":640,\"height\":480}\n";
        let mut source = JsonLinesSource::from_reader("bad", Cursor::new(text));
        assert!(source.next().unwrap().is_ok());
        match source.next() {
            Some(Err(SourceError::Json { line: 2, .. })) => {}
            other => panic!("unexpected {:?}", other),
        }
        assert!(source.next().is_none());
    }

    #[test]
    fn test_non_finite_literals_read_as_null() {
        assert_eq!(
            replace_non_finite_literals(r#"[0,NaN,-Infinity,Infinity]"#),
            "[0,null,null,null]"
        );
        assert_eq!(
            replace_non_finite_literals(r#"{"name":"NaN \"Infinity\"","v":NaN}"#),
            r#"{"name":"NaN \"Infinity\"","v":null}"#
        );
        assert!(matches!(replace_non_finite_literals("[1,2]"), Cow::Borrowed(_)));
    }

    #[test]
    fn test_json_lines_nan_detection_keeps_stream() {
        let text = "{\"index\":0,\"width\":640,\"height\":480,\"detections\":[{\"id\":4,\"bbox\":[0,NaN,20,250]}]}\n{\"index\":1,\"width\":640,\"height\":480}\n";
        let mut source = JsonLinesSource::from_reader("nan.jsonl", Cursor::new(text));
        let first = source.next().unwrap().unwrap();
        assert_eq!(
            first.detections[0].validate(),
            Err(crate::error::MalformedReason::NonFiniteCoordinates)
        );
        assert_eq!(source.next().unwrap().unwrap().index, 1);
        assert!(source.next().is_none());
    }

    #[test]
    fn test_msgpack_stream() {
        let mut bytes = Vec::new();
        for frame in frames(3) {
            bytes.extend(rmp_serde::to_vec_named(&frame).unwrap());
        }
        let source = MsgPackSource::from_reader("clip.msgpack", Cursor::new(bytes));
        let read: Vec<Frame> = source.map(|f| f.unwrap()).collect();
        assert_eq!(read, frames(3));
    }

    #[test]
    fn test_msgpack_empty_input() {
        let mut source = MsgPackSource::from_reader("empty", Cursor::new(Vec::new()));
        assert!(source.next().is_none());
    }

    #[test]
    fn test_threaded_source_keeps_order() {
        let source = ThreadedSource::spawn(VecSource::new("mem", frames(200)), 4);
        assert_eq!(source.name(), "mem");
        let indices: Vec<u64> = source.map(|f| f.unwrap().index).collect();
        assert_eq!(indices, (0..200).collect::<Vec<u64>>());
    }

    #[test]
    fn test_threaded_source_early_drop() {
        let mut source = ThreadedSource::spawn(VecSource::new("mem", frames(500)), 2);
        assert_eq!(source.next().unwrap().unwrap().index, 0);
        drop(source); // producer must not hang on a full queue
    }
}
